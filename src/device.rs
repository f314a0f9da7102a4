use crate::acquisition::Acquisition;
use crate::cancel::CancelToken;
use crate::config::RigConfig;
use crate::transport::SerialSource;
use crate::types::{PortInfo, PortKind};
use crate::{Result, TreadmillError};
use serialport::{SerialPortInfo, SerialPortType};

fn to_port_info(info: SerialPortInfo) -> PortInfo {
    let (kind, vid, pid, product) = match info.port_type {
        SerialPortType::UsbPort(usb) => (PortKind::Usb, Some(usb.vid), Some(usb.pid), usb.product),
        SerialPortType::PciPort => (PortKind::Pci, None, None, None),
        SerialPortType::BluetoothPort => (PortKind::Bluetooth, None, None, None),
        SerialPortType::Unknown => (PortKind::Unknown, None, None, None),
    };
    PortInfo {
        name: info.port_name,
        kind,
        vid,
        pid,
        product,
    }
}

/// List every serial port the OS reports.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(to_port_info).collect())
}

/// An open serial link to the treadmill rig.
pub struct Rig {
    source: SerialSource,
    port_name: String,
    config: RigConfig,
}

impl Rig {
    /// Open the port named in `config`, or the first available port when
    /// none is named.
    pub fn open(config: RigConfig) -> Result<Rig> {
        config.validate()?;

        let port_name = match &config.port {
            Some(name) => name.clone(),
            None => list_ports()?
                .into_iter()
                .next()
                .map(|p| p.name)
                .ok_or(TreadmillError::PortNotFound)?,
        };

        let port = serialport::new(&port_name, config.baud_rate)
            .timeout(config.poll_timeout)
            .open()?;

        log::info!(
            "Opened rig on {} at {} baud ({:?} sensors)",
            port_name,
            config.baud_rate,
            config.layout
        );

        Ok(Rig {
            source: SerialSource::new(port, config.frame_timeout),
            port_name,
            config,
        })
    }

    /// Open the first available port with default settings.
    pub fn open_first() -> Result<Rig> {
        Self::open(RigConfig::default())
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Bytes already waiting on the link.
    pub fn bytes_available(&self) -> Result<u32> {
        self.source.bytes_available()
    }

    /// Hand the connection to a new acquisition thread.
    pub fn start_acquisition(self) -> Result<Acquisition> {
        self.start_acquisition_with_cancel(CancelToken::new())
    }

    /// Like [`Rig::start_acquisition`], stopping when `cancel` fires.
    pub fn start_acquisition_with_cancel(self, cancel: CancelToken) -> Result<Acquisition> {
        log::info!("Starting acquisition on {}", self.port_name);
        Acquisition::start_with_cancel(self.source, &self.config, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_usb_port_info() {
        let info = to_port_info(SerialPortInfo {
            port_name: "/dev/ttyACM0".into(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x2341,
                pid: 0x0043,
                serial_number: None,
                manufacturer: Some("Arduino".into()),
                product: Some("Uno".into()),
            }),
        });
        assert_eq!(info.name, "/dev/ttyACM0");
        assert_eq!(info.kind, PortKind::Usb);
        assert_eq!(info.vid, Some(0x2341));
        assert_eq!(info.product.as_deref(), Some("Uno"));
    }

    #[test]
    fn test_non_usb_port_info() {
        let info = to_port_info(SerialPortInfo {
            port_name: "COM1".into(),
            port_type: SerialPortType::PciPort,
        });
        assert_eq!(info.kind, PortKind::Pci);
        assert_eq!(info.vid, None);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let config = RigConfig::default().with_port("/dev/null-rig").with_baud_rate(0);
        assert!(matches!(Rig::open(config), Err(TreadmillError::Config(_))));
    }
}
