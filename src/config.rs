use crate::fusion::FusionConfig;
use crate::protocol::{DEFAULT_BAUD_RATE, MAX_OVERFLOW_MODULUS, MAX_VALUE};
use crate::types::SensorLayout;
use crate::{Result, TreadmillError};
use std::time::Duration;

/// Connection and processing settings for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct RigConfig {
    /// Serial port name. `None` opens the first port found.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub layout: SensorLayout,
    pub fusion: FusionConfig,
    /// Modulus added per detected timestamp wrap.
    pub overflow_modulus: u64,
    /// How long to wait for an identifier byte before re-checking cancellation.
    pub poll_timeout: Duration,
    /// How long the rest of a frame may take once its identifier arrived.
    pub frame_timeout: Duration,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            layout: SensorLayout::Dual,
            fusion: FusionConfig::default(),
            overflow_modulus: MAX_VALUE,
            poll_timeout: Duration::from_millis(100),
            frame_timeout: Duration::from_secs(1),
        }
    }
}

impl RigConfig {
    /// Defaults overridden by `TREADMILL_*` environment variables.
    ///
    /// - `TREADMILL_PORT`: serial port name
    /// - `TREADMILL_BAUD`: baud rate
    /// - `TREADMILL_SENSORS`: `single` or `dual`
    /// - `TREADMILL_MIN_DELTA`: dead zone
    /// - `TREADMILL_TIMESTEP`: fusion window in raw ticks
    /// - `TREADMILL_POLL_MS`: identifier poll timeout
    ///
    /// Values that don't parse are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let layout = match read_env_string("TREADMILL_SENSORS", "").as_str() {
            "single" | "1" => SensorLayout::Single,
            "dual" | "2" => SensorLayout::Dual,
            "" => defaults.layout,
            other => {
                log::warn!(
                    "Unknown TREADMILL_SENSORS='{}', using {:?} (supported: single|dual)",
                    other,
                    defaults.layout
                );
                defaults.layout
            }
        };

        Self {
            port: std::env::var("TREADMILL_PORT")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            baud_rate: read_env_u32("TREADMILL_BAUD", defaults.baud_rate),
            layout,
            fusion: FusionConfig {
                min_delta: read_env_f64("TREADMILL_MIN_DELTA", defaults.fusion.min_delta),
                timestep: read_env_u32("TREADMILL_TIMESTEP", defaults.fusion.timestep),
            },
            poll_timeout: Duration::from_millis(u64::from(read_env_u32(
                "TREADMILL_POLL_MS",
                defaults.poll_timeout.as_millis() as u32,
            ))),
            ..defaults
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_layout(mut self, layout: SensorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_fusion(mut self, fusion: FusionConfig) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(TreadmillError::Config("baud rate must be non-zero".into()));
        }
        if !self.fusion.min_delta.is_finite() || self.fusion.min_delta < 0.0 {
            return Err(TreadmillError::Config(format!(
                "dead zone must be a non-negative number, got {}",
                self.fusion.min_delta
            )));
        }
        if self.overflow_modulus == 0 || self.overflow_modulus > MAX_OVERFLOW_MODULUS {
            return Err(TreadmillError::Config(format!(
                "overflow modulus out of range: {}",
                self.overflow_modulus
            )));
        }
        Ok(())
    }
}

fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn read_env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn read_env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RigConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.layout, SensorLayout::Dual);
        assert_eq!(config.fusion.min_delta, 10.0);
        assert_eq!(config.fusion.timestep, 200_000);
        assert_eq!(config.overflow_modulus, 4_294_967_295);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = RigConfig::default()
            .with_port("/dev/ttyACM0")
            .with_baud_rate(9_600)
            .with_layout(SensorLayout::Single);
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.baud_rate, 9_600);
        assert_eq!(config.layout, SensorLayout::Single);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RigConfig::default().with_baud_rate(0).validate().is_err());

        let config = RigConfig::default().with_fusion(FusionConfig {
            min_delta: f64::NAN,
            timestep: 1,
        });
        assert!(matches!(config.validate(), Err(TreadmillError::Config(_))));

        let config = RigConfig {
            overflow_modulus: 0,
            ..RigConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RigConfig {
            overflow_modulus: i64::MAX as u64,
            ..RigConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RigConfig {
            overflow_modulus: 1 << 32,
            ..RigConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        // Only this test touches TREADMILL_* variables.
        std::env::set_var("TREADMILL_SENSORS", " Single ");
        std::env::set_var("TREADMILL_BAUD", "57600");
        std::env::set_var("TREADMILL_MIN_DELTA", "not-a-number");
        std::env::set_var("TREADMILL_PORT", "COM4");
        let config = RigConfig::from_env();
        for name in [
            "TREADMILL_SENSORS",
            "TREADMILL_BAUD",
            "TREADMILL_MIN_DELTA",
            "TREADMILL_PORT",
        ] {
            std::env::remove_var(name);
        }

        assert_eq!(config.layout, SensorLayout::Single);
        assert_eq!(config.baud_rate, 57_600);
        assert_eq!(config.fusion.min_delta, 10.0);
        assert_eq!(config.port.as_deref(), Some("COM4"));
        assert_eq!(config.overflow_modulus, MAX_VALUE);
    }
}
