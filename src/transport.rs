use crate::{Result, TreadmillError};
use serialport::SerialPort;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::time::{Duration, Instant};

/// Byte-level access to the rig link.
///
/// The decoder only ever asks for one identifier byte or for a complete
/// payload, so a source needs nothing more than these two reads.
pub trait ByteSource: Send {
    /// Wait up to the source's poll timeout for one byte.
    /// Returns `Ok(None)` when nothing arrived.
    fn poll_byte(&mut self) -> Result<Option<u8>>;

    /// Fill `buf` completely. A link that stops delivering mid-frame fails
    /// with `ConnectionClosed`.
    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// Serial transport over the `serialport` crate.
///
/// The port's own read timeout bounds `poll_byte`, which lets the
/// acquisition loop re-check cancellation between frames.
pub struct SerialSource {
    port: Box<dyn SerialPort>,
    frame_timeout: Duration,
}

impl SerialSource {
    pub fn new(port: Box<dyn SerialPort>, frame_timeout: Duration) -> Self {
        Self {
            port,
            frame_timeout,
        }
    }

    /// Bytes waiting in the OS receive buffer.
    pub fn bytes_available(&self) -> Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }
}

impl ByteSource for SerialSource {
    fn poll_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        let deadline = Instant::now() + self.frame_timeout;
        let mut filled = 0;

        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(n) if n > 0 => {
                    filled += n;
                    continue;
                }
                Ok(_) => {}
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Err(TreadmillError::ConnectionClosed {
                    expected: buf.len(),
                    received: filled,
                });
            }
        }
        Ok(())
    }
}

/// Replays a captured byte log as if it were arriving on the serial link.
///
/// Once the log is exhausted the source behaves like a quiet line: every
/// `poll_byte` waits the poll timeout and reports no data.
pub struct ReplaySource {
    data: Vec<u8>,
    pos: usize,
    poll_timeout: Duration,
}

impl ReplaySource {
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            poll_timeout: Duration::from_millis(10),
        }
    }

    /// Load a raw byte log recorded from the rig.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        log::info!(
            "Loaded {} bytes of rig output from {}",
            data.len(),
            path.as_ref().display()
        );
        Ok(Self::from_bytes(data))
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

impl ByteSource for ReplaySource {
    fn poll_byte(&mut self) -> Result<Option<u8>> {
        match self.data.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(Some(byte))
            }
            None => {
                if !self.poll_timeout.is_zero() {
                    std::thread::sleep(self.poll_timeout);
                }
                Ok(None)
            }
        }
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        let available = self.remaining().min(buf.len());
        buf[..available].copy_from_slice(&self.data[self.pos..self.pos + available]);
        self.pos += available;

        if available < buf.len() {
            return Err(TreadmillError::ConnectionClosed {
                expected: buf.len(),
                received: available,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};
    use std::collections::VecDeque;
    use std::io::Write;

    /// Port that hands out a fixed byte script, a few bytes per read, and
    /// then times out like a silent line.
    struct ScriptedPort {
        script: VecDeque<u8>,
        chunk: usize,
    }

    impl ScriptedPort {
        fn boxed(script: &[u8], chunk: usize) -> Box<dyn SerialPort> {
            Box::new(Self {
                script: script.iter().copied().collect(),
                chunk,
            })
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.script.is_empty() {
                std::thread::sleep(Duration::from_millis(1));
                return Err(std::io::Error::new(ErrorKind::TimedOut, "read timed out"));
            }
            let n = buf.len().min(self.chunk).min(self.script.len());
            for slot in &mut buf[..n] {
                *slot = self.script.pop_front().unwrap_or(0);
            }
            Ok(n)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SerialPort for ScriptedPort {
        fn name(&self) -> Option<String> {
            Some("scripted".into())
        }
        fn baud_rate(&self) -> serialport::Result<u32> {
            Ok(115_200)
        }
        fn data_bits(&self) -> serialport::Result<DataBits> {
            Ok(DataBits::Eight)
        }
        fn flow_control(&self) -> serialport::Result<FlowControl> {
            Ok(FlowControl::None)
        }
        fn parity(&self) -> serialport::Result<Parity> {
            Ok(Parity::None)
        }
        fn stop_bits(&self) -> serialport::Result<StopBits> {
            Ok(StopBits::One)
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(1)
        }
        fn set_baud_rate(&mut self, _: u32) -> serialport::Result<()> {
            Ok(())
        }
        fn set_data_bits(&mut self, _: DataBits) -> serialport::Result<()> {
            Ok(())
        }
        fn set_flow_control(&mut self, _: FlowControl) -> serialport::Result<()> {
            Ok(())
        }
        fn set_parity(&mut self, _: Parity) -> serialport::Result<()> {
            Ok(())
        }
        fn set_stop_bits(&mut self, _: StopBits) -> serialport::Result<()> {
            Ok(())
        }
        fn set_timeout(&mut self, _: Duration) -> serialport::Result<()> {
            Ok(())
        }
        fn write_request_to_send(&mut self, _: bool) -> serialport::Result<()> {
            Ok(())
        }
        fn write_data_terminal_ready(&mut self, _: bool) -> serialport::Result<()> {
            Ok(())
        }
        fn read_clear_to_send(&mut self) -> serialport::Result<bool> {
            Ok(true)
        }
        fn read_data_set_ready(&mut self) -> serialport::Result<bool> {
            Ok(true)
        }
        fn read_ring_indicator(&mut self) -> serialport::Result<bool> {
            Ok(false)
        }
        fn read_carrier_detect(&mut self) -> serialport::Result<bool> {
            Ok(true)
        }
        fn bytes_to_read(&self) -> serialport::Result<u32> {
            Ok(self.script.len() as u32)
        }
        fn bytes_to_write(&self) -> serialport::Result<u32> {
            Ok(0)
        }
        fn clear(&self, _: ClearBuffer) -> serialport::Result<()> {
            Ok(())
        }
        fn try_clone(&self) -> serialport::Result<Box<dyn SerialPort>> {
            Err(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                "scripted port can't be cloned",
            ))
        }
        fn set_break(&self) -> serialport::Result<()> {
            Ok(())
        }
        fn clear_break(&self) -> serialport::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_serial_payload_across_short_reads() {
        let port = ScriptedPort::boxed(&[b'4', 0, 0, 1, 0, 5, 0xFB, 3, 0], 2);
        let mut src = SerialSource::new(port, Duration::from_millis(50));
        assert_eq!(src.bytes_available().unwrap(), 9);
        assert_eq!(src.poll_byte().unwrap(), Some(b'4'));

        let mut payload = [0u8; 8];
        src.read_payload(&mut payload).unwrap();
        assert_eq!(payload, [0, 0, 1, 0, 5, 0xFB, 3, 0]);
        assert_eq!(src.poll_byte().unwrap(), None);
    }

    #[test]
    fn test_serial_frame_timeout_closes_connection() {
        let port = ScriptedPort::boxed(&[0, 0, 7], 1);
        let mut src = SerialSource::new(port, Duration::from_millis(20));

        let mut payload = [0u8; 8];
        match src.read_payload(&mut payload) {
            Err(TreadmillError::ConnectionClosed { expected, received }) => {
                assert_eq!(expected, 8);
                assert_eq!(received, 3);
            }
            other => panic!("expected ConnectionClosed, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_reads_in_order() {
        let mut src = ReplaySource::from_bytes(vec![b'2', 0, 0, 0, 5]);
        assert_eq!(src.poll_byte().unwrap(), Some(b'2'));
        let mut payload = [0u8; 4];
        src.read_payload(&mut payload).unwrap();
        assert_eq!(payload, [0, 0, 0, 5]);
        assert!(src.is_exhausted());
    }

    #[test]
    fn test_replay_quiet_after_end() {
        let mut src = ReplaySource::from_bytes(Vec::new()).with_poll_timeout(Duration::ZERO);
        assert_eq!(src.poll_byte().unwrap(), None);
        assert_eq!(src.poll_byte().unwrap(), None);
    }

    #[test]
    fn test_replay_truncated_payload() {
        let mut src = ReplaySource::from_bytes(vec![0x00, 0x01]);
        let mut payload = [0u8; 4];
        match src.read_payload(&mut payload) {
            Err(TreadmillError::ConnectionClosed { expected, received }) => {
                assert_eq!(expected, 4);
                assert_eq!(received, 2);
            }
            other => panic!("expected ConnectionClosed, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'1', 0, 0, 0, 100, b'!']).unwrap();
        file.flush().unwrap();

        let src = ReplaySource::open(file.path()).unwrap();
        assert_eq!(src.remaining(), 6);
    }
}
