use crate::Result;
use std::time::Duration;

/// Byte-oriented duplex link to the sensor.
///
/// `read` blocks for at most `timeout` waiting for the first byte and returns
/// whatever is available, up to `max_len`. An empty Vec means the timeout
/// elapsed with nothing received.
pub trait Transport {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    fn is_open(&self) -> bool;

    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).read(max_len, timeout)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialTransport};

#[cfg(feature = "serial")]
mod serial {
    use super::Transport;
    use crate::client::{read_env_string, read_env_u32, read_env_u64};
    use crate::{ProtocolError, Result};
    use serialport::{ClearBuffer, SerialPort};
    use std::io::{ErrorKind, Read, Write};
    use std::time::Duration;

    /// Serial link settings.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SerialConfig {
        pub path: String,
        pub baud_rate: u32,
        pub timeout: Duration,
    }

    impl Default for SerialConfig {
        fn default() -> Self {
            Self {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600,
                timeout: Duration::from_millis(1000),
            }
        }
    }

    impl SerialConfig {
        /// Read `HUSKYLENS_PORT`, `HUSKYLENS_BAUD` and `HUSKYLENS_TIMEOUT_MS`,
        /// falling back to the defaults for anything unset or unparsable.
        pub fn from_env() -> Self {
            let defaults = Self::default();
            Self {
                path: read_env_string("HUSKYLENS_PORT", &defaults.path),
                baud_rate: read_env_u32("HUSKYLENS_BAUD", defaults.baud_rate),
                timeout: Duration::from_millis(read_env_u64(
                    "HUSKYLENS_TIMEOUT_MS",
                    defaults.timeout.as_millis() as u64,
                )),
            }
        }
    }

    /// UART transport backed by the `serialport` crate.
    pub struct SerialTransport {
        port: Option<Box<dyn SerialPort>>,
        path: String,
    }

    impl SerialTransport {
        pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
            let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
            log::info!("Opened serial port {} at {} baud", path, baud_rate);
            Ok(Self {
                port: Some(port),
                path: path.to_string(),
            })
        }

        pub fn from_config(config: &SerialConfig) -> Result<Self> {
            Self::open(&config.path, config.baud_rate, config.timeout)
        }

        pub fn path(&self) -> &str {
            &self.path
        }

        fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
            self.port.as_mut().ok_or(ProtocolError::NotConnected)
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            let port = self.port_mut()?;
            // Drop stale bytes so the next read only sees this request's reply.
            port.clear(ClearBuffer::Input)?;
            port.write_all(bytes)?;
            port.flush()?;
            Ok(())
        }

        fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
            let port = self.port_mut()?;
            port.set_timeout(timeout)?;

            let mut buf = vec![0u8; max_len];
            match port.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    Ok(buf)
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            }
        }

        fn is_open(&self) -> bool {
            self.port.is_some()
        }

        fn close(&mut self) {
            if self.port.take().is_some() {
                log::info!("Closed serial port {}", self.path);
            }
        }
    }
}
