use crate::config::PortConfig;
use crate::error::FujiError;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Byte-oriented serial link used by both protocol engines.
///
/// Every read is bounded by an inter-byte timeout and reports a timeout as
/// `None` or a short count instead of an error.
pub trait Transport {
    /// Write the whole buffer, returning the number of bytes written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, FujiError>;

    /// Read one byte, or `None` when nothing arrives within `timeout`.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, FujiError>;

    /// Drive the DTR control line.
    fn set_control_line(&mut self, asserted: bool) -> Result<(), FujiError>;

    /// Block until all queued output has left the UART.
    fn wait_transmit_idle(&mut self) -> Result<(), FujiError>;

    /// Drop anything sitting unread in the receive path.
    fn flush_receive_buffer(&mut self) -> Result<(), FujiError>;

    /// Enter or leave a section where nothing else may touch the link.
    fn set_exclusive(&mut self, _exclusive: bool) -> Result<(), FujiError> {
        Ok(())
    }

    /// Fill `buf`, stopping early if a byte does not arrive within `timeout`.
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, FujiError> {
        let mut count = 0;
        while count < buf.len() {
            match self.read_byte(timeout)? {
                Some(b) => {
                    buf[count] = b;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    /// Read until `sentinel` has been seen `occurrences` times, the buffer is
    /// full, or a byte does not arrive within `timeout`.
    fn read_until_sentinel(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
        sentinel: u8,
        occurrences: usize,
    ) -> Result<usize, FujiError> {
        let mut count = 0;
        let mut seen = 0;
        while count < buf.len() {
            let Some(b) = self.read_byte(timeout)? else {
                break;
            };
            buf[count] = b;
            count += 1;
            if b == sentinel {
                seen += 1;
                if seen >= occurrences {
                    break;
                }
            }
        }
        Ok(count)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, FujiError> {
        (**self).write_bytes(data)
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, FujiError> {
        (**self).read_byte(timeout)
    }

    fn set_control_line(&mut self, asserted: bool) -> Result<(), FujiError> {
        (**self).set_control_line(asserted)
    }

    fn wait_transmit_idle(&mut self) -> Result<(), FujiError> {
        (**self).wait_transmit_idle()
    }

    fn flush_receive_buffer(&mut self) -> Result<(), FujiError> {
        (**self).flush_receive_buffer()
    }

    fn set_exclusive(&mut self, exclusive: bool) -> Result<(), FujiError> {
        (**self).set_exclusive(exclusive)
    }

    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, FujiError> {
        (**self).read_bytes(buf, timeout)
    }

    fn read_until_sentinel(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
        sentinel: u8,
        occurrences: usize,
    ) -> Result<usize, FujiError> {
        (**self).read_until_sentinel(buf, timeout, sentinel, occurrences)
    }
}

/// Host serial port opened through the `serialport` crate, 8N1 without flow control.
///
/// A user-space process cannot mask UART interrupts, so `set_exclusive` keeps
/// the trait's no-op. Exclusivity on the host comes from `&mut self`: one
/// engine owns the port and runs one exchange at a time.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn open(config: &PortConfig) -> Result<Self, FujiError> {
        let path = config.port.device_path();
        info!("Opening {} at {} bps", path, config.baud);
        let port = serialport::new(&path, config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeouts.short)
            .open()?;

        Ok(Self {
            port,
            timeout: config.timeouts.short,
        })
    }

    fn use_timeout(&mut self, timeout: Duration) -> Result<(), FujiError> {
        if self.timeout != timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, FujiError> {
        self.port.write_all(data)?;
        Ok(data.len())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, FujiError> {
        self.use_timeout(timeout)?;
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, FujiError> {
        self.use_timeout(timeout)?;
        let mut count = 0;
        while count < buf.len() {
            match self.port.read(&mut buf[count..]) {
                Ok(0) => break,
                Ok(n) => count += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(count)
    }

    fn set_control_line(&mut self, asserted: bool) -> Result<(), FujiError> {
        self.port.write_data_terminal_ready(asserted)?;
        Ok(())
    }

    fn wait_transmit_idle(&mut self) -> Result<(), FujiError> {
        self.port.flush()?;
        Ok(())
    }

    fn flush_receive_buffer(&mut self) -> Result<(), FujiError> {
        let pending = self.port.bytes_to_read()?;
        if pending > 0 {
            debug!(pending, "Discarding stale receive bytes");
        }
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Implements only the required methods, leaving every default in place.
    struct Loopback {
        rx: VecDeque<u8>,
    }

    impl Transport for Loopback {
        fn write_bytes(&mut self, data: &[u8]) -> Result<usize, FujiError> {
            self.rx.extend(data);
            Ok(data.len())
        }

        fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>, FujiError> {
            Ok(self.rx.pop_front())
        }

        fn set_control_line(&mut self, _asserted: bool) -> Result<(), FujiError> {
            Ok(())
        }

        fn wait_transmit_idle(&mut self) -> Result<(), FujiError> {
            Ok(())
        }

        fn flush_receive_buffer(&mut self) -> Result<(), FujiError> {
            self.rx.clear();
            Ok(())
        }
    }

    const T: Duration = Duration::from_millis(100);

    #[test]
    fn test_default_exclusive_is_noop() {
        let mut link = Loopback { rx: VecDeque::new() };
        link.set_exclusive(true).unwrap();
        link.write_bytes(&[1, 2]).unwrap();
        link.set_exclusive(false).unwrap();
        assert_eq!(link.rx, [1, 2]);
    }

    #[test]
    fn test_default_reads() {
        let mut link = Loopback { rx: VecDeque::new() };
        link.write_bytes(&[0x01, 0xC0, 0x02, 0xC0, 0x03]).unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(link.read_until_sentinel(&mut buf, T, 0xC0, 2).unwrap(), 3);
        assert_eq!(buf, [0x01, 0xC0, 0x02]);

        let mut rest = [0u8; 4];
        assert_eq!(link.read_bytes(&mut rest, T).unwrap(), 2);
        assert_eq!(&rest[..2], &[0xC0, 0x03]);
    }
}
