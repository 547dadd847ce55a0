//! Real serial ports through the `serialport` crate.

use std::io;

use serialport::{ClearBuffer, SerialPort};

use crate::config::{DataBits, Parity, SerialConfig, StopBits};
use crate::error::Result;
use crate::traits::{PortOpener, SerialLink};

/// Opens operating-system serial ports.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialLink>> {
        log::debug!("opening {} at {} baud", config.path, config.baud_rate);
        let port = serialport::new(&config.path, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .parity(parity(config.parity))
            .stop_bits(stop_bits(config.stop_bits))
            .timeout(config.read_poll())
            .open()?;
        Ok(Box::new(SystemPort { port }))
    }
}

/// A `serialport` handle adapted to [`SerialLink`].
pub struct SystemPort {
    port: Box<dyn SerialPort>,
}

impl io::Read for SystemPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl io::Write for SystemPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialLink for SystemPort {
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(SystemPort { port }))
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;

    #[test]
    fn framing_maps_one_to_one() {
        assert_eq!(data_bits(DataBits::Seven), serialport::DataBits::Seven);
        assert_eq!(parity(Parity::Even), serialport::Parity::Even);
        assert_eq!(stop_bits(StopBits::Two), serialport::StopBits::Two);
    }

    #[test]
    fn missing_port_is_a_port_error() {
        let config = SerialConfig::new("/dev/rs-arest-does-not-exist");
        let err = SystemPortOpener.open(&config).err().unwrap();
        assert!(matches!(err, BoardError::Port(_)));
    }
}
