//! Linux host adapters: a serial port for the host link, spidev and a sysfs
//! GPIO for the target.

use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::Duration;

use embedded_hal::blocking::spi::Transfer;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::sysfs_gpio::{self, Direction};
use linux_embedded_hal::{Delay, Serial, Spidev, SysfsPin};
use serial_core::{
    BaudRate, CharSize, Error as SerialError, FlowControl, Parity, SerialDevice as _,
    SerialPortSettings as _, StopBits,
};

use crate::{Bridge, DeviceBus, Indicator, Leds, Options};

/// Serial read timeout, bounds how long `poll` waits for a command
const READ_TIMEOUT: Duration = Duration::from_millis(10);

fn gpio_error(e: sysfs_gpio::Error) -> IoErrorKind {
    match e {
        sysfs_gpio::Error::Io(e) => e.kind(),
        _ => IoErrorKind::Other,
    }
}

fn export(num: u64, direction: Direction) -> Result<SysfsPin, IoErrorKind> {
    let pin = SysfsPin::new(num);
    pin.export().map_err(gpio_error)?;
    pin.set_direction(direction).map_err(gpio_error)?;
    Ok(pin)
}

/// Target bus on a spidev device, with reset on a GPIO.
///
/// SCK belongs to the SPI controller, which idles it low in mode 0.
pub struct LinuxBus {
    spi: Spidev,
    reset: SysfsPin,
}

impl LinuxBus {
    pub fn open<P: AsRef<Path>>(
        spi: P,
        reset_gpio: u64,
        speed_hz: u32,
    ) -> Result<Self, IoErrorKind> {
        let mut spi = Spidev::open(spi).map_err(|e| e.kind())?;

        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(speed_hz)
            .lsb_first(false)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.0.configure(&options).map_err(|e| e.kind())?;

        // Leave the target running until programming mode is entered
        let reset = export(reset_gpio, Direction::In)?;

        Ok(Self { spi, reset })
    }
}

impl DeviceBus<IoErrorKind> for LinuxBus {
    fn exchange(&mut self, a: u8, b: u8, c: u8, d: u8) -> Result<u8, IoErrorKind> {
        let mut buff = [a, b, c, d];
        self.spi.transfer(&mut buff).map_err(|e| e.kind())?;
        Ok(buff[3])
    }

    fn set_reset(&mut self, level: bool) -> Result<(), IoErrorKind> {
        let d = if level { Direction::High } else { Direction::Low };
        self.reset.set_direction(d).map_err(gpio_error)
    }

    /// No-op, SCK is driven by the SPI controller
    fn set_clock(&mut self, level: bool) -> Result<(), IoErrorKind> {
        trace!("SCK is controller driven, ignoring set_clock({})", level);
        Ok(())
    }

    fn release(&mut self) -> Result<(), IoErrorKind> {
        self.reset.set_direction(Direction::In).map_err(gpio_error)
    }
}

/// Export optional fault and programming LED GPIOs
pub fn leds(
    fault: Option<u64>,
    active: Option<u64>,
) -> Result<Leds<SysfsPin, SysfsPin>, IoErrorKind> {
    let fault = fault.map(|n| export(n, Direction::Low)).transpose()?;
    let active = active.map(|n| export(n, Direction::Low)).transpose()?;

    Ok(Leds::new(fault, active))
}

impl<I: Indicator> Bridge<Serial, LinuxBus, Delay, IoErrorKind, I> {
    /// Create a new bridge serving the host on a linux serial port
    pub fn linux<P: AsRef<Path>>(
        port: P,
        baud: usize,
        bus: LinuxBus,
        indicator: I,
        options: Options,
    ) -> Result<Self, SerialError> {
        // Open port
        let mut port = Serial::open(port.as_ref())?;

        // Apply settings
        let mut settings = port.0.read_settings()?;

        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::Stop1);
        settings.set_baud_rate(BaudRate::from_speed(baud))?;
        settings.set_flow_control(FlowControl::FlowNone);
        settings.set_parity(Parity::ParityNone);

        port.0.write_settings(&settings)?;
        port.0.set_timeout(READ_TIMEOUT)?;

        // Return instance
        Ok(Self::with_indicator(port, bus, Delay {}, indicator, options))
    }
}
