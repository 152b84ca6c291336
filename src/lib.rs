//! AVR ISP Bridge.
//!
//! Serves the STK500v1 protocol (as used by avrdude's `stk500v1` and
//! `arduino` programmers) over a serial transport, and translates each
//! request into serial programming instructions for a target AVR.
//!
//! Based on AVR061 (STK500 communication protocol)

use core::convert::TryFrom;
use core::fmt::Debug;
use core::marker::PhantomData;

#[macro_use]
extern crate log;

#[macro_use(block)]
extern crate nb;

extern crate embedded_hal;
use embedded_hal::serial::{Write, Read};
use embedded_hal::blocking::delay::DelayMs;

#[cfg(feature = "structopt")]
extern crate structopt;

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

#[cfg(feature = "linux")]
pub mod linux;

pub mod indicator;
pub mod params;
pub mod protocol;

mod memory;

pub use indicator::{Indicator, Leds};
pub use params::DeviceParameters;

use protocol::*;

/// Byte transport to the host
pub trait Transport<E>: Write<u8, Error = E> + Read<u8, Error = E> {}

impl<T, E> Transport<E> for T where T: Write<u8, Error = E> + Read<u8, Error = E> {}

/// Connection to the target's serial programming interface
pub trait DeviceBus<E> {
    /// Shift out a 4 byte instruction, returning the last byte shifted in
    fn exchange(&mut self, a: u8, b: u8, c: u8, d: u8) -> Result<u8, E>;

    fn set_reset(&mut self, level: bool) -> Result<(), E>;

    fn set_clock(&mut self, level: bool) -> Result<(), E>;

    /// Stop driving the bus when leaving programming mode
    fn release(&mut self) -> Result<(), E> {
        Ok(())
    }
}

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error<E> {
    #[error("transport error: {0:?}")]
    Serial(E),

    #[error("expected end of packet, received 0x{0:02x}")]
    Framing(u8),

    #[error("unknown command 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("unsupported memory type 0x{0:02x}")]
    UnsupportedMemorySpace(u8),

    #[error("{space:?} write of {requested} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        space: MemorySpace,
        requested: u16,
        limit: u16,
    },
}

impl<E> Error<E> {
    /// Protocol errors are reported to the host and do not stop the bridge
    pub fn is_protocol(&self) -> bool {
        !matches!(self, Error::Serial(_))
    }
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Self::Serial(e)
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Time to wait after pulsing the target reset before enabling programming
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "20"))]
    pub reset_delay_ms: u32,

    /// Write cycle time to wait after each EEPROM byte
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "4"))]
    pub eeprom_delay_ms: u32,

    /// Number of fault indicator pulses on a rejected programming mode entry
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "3"))]
    pub fault_pulses: u8,

    /// Fault indicator pulse on / off period
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "30"))]
    pub fault_pulse_ms: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            reset_delay_ms: 20,
            eeprom_delay_ms: 4,
            fault_pulses: 3,
            fault_pulse_ms: 30,
        }
    }
}

/// Protocol session state
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Session {
    /// Set on framing loss or unknown commands, cleared by sign-on or
    /// leaving programming mode
    pub sync_error: bool,
    /// Target held in reset with programming enabled
    pub programming: bool,
    /// Word address for the next page operation
    pub address: u16,
}

pub struct Bridge<P, B, D, E, I = ()> {
    session: Session,
    params: DeviceParameters,
    options: Options,
    buff: [u8; BUFFER_SIZE],
    port: P,
    bus: B,
    delay: D,
    indicator: I,
    _err: PhantomData<E>,
}

impl<P, B, D, E> Bridge<P, B, D, E, ()>
where
    P: Transport<E>,
    B: DeviceBus<E>,
    D: DelayMs<u32>,
    E: Debug,
{
    /// Create a new bridge instance without status indication
    pub fn new(port: P, bus: B, delay: D, options: Options) -> Self {
        Self::with_indicator(port, bus, delay, (), options)
    }
}

impl<P, B, D, E, I> Bridge<P, B, D, E, I>
where
    P: Transport<E>,
    B: DeviceBus<E>,
    D: DelayMs<u32>,
    E: Debug,
    I: Indicator,
{
    /// Create a new bridge instance reporting status to `indicator`
    pub fn with_indicator(port: P, bus: B, delay: D, indicator: I, options: Options) -> Self {
        let mut s = Self {
            session: Session::default(),
            params: DeviceParameters::default(),
            options,
            buff: [0u8; BUFFER_SIZE],
            port,
            bus,
            delay,
            indicator,
            _err: PhantomData,
        };
        s.refresh_indicator();
        s
    }

    /// Fetch the session state
    pub fn session(&self) -> Session {
        self.session
    }

    /// Fetch the device parameters last set by the host
    pub fn parameters(&self) -> &DeviceParameters {
        &self.params
    }

    /// Serve commands until the transport or bus fails
    pub fn run(&mut self) -> Result<(), Error<E>> {
        loop {
            match self.poll() {
                Ok(()) | Err(nb::Error::WouldBlock) => (),
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
    }

    /// Execute a single command if one is pending.
    ///
    /// Returns `WouldBlock` when no data is available, otherwise the command
    /// is run to completion, blocking on the transport for the rest of the
    /// request. Protocol errors have already been reported to the host and
    /// are not returned.
    pub fn poll(&mut self) -> nb::Result<(), Error<E>> {
        let c = self.port.read().map_err(|e| e.map(Error::Serial))?;

        let res = self.dispatch(c);
        let flushed = block!(self.port.flush());

        self.refresh_indicator();

        match res {
            Ok(()) => (),
            Err(e) if e.is_protocol() => warn!("{}", e),
            Err(e) => return Err(nb::Error::Other(e)),
        }

        flushed.map_err(|e| nb::Error::Other(Error::Serial(e)))
    }

    fn dispatch(&mut self, c: u8) -> Result<(), Error<E>> {
        // Expecting a command, an EOP here means we lost sync
        if c == CRC_EOP {
            self.session.sync_error = true;
            self.put(STK_NOSYNC)?;
            return Err(Error::Framing(c));
        }

        let cmd = match Command::try_from(c) {
            Ok(cmd) => cmd,
            Err(c) => {
                self.session.sync_error = true;
                self.expect_eop()?;
                self.put(STK_UNKNOWN)?;
                return Err(Error::UnknownCommand(c));
            }
        };

        trace!("Command: {:?}", cmd);

        match cmd {
            Command::GetSync => {
                self.session.sync_error = false;
                self.reply()
            }
            Command::GetSignOn => {
                self.expect_eop()?;
                for b in SIGN_ON {
                    self.put(*b)?;
                }
                self.put(STK_OK)
            }
            Command::GetParameter => {
                let v = match self.get()? {
                    parm::HW_VER => HARDWARE_VERSION,
                    parm::SW_MAJOR => FIRMWARE_MAJOR_VERSION,
                    parm::SW_MINOR => FIRMWARE_MINOR_VERSION,
                    parm::PROGRAMMER_TYPE => PROGRAMMER_TYPE,
                    _ => 0x00,
                };
                self.reply_byte(v)
            }
            Command::SetDevice => {
                self.fill(DEVICE_PARAMS_LEN)?;

                let mut block = [0u8; DEVICE_PARAMS_LEN];
                block.copy_from_slice(&self.buff[..DEVICE_PARAMS_LEN]);
                self.params = DeviceParameters::parse(&block);

                debug!("Device parameters: {:?}", self.params);

                self.reply()
            }
            Command::SetDeviceExt => {
                self.fill(EXT_PARAMS_LEN)?;
                self.reply()
            }
            Command::EnterProgMode => {
                self.enter_programming()?;
                self.reply()
            }
            Command::LeaveProgMode => {
                self.session.sync_error = false;
                self.leave_programming()?;
                self.reply()
            }
            Command::LoadAddress => {
                let lo = self.get()?;
                let hi = self.get()?;
                self.session.address = u16::from_le_bytes([lo, hi]);
                self.reply()
            }
            Command::Universal => {
                self.fill(4)?;
                let [a, b, c, d] = [self.buff[0], self.buff[1], self.buff[2], self.buff[3]];
                let r = self.bus.exchange(a, b, c, d)?;
                self.reply_byte(r)
            }
            Command::ProgFlash => {
                self.get()?;
                self.get()?;
                self.reply()
            }
            Command::ProgData => {
                self.get()?;
                self.reply()
            }
            Command::ProgPage => self.program_page(),
            Command::ReadPage => self.read_page(),
            Command::ReadSign => {
                self.expect_eop()?;
                for n in 0..3 {
                    let s = self.bus.exchange(isp::READ_SIGNATURE, 0x00, n, 0x00)?;
                    self.put(s)?;
                }
                self.put(STK_OK)
            }
        }
    }

    fn enter_programming(&mut self) -> Result<(), Error<E>> {
        if self.session.programming {
            warn!("Already in programming mode");
            self.pulse_fault();
            return Ok(());
        }

        debug!("Entering programming mode");

        self.bus.set_reset(true)?;
        self.bus.set_clock(false)?;
        self.bus.set_reset(false)?;
        self.bus.set_reset(true)?;
        self.bus.set_reset(false)?;

        self.delay.delay_ms(self.options.reset_delay_ms);

        let [a, b, c, d] = isp::PROGRAMMING_ENABLE;
        self.bus.exchange(a, b, c, d)?;

        self.session.programming = true;

        Ok(())
    }

    fn leave_programming(&mut self) -> Result<(), Error<E>> {
        debug!("Leaving programming mode");

        self.bus.set_reset(true)?;
        self.bus.release()?;

        self.session.programming = false;

        Ok(())
    }

    fn pulse_fault(&mut self) {
        for _ in 0..self.options.fault_pulses {
            self.indicator.set_fault(true);
            self.delay.delay_ms(self.options.fault_pulse_ms);
            self.indicator.set_fault(false);
            self.delay.delay_ms(self.options.fault_pulse_ms);
        }
    }

    fn refresh_indicator(&mut self) {
        self.indicator.set_fault(self.session.sync_error);
        self.indicator.set_active(self.session.programming);
    }

    /// Consume the end of packet marker and acknowledge sync.
    ///
    /// On failure the command must be abandoned, no bytes are skipped to
    /// regain sync.
    fn expect_eop(&mut self) -> Result<(), Error<E>> {
        let c = self.get()?;

        if c == CRC_EOP {
            self.put(STK_INSYNC)
        } else {
            self.session.sync_error = true;
            self.put(STK_NOSYNC)?;
            Err(Error::Framing(c))
        }
    }

    fn reply(&mut self) -> Result<(), Error<E>> {
        self.expect_eop()?;
        self.put(STK_OK)
    }

    fn reply_byte(&mut self, v: u8) -> Result<(), Error<E>> {
        self.expect_eop()?;
        self.put(v)?;
        self.put(STK_OK)
    }

    /// Issue an ISP instruction with a big endian address
    fn isp(&mut self, op: u8, addr: u16, data: u8) -> Result<u8, Error<E>> {
        let [hi, lo] = addr.to_be_bytes();
        Ok(self.bus.exchange(op, hi, lo, data)?)
    }

    fn get(&mut self) -> Result<u8, Error<E>> {
        Ok(block!(self.port.read())?)
    }

    fn put(&mut self, v: u8) -> Result<(), Error<E>> {
        block!(self.port.write(v))?;
        Ok(())
    }

    /// Read `n` bytes into the transfer buffer
    fn fill(&mut self, n: usize) -> Result<(), Error<E>> {
        for i in 0..n {
            self.buff[i] = self.get()?;
        }
        Ok(())
    }
}
