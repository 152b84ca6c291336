//! Paged flash and EEPROM transfers.
//!
//! Flash is word addressed and written through the target's page buffer,
//! EEPROM is byte addressed at twice the loaded word address.

use core::convert::TryFrom;
use core::fmt::Debug;

use embedded_hal::blocking::delay::DelayMs;

use crate::protocol::*;
use crate::{Bridge, DeviceBus, Error, Indicator, Transport};

impl<P, B, D, E, I> Bridge<P, B, D, E, I>
where
    P: Transport<E>,
    B: DeviceBus<E>,
    D: DelayMs<u32>,
    E: Debug,
    I: Indicator,
{
    /// Handle `Cmnd_STK_PROG_PAGE`
    pub(crate) fn program_page(&mut self) -> Result<(), Error<E>> {
        let length = self.get_length()?;
        let tag = self.get()?;

        let space = match MemorySpace::try_from(tag) {
            Ok(s) => s,
            Err(t) => {
                self.reject(length)?;
                return Err(Error::UnsupportedMemorySpace(t));
            }
        };

        let limit = match space {
            MemorySpace::Flash => self.params.page_size.min(BUFFER_SIZE as u16),
            MemorySpace::Eeprom => self.params.eeprom_size,
        };

        if length > limit {
            self.session.sync_error = true;
            self.reject(length)?;
            return Err(Error::PayloadTooLarge {
                space,
                requested: length,
                limit,
            });
        }

        match space {
            MemorySpace::Flash => self.write_flash(length),
            MemorySpace::Eeprom => self.write_eeprom(length),
        }
    }

    /// Handle `Cmnd_STK_READ_PAGE`
    pub(crate) fn read_page(&mut self) -> Result<(), Error<E>> {
        let length = self.get_length()?;
        let tag = self.get()?;

        self.expect_eop()?;

        match MemorySpace::try_from(tag) {
            Ok(MemorySpace::Flash) => self.read_flash(length),
            Ok(MemorySpace::Eeprom) => self.read_eeprom(length),
            Err(t) => {
                self.put(STK_FAILED)?;
                Err(Error::UnsupportedMemorySpace(t))
            }
        }
    }

    fn write_flash(&mut self, length: u16) -> Result<(), Error<E>> {
        let length = length as usize;

        self.fill(length)?;
        self.expect_eop()?;

        let mut page = self.params.page_of(self.session.address);

        for w in 0..length / 2 {
            let addr = self.session.address;

            if self.params.page_of(addr) != page {
                self.commit(page)?;
                page = self.params.page_of(addr);
            }

            let (lo, hi) = (self.buff[w * 2], self.buff[w * 2 + 1]);
            self.isp(isp::LOAD_PAGE_LOW, addr, lo)?;
            self.isp(isp::LOAD_PAGE_HIGH, addr, hi)?;

            self.session.address = addr.wrapping_add(1);
        }

        if length >= 2 {
            self.commit(page)?;
        }

        self.put(STK_OK)
    }

    fn commit(&mut self, page: u16) -> Result<(), Error<E>> {
        debug!("Writing flash page 0x{:04x}", page);
        self.isp(isp::WRITE_PAGE, page, 0x00)?;
        Ok(())
    }

    fn write_eeprom(&mut self, length: u16) -> Result<(), Error<E>> {
        let mut addr = self.session.address.wrapping_mul(2);
        let mut remaining = length as usize;

        // Payload is consumed and written a chunk at a time
        while remaining > 0 {
            let n = remaining.min(EEPROM_CHUNK);
            self.fill(n)?;

            for i in 0..n {
                let v = self.buff[i];
                self.isp(isp::WRITE_EEPROM, addr, v)?;
                self.delay.delay_ms(self.options.eeprom_delay_ms);
                addr = addr.wrapping_add(1);
            }

            remaining -= n;
        }

        self.advance(length);

        self.expect_eop()?;
        self.put(STK_OK)
    }

    fn read_flash(&mut self, length: u16) -> Result<(), Error<E>> {
        let base = self.session.address;

        for i in 0..length {
            let op = if i & 1 == 0 {
                isp::READ_FLASH_LOW
            } else {
                isp::READ_FLASH_HIGH
            };
            let v = self.isp(op, base.wrapping_add(i / 2), 0x00)?;
            self.put(v)?;
        }

        self.advance(length);

        self.put(STK_OK)
    }

    fn read_eeprom(&mut self, length: u16) -> Result<(), Error<E>> {
        let base = self.session.address.wrapping_mul(2);

        for i in 0..length {
            let v = self.isp(isp::READ_EEPROM, base.wrapping_add(i), 0xFF)?;
            self.put(v)?;
        }

        self.advance(length);

        self.put(STK_OK)
    }

    /// Consume a refused payload and its terminator, then report failure
    fn reject(&mut self, length: u16) -> Result<(), Error<E>> {
        for _ in 0..length {
            self.get()?;
        }

        self.expect_eop()?;
        self.put(STK_FAILED)
    }

    /// Move the loaded address past the words touched by a `length` byte transfer
    fn advance(&mut self, length: u16) {
        let words = ((length as u32 + 1) / 2) as u16;
        self.session.address = self.session.address.wrapping_add(words);
    }

    /// Page lengths are sent big endian
    fn get_length(&mut self) -> Result<u16, Error<E>> {
        let hi = self.get()?;
        let lo = self.get()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }
}
