//! Device programming parameters, as sent by the host with `Set device
//! parameters` (STK500 `Cmnd_STK_SET_DEVICE`).

use crate::protocol::DEVICE_PARAMS_LEN;

/// Negotiated device parameters.
///
/// Only `page_size` and `eeprom_size` are used by the bridge, every other
/// field is stored so the block can be reported back unchanged.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct DeviceParameters {
    pub device_code: u8,
    pub revision: u8,
    pub prog_type: u8,
    pub par_mode: u8,
    pub polling: u8,
    pub self_timed: u8,
    pub lock_bytes: u8,
    pub fuse_bytes: u8,
    pub flash_poll: u16,
    pub eeprom_poll: u16,
    /// Flash page size in bytes
    pub page_size: u16,
    /// EEPROM size in bytes
    pub eeprom_size: u16,
    /// Flash size in bytes
    pub flash_size: u32,
}

impl DeviceParameters {
    /// Decode a parameter block, multi-byte fields are big endian
    pub fn parse(b: &[u8; DEVICE_PARAMS_LEN]) -> Self {
        Self {
            device_code: b[0],
            revision: b[1],
            prog_type: b[2],
            par_mode: b[3],
            polling: b[4],
            self_timed: b[5],
            lock_bytes: b[6],
            fuse_bytes: b[7],
            flash_poll: u16::from_be_bytes([b[8], b[9]]),
            eeprom_poll: u16::from_be_bytes([b[10], b[11]]),
            page_size: u16::from_be_bytes([b[12], b[13]]),
            eeprom_size: u16::from_be_bytes([b[14], b[15]]),
            flash_size: u32::from_be_bytes([b[16], b[17], b[18], b[19]]),
        }
    }

    /// Encode back to the wire layout accepted by [`DeviceParameters::parse`]
    pub fn to_bytes(&self) -> [u8; DEVICE_PARAMS_LEN] {
        let mut b = [0u8; DEVICE_PARAMS_LEN];

        b[0] = self.device_code;
        b[1] = self.revision;
        b[2] = self.prog_type;
        b[3] = self.par_mode;
        b[4] = self.polling;
        b[5] = self.self_timed;
        b[6] = self.lock_bytes;
        b[7] = self.fuse_bytes;
        b[8..10].copy_from_slice(&self.flash_poll.to_be_bytes());
        b[10..12].copy_from_slice(&self.eeprom_poll.to_be_bytes());
        b[12..14].copy_from_slice(&self.page_size.to_be_bytes());
        b[14..16].copy_from_slice(&self.eeprom_size.to_be_bytes());
        b[16..20].copy_from_slice(&self.flash_size.to_be_bytes());

        b
    }

    /// Mask selecting the page part of a flash word address.
    ///
    /// Unknown page sizes (including the zero default) disable masking, each
    /// word is then treated as its own page.
    pub fn page_mask(&self) -> u16 {
        match self.page_size {
            32 | 64 | 128 | 256 => !((self.page_size >> 1) - 1),
            _ => 0xFFFF,
        }
    }

    /// Page containing the flash word address `addr`
    pub fn page_of(&self, addr: u16) -> u16 {
        addr & self.page_mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ATMEGA328P: [u8; DEVICE_PARAMS_LEN] = [
        0x86, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x03, 0xff, 0xff, 0xff, 0xff, 0x00, 0x80, 0x04,
        0x00, 0x00, 0x00, 0x80, 0x00,
    ];

    #[test]
    fn parse_atmega328p_block() {
        let p = DeviceParameters::parse(&ATMEGA328P);

        assert_eq!(p.device_code, 0x86);
        assert_eq!(p.fuse_bytes, 0x03);
        assert_eq!(p.flash_poll, 0xffff);
        assert_eq!(p.page_size, 128);
        assert_eq!(p.eeprom_size, 1024);
        assert_eq!(p.flash_size, 32 * 1024);
        assert_eq!(p.to_bytes(), ATMEGA328P);
    }

    #[test]
    fn page_mask_by_size() {
        let mut p = DeviceParameters::default();
        assert_eq!(p.page_of(0x1234), 0x1234);

        p.page_size = 128;
        assert_eq!(p.page_of(0x0000), 0x0000);
        assert_eq!(p.page_of(0x003f), 0x0000);
        assert_eq!(p.page_of(0x0040), 0x0040);
        assert_eq!(p.page_of(0x1234), 0x1200);

        p.page_size = 32;
        assert_eq!(p.page_of(0x001f), 0x0010);

        p.page_size = 96;
        assert_eq!(p.page_of(0x001f), 0x001f);
    }

    proptest! {
        #[test]
        fn parameter_block_round_trips(block in prop::array::uniform20(any::<u8>())) {
            prop_assert_eq!(DeviceParameters::parse(&block).to_bytes(), block);
        }

        #[test]
        fn page_of_is_idempotent(
            size in prop::sample::select(vec![32u16, 64, 128, 256]),
            addr in any::<u16>(),
        ) {
            let p = DeviceParameters { page_size: size, ..Default::default() };
            let page = p.page_of(addr);

            prop_assert_eq!(p.page_of(page), page);
            prop_assert!(page <= addr);
            prop_assert!(addr - page < size / 2);
        }
    }
}
