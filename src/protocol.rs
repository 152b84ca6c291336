//! STK500v1 wire constants, as spoken by avrdude's `arduino` / `stk500v1`
//! programmer types.

use core::convert::TryFrom;

/// Command executed successfully
pub const STK_OK: u8 = 0x10;
/// Command failed
pub const STK_FAILED: u8 = 0x11;
/// Command not recognised
pub const STK_UNKNOWN: u8 = 0x12;
/// Frame terminated correctly, response follows
pub const STK_INSYNC: u8 = 0x14;
/// Frame not terminated correctly
pub const STK_NOSYNC: u8 = 0x15;

/// End of packet marker terminating every request
pub const CRC_EOP: u8 = 0x20;

/// Size of the transfer buffer, bounds a single flash page write
pub const BUFFER_SIZE: usize = 256;

/// EEPROM writes are consumed from the host in chunks of this size
pub const EEPROM_CHUNK: usize = 32;

/// Length of the `Set device parameters` payload
pub const DEVICE_PARAMS_LEN: usize = 20;

/// Length of the `Set extended parameters` payload
pub const EXT_PARAMS_LEN: usize = 5;

/// Identification returned by `Get sign-on`
pub const SIGN_ON: &[u8] = b"AVR ISP";

pub const HARDWARE_VERSION: u8 = 2;
pub const FIRMWARE_MAJOR_VERSION: u8 = 1;
pub const FIRMWARE_MINOR_VERSION: u8 = 18;
/// Programmer type reported for `PARM_PROGRAMMER_TYPE`, 'S' for serial
pub const PROGRAMMER_TYPE: u8 = b'S';

/// Get parameter sub-codes
pub mod parm {
    pub const HW_VER: u8 = 0x80;
    pub const SW_MAJOR: u8 = 0x81;
    pub const SW_MINOR: u8 = 0x82;
    pub const PROGRAMMER_TYPE: u8 = 0x93;
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Command {
    /// Get in sync with the programmer, clears the sync error
    GetSync = 0x30,

    /// Fetch the programmer identification string
    GetSignOn = 0x31,

    /// Fetch a single programmer parameter (versions, programmer type)
    GetParameter = 0x41,

    /// Set the device programming parameters
    SetDevice = 0x42,

    /// Set the extended device programming parameters (accepted and ignored)
    SetDeviceExt = 0x45,

    /// Hold the target in reset and enable its serial programming interface
    EnterProgMode = 0x50,

    /// Release the target from reset
    LeaveProgMode = 0x51,

    /// Load the word address used by subsequent page operations
    LoadAddress = 0x55,

    /// Issue a raw 4 byte ISP instruction
    Universal = 0x56,

    /// Program a single flash word (legacy, accepted and ignored)
    ProgFlash = 0x60,

    /// Program a single EEPROM byte (legacy, accepted and ignored)
    ProgData = 0x61,

    /// Write a block of flash or EEPROM at the loaded address
    ProgPage = 0x64,

    /// Read a block of flash or EEPROM at the loaded address
    ReadPage = 0x74,

    /// Read the 3 byte device signature
    ReadSign = 0x75,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let c = match v {
            0x30 => Command::GetSync,
            0x31 => Command::GetSignOn,
            0x41 => Command::GetParameter,
            0x42 => Command::SetDevice,
            0x45 => Command::SetDeviceExt,
            0x50 => Command::EnterProgMode,
            0x51 => Command::LeaveProgMode,
            0x55 => Command::LoadAddress,
            0x56 => Command::Universal,
            0x60 => Command::ProgFlash,
            0x61 => Command::ProgData,
            0x64 => Command::ProgPage,
            0x74 => Command::ReadPage,
            0x75 => Command::ReadSign,
            _ => return Err(v),
        };
        Ok(c)
    }
}

/// Target memory selected by the page commands
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum MemorySpace {
    /// Program memory, word addressed and written a page at a time
    Flash = 0x46,
    /// Persistent data memory, byte addressed
    Eeprom = 0x45,
}

impl TryFrom<u8> for MemorySpace {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            b'F' => Ok(MemorySpace::Flash),
            b'E' => Ok(MemorySpace::Eeprom),
            _ => Err(v),
        }
    }
}

/// Serial programming instructions, see the "Serial Programming Instruction
/// Set" table of any ATmega datasheet.
pub mod isp {
    pub const PROGRAMMING_ENABLE: [u8; 4] = [0xAC, 0x53, 0x00, 0x00];

    pub const LOAD_PAGE_LOW: u8 = 0x40;
    pub const LOAD_PAGE_HIGH: u8 = 0x48;
    pub const WRITE_PAGE: u8 = 0x4C;

    pub const READ_FLASH_LOW: u8 = 0x20;
    pub const READ_FLASH_HIGH: u8 = 0x28;

    pub const WRITE_EEPROM: u8 = 0xC0;
    pub const READ_EEPROM: u8 = 0xA0;

    pub const READ_SIGNATURE: u8 = 0x30;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_decode() {
        assert_eq!(Command::try_from(b'0'), Ok(Command::GetSync));
        assert_eq!(Command::try_from(b'V'), Ok(Command::Universal));
        assert_eq!(Command::try_from(0x75), Ok(Command::ReadSign));
        assert_eq!(Command::ReadPage as u8, b't');
        assert_eq!(Command::try_from(CRC_EOP), Err(CRC_EOP));
        assert_eq!(Command::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn memory_space_tags() {
        assert_eq!(MemorySpace::try_from(b'F'), Ok(MemorySpace::Flash));
        assert_eq!(MemorySpace::try_from(b'E'), Ok(MemorySpace::Eeprom));
        assert_eq!(MemorySpace::try_from(b'X'), Err(b'X'));
        assert_eq!(MemorySpace::Flash as u8, 0x46);
    }
}
