//! Memory queue rank base registers.
//!
//! Unlike the controller registers these are plain DCRs.

/// DCR number of R0BAS.
pub const R0BAS: u16 = 0x40;

pub const fn rxbas(index: usize) -> u16 {
    R0BAS + index as u16
}

#[bitbybit::bitenum(u10, exhaustive = false)]
#[derive(Debug, PartialEq, Eq)]
pub enum RankSize {
    _8M = 0x3FF,
    _16M = 0x3FE,
    _32M = 0x3FC,
    _64M = 0x3F8,
    _128M = 0x3F0,
    _256M = 0x3E0,
    _512M = 0x3C0,
    _1G = 0x380,
    _2G = 0x300,
    _4G = 0x200,
}

impl RankSize {
    pub const fn from_megabytes(mb: u32) -> Option<Self> {
        Some(match mb {
            8 => Self::_8M,
            16 => Self::_16M,
            32 => Self::_32M,
            64 => Self::_64M,
            128 => Self::_128M,
            256 => Self::_256M,
            512 => Self::_512M,
            1024 => Self::_1G,
            2048 => Self::_2G,
            4096 => Self::_4G,
            _ => return None,
        })
    }

    pub const fn megabytes(&self) -> u32 {
        match self {
            Self::_8M => 8,
            Self::_16M => 16,
            Self::_32M => 32,
            Self::_64M => 64,
            Self::_128M => 128,
            Self::_256M => 256,
            Self::_512M => 512,
            Self::_1G => 1024,
            Self::_2G => 2048,
            Self::_4G => 4096,
        }
    }
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct RxBas {
    /// Base address bits 33..23, so the field holds the physical address shifted right by 2.
    #[bits(21..=31, rw)]
    base: arbitrary_int::u11,
    #[bits(6..=15, rw)]
    size: Option<RankSize>,
}

impl RxBas {
    pub const fn base_address(&self) -> u64 {
        ((self.base().value() as u64) << 21) << 2
    }

    /// Decodes the rank size, returning [None] for a disabled or unsupported encoding.
    pub const fn size_megabytes(&self) -> Option<u32> {
        Some(match (self.raw_value() >> 6) & 0x3FF {
            0x3FF => 8,
            0x3FE => 16,
            0x3FC => 32,
            0x3F8 => 64,
            0x3F0 => 128,
            0x3E0 => 256,
            0x3C0 => 512,
            0x380 => 1024,
            0x300 => 2048,
            0x200 => 4096,
            _ => return None,
        })
    }

    pub const fn encode_base(addr: u64) -> arbitrary_int::u11 {
        arbitrary_int::u11::new((((addr >> 2) >> 21) & 0x7FF) as u16)
    }
}
