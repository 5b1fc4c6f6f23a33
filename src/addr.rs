/// A word address in program memory.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(pub u16);

impl Addr {
    pub const RESET: Self = Self(0x0000);
    pub const INTERRUPT: Self = Self(0x0004);
    /// First address past program memory.
    pub const CODE_END: Self = Self(0x2000);
    pub const CONFIG: Self = Self(0x2007);
    pub const EEPROM: Self = Self(0x2100);
    /// First address past everything an image can hold.
    pub const IMAGE_END: Self = Self(0x2200);

    pub const PAGE_BITS: u32 = 11;
    pub const PAGE_MASK: u16 = (1 << Self::PAGE_BITS) - 1;

    pub const fn new(addr: u16) -> Self {
        Self(addr)
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Code page this address lives in.
    pub const fn page(self) -> u8 {
        ((self.0 >> Self::PAGE_BITS) & 3) as u8
    }

    /// Absolute target of an 11-bit branch operand taken from `page`.
    pub const fn in_page(page: u8, offset: u16) -> Self {
        Self((((page & 3) as u16) << Self::PAGE_BITS) | (offset & Self::PAGE_MASK))
    }

    pub const fn add(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }

    pub const fn is_code(self) -> bool {
        self.0 < Self::CODE_END.0
    }

    pub fn synthetic_label(self) -> String {
        format!("L{:04X}", self.0)
    }

    /// Parses `0x`-prefixed hex or decimal.
    pub fn parse(s: &str) -> Option<Self> {
        parse_u16(s).map(Self)
    }
}

pub fn parse_u16(s: &str) -> Option<u16> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u16>().ok()
    }
}

impl core::fmt::Display for Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl core::fmt::Debug for Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for Addr {
    fn from(value: u16) -> Self {
        Self(value)
    }
}
