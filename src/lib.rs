pub mod addr;
pub mod analyzer;
pub mod disasm;
pub mod error;
pub mod graph;
pub mod hints;
pub mod image;
pub mod instruction;
pub mod state;
pub mod symbols;

pub use error::{Error, Result};


/// Special function registers and flag bits the core needs to know about.
pub mod sfr {
    pub const PCL: u8 = 0x02;
    pub const STATUS: u8 = 0x03;
    pub const PCLATH: u8 = 0x0a;

    pub const RP0: u8 = 5;
    pub const RP1: u8 = 6;
    pub const PCLATH3: u8 = 3;
    pub const PCLATH4: u8 = 4;
}
