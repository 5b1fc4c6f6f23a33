use tracing::trace;

use crate::{
    addr::Addr,
    instruction::{Instruction, Mnemonic},
    sfr,
    symbols::Symbols,
};

/// Bank and code page selection, simulated forward along a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProcessorState {
    /// RP1:RP0
    pub bank: u8,
    /// PCLATH<4:3>
    pub code_page: u8,
}

impl ProcessorState {
    /// State assumed on entry to code at `addr`.
    pub const fn at(addr: Addr) -> Self {
        Self {
            bank: 0,
            code_page: addr.page(),
        }
    }

    /// Absolute register index of a bank-relative file operand.
    pub const fn register(&self, file: u8) -> u16 {
        ((file & 0x7f) as u16) | ((self.bank as u16 & 3) << 7)
    }

    /// Absolute target of a `call`/`goto` operand.
    pub const fn target(&self, offset: u16) -> Addr {
        Addr::in_page(self.code_page, offset)
    }

    pub fn set(&mut self, flag: StateFlag, on: bool) {
        let (field, bit) = match flag {
            StateFlag::Rp0 => (&mut self.bank, 0),
            StateFlag::Rp1 => (&mut self.bank, 1),
            StateFlag::Pclath3 => (&mut self.code_page, 0),
            StateFlag::Pclath4 => (&mut self.code_page, 1),
        };
        if on {
            *field |= 1 << bit;
        } else {
            *field &= !(1 << bit);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFlag {
    Rp0,
    Rp1,
    Pclath3,
    Pclath4,
}

impl StateFlag {
    /// Flag controlled by bit `bit` of the register called `register`.
    pub fn from_resolved(register: &str, bit: u8) -> Option<Self> {
        match (register, bit) {
            ("STATUS", sfr::RP0) => Some(Self::Rp0),
            ("STATUS", sfr::RP1) => Some(Self::Rp1),
            ("PCLATH", sfr::PCLATH3) => Some(Self::Pclath3),
            ("PCLATH", sfr::PCLATH4) => Some(Self::Pclath4),
            _ => None,
        }
    }
}

/// The one place bank/page state changes: a `bsf`/`bcf` on RP0, RP1 or
/// PCLATH<3>/<4>, identified by the register's resolved name so that every
/// bank mirror of STATUS and PCLATH counts.
pub fn apply_flag_effect(
    symbols: &Symbols,
    addr: Addr,
    instr: &Instruction,
    state: &mut ProcessorState,
) -> Option<StateFlag> {
    let on = match instr.mnemonic() {
        Mnemonic::Bsf => true,
        Mnemonic::Bcf => false,
        _ => return None,
    };
    let register = symbols.register_name(state.register(instr.file()))?;
    let flag = StateFlag::from_resolved(register, instr.bit())?;
    state.set(flag, on);
    trace!(%addr, ?flag, on, bank = state.bank, page = state.code_page, "processor state changed");
    Some(flag)
}
