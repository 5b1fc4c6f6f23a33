pub mod listing;

use tracing::{debug, trace};

use crate::{
    addr::Addr,
    image::MemoryImage,
    instruction::{Instruction, OperandKind},
    state::{ProcessorState, apply_flag_effect},
    symbols::{Symbols, bit_name},
};

/// A program image together with the symbols used to render it.
#[derive(Debug, Clone)]
pub struct Disassembler {
    pub image: MemoryImage,
    pub symbols: Symbols,
}

impl Disassembler {
    pub fn new(image: MemoryImage, symbols: Symbols) -> Self {
        Self { image, symbols }
    }

    pub fn is_data_word(&self, addr: Addr) -> bool {
        self.symbols.is_data_word(addr)
    }

    /// Instruction at `addr`, unless the word is absent, data or undecodable.
    pub fn instruction_at(&self, addr: Addr) -> Option<Instruction> {
        if self.is_data_word(addr) {
            return None;
        }
        Instruction::decode(self.image.get(addr)?)
    }

    pub fn label_for(&mut self, addr: Addr) -> &str {
        self.symbols.labels_mut().resolve(addr)
    }

    pub fn register_operand(&self, state: &ProcessorState, file: u8) -> String {
        let index = state.register(file);
        match self.symbols.register_name(index) {
            Some(name) => name.to_owned(),
            None => format!("0x{:02X}", index),
        }
    }

    /// Renders the operands of `instr` as found at `addr`.
    ///
    /// This is also the hook that keeps bank/page tracking in step with the
    /// walk: a `bsf`/`bcf` on RP0, RP1 or PCLATH<4:3> updates `state`.
    pub fn resolve_operands(
        &mut self,
        instr: &Instruction,
        addr: Addr,
        state: &mut ProcessorState,
    ) -> String {
        match instr.operand() {
            OperandKind::None => String::new(),
            OperandKind::File => self.register_operand(state, instr.file()),
            OperandKind::FileDest => {
                format!("{}, {}", self.register_operand(state, instr.file()), instr.dest())
            }
            OperandKind::FileBit => {
                let index = state.register(instr.file());
                let register = self.register_operand(state, instr.file());
                let bit = self
                    .symbols
                    .register_name(index)
                    .and_then(|name| bit_name(name, instr.bit()))
                    .map(str::to_owned)
                    .unwrap_or_else(|| instr.bit().to_string());
                apply_flag_effect(&self.symbols, addr, instr, state);
                format!("{register}, {bit}")
            }
            OperandKind::Literal8 => format!("0x{:02X}", instr.literal8()),
            OperandKind::Literal11 => {
                let target = state.target(instr.literal11());
                self.label_for(target).to_owned()
            }
        }
    }

    /// Pass 1: names every `call`/`goto` target.
    ///
    /// Bank/page state is tracked in program order, not control-flow order,
    /// so a target reached after a page switch on another path can resolve
    /// into the wrong page. The call-depth analysis resolves targets per
    /// path; this sweep only has to make sure branch operands have names
    /// before printing. Returns the number of labels it created.
    pub fn scan(&mut self) -> usize {
        let before = self.symbols.labels().len();
        let mut state = ProcessorState::default();
        for ix in 0..self.image.codesize() {
            let addr = Addr(ix);
            let Some(instr) = self.instruction_at(addr) else {
                continue;
            };
            if instr.mnemonic().is_branch() {
                let target = state.target(instr.literal11());
                trace!(%addr, %target, "branch target");
                self.label_for(target);
            }
            apply_flag_effect(&self.symbols, addr, &instr, &mut state);
        }
        let created = self.symbols.labels().len() - before;
        debug!(created, "label scan done");
        created
    }
}
