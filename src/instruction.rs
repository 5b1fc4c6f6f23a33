use crate::sfr;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Addwf,
    Andwf,
    Clrf,
    Clrw,
    Comf,
    Decf,
    Decfsz,
    Incf,
    Incfsz,
    Iorwf,
    Movf,
    Movwf,
    Nop,
    Rlf,
    Rrf,
    Subwf,
    Swapf,
    Xorwf,
    Bcf,
    Bsf,
    Btfsc,
    Btfss,
    Addlw,
    Andlw,
    Call,
    Clrwdt,
    Goto,
    Iorlw,
    Movlw,
    Retfie,
    Retlw,
    Return,
    Sleep,
    Sublw,
    Xorlw,
}

impl Mnemonic {
    pub const fn name(&self) -> &'static str {
        use Mnemonic::*;
        match self {
            Addwf => "addwf",
            Andwf => "andwf",
            Clrf => "clrf",
            Clrw => "clrw",
            Comf => "comf",
            Decf => "decf",
            Decfsz => "decfsz",
            Incf => "incf",
            Incfsz => "incfsz",
            Iorwf => "iorwf",
            Movf => "movf",
            Movwf => "movwf",
            Nop => "nop",
            Rlf => "rlf",
            Rrf => "rrf",
            Subwf => "subwf",
            Swapf => "swapf",
            Xorwf => "xorwf",
            Bcf => "bcf",
            Bsf => "bsf",
            Btfsc => "btfsc",
            Btfss => "btfss",
            Addlw => "addlw",
            Andlw => "andlw",
            Call => "call",
            Clrwdt => "clrwdt",
            Goto => "goto",
            Iorlw => "iorlw",
            Movlw => "movlw",
            Retfie => "retfie",
            Retlw => "retlw",
            Return => "return",
            Sleep => "sleep",
            Sublw => "sublw",
            Xorlw => "xorlw",
        }
    }

    /// Conditionally skips the next instruction.
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Btfsc | Self::Btfss | Self::Decfsz | Self::Incfsz)
    }

    pub const fn is_branch(&self) -> bool {
        matches!(self, Self::Call | Self::Goto)
    }

    pub const fn is_bit_write(&self) -> bool {
        matches!(self, Self::Bsf | Self::Bcf)
    }
}

impl core::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    None,
    /// `f`
    File,
    /// `f, b`
    FileBit,
    /// `f, d`
    FileDest,
    /// `k` (8 bit)
    Literal8,
    /// `k` (11 bit branch target)
    Literal11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionSpec {
    pub mnemonic: Mnemonic,
    pub match_value: u16,
    pub match_mask: u16,
    pub operand: OperandKind,
}

impl InstructionSpec {
    const fn new(mnemonic: Mnemonic, match_value: u16, match_mask: u16, operand: OperandKind) -> Self {
        Self {
            mnemonic,
            match_value,
            match_mask,
            operand,
        }
    }

    pub const fn matches(&self, word: u16) -> bool {
        word & self.match_mask == self.match_value
    }
}

/// The mid-range instruction set. Masks cover all 16 bits so that words with
/// bit 14 or 15 set never decode.
pub static INSTRUCTIONS: [InstructionSpec; 35] = {
    use Mnemonic::*;
    use OperandKind as K;
    [
        // byte oriented
        InstructionSpec::new(Addwf, 0x0700, 0xff00, K::FileDest),
        InstructionSpec::new(Andwf, 0x0500, 0xff00, K::FileDest),
        InstructionSpec::new(Clrf, 0x0180, 0xff80, K::File),
        InstructionSpec::new(Clrw, 0x0100, 0xff80, K::None),
        InstructionSpec::new(Comf, 0x0900, 0xff00, K::FileDest),
        InstructionSpec::new(Decf, 0x0300, 0xff00, K::FileDest),
        InstructionSpec::new(Decfsz, 0x0b00, 0xff00, K::FileDest),
        InstructionSpec::new(Incf, 0x0a00, 0xff00, K::FileDest),
        InstructionSpec::new(Incfsz, 0x0f00, 0xff00, K::FileDest),
        InstructionSpec::new(Iorwf, 0x0400, 0xff00, K::FileDest),
        InstructionSpec::new(Movf, 0x0800, 0xff00, K::FileDest),
        InstructionSpec::new(Movwf, 0x0080, 0xff80, K::File),
        InstructionSpec::new(Nop, 0x0000, 0xff9f, K::None),
        InstructionSpec::new(Rlf, 0x0d00, 0xff00, K::FileDest),
        InstructionSpec::new(Rrf, 0x0c00, 0xff00, K::FileDest),
        InstructionSpec::new(Subwf, 0x0200, 0xff00, K::FileDest),
        InstructionSpec::new(Swapf, 0x0e00, 0xff00, K::FileDest),
        InstructionSpec::new(Xorwf, 0x0600, 0xff00, K::FileDest),
        // bit oriented
        InstructionSpec::new(Bcf, 0x1000, 0xfc00, K::FileBit),
        InstructionSpec::new(Bsf, 0x1400, 0xfc00, K::FileBit),
        InstructionSpec::new(Btfsc, 0x1800, 0xfc00, K::FileBit),
        InstructionSpec::new(Btfss, 0x1c00, 0xfc00, K::FileBit),
        // literal and control
        InstructionSpec::new(Addlw, 0x3e00, 0xfe00, K::Literal8),
        InstructionSpec::new(Andlw, 0x3900, 0xff00, K::Literal8),
        InstructionSpec::new(Call, 0x2000, 0xf800, K::Literal11),
        InstructionSpec::new(Clrwdt, 0x0064, 0xffff, K::None),
        InstructionSpec::new(Goto, 0x2800, 0xf800, K::Literal11),
        InstructionSpec::new(Iorlw, 0x3800, 0xff00, K::Literal8),
        InstructionSpec::new(Movlw, 0x3000, 0xfc00, K::Literal8),
        InstructionSpec::new(Retfie, 0x0009, 0xffff, K::None),
        InstructionSpec::new(Retlw, 0x3400, 0xfc00, K::Literal8),
        InstructionSpec::new(Return, 0x0008, 0xffff, K::None),
        InstructionSpec::new(Sleep, 0x0063, 0xffff, K::None),
        InstructionSpec::new(Sublw, 0x3c00, 0xfe00, K::Literal8),
        InstructionSpec::new(Xorlw, 0x3a00, 0xff00, K::Literal8),
    ]
};

/// First structural match wins; `None` means the word is not an instruction.
pub fn decode(word: u16) -> Option<&'static InstructionSpec> {
    INSTRUCTIONS.iter().find(|spec| spec.matches(word))
}

/// `addwf PCL, F`: computed jump into a table of `retlw`/`goto`.
pub const TABLE_DISPATCH: u16 = 0x0700 | 0x0080 | sfr::PCL as u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    W,
    F,
}

impl core::fmt::Display for Dest {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(match self {
            Self::W => "W",
            Self::F => "F",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub word: u16,
    pub spec: &'static InstructionSpec,
}

impl Instruction {
    pub fn decode(word: u16) -> Option<Self> {
        decode(word).map(|spec| Self { word, spec })
    }

    pub const fn mnemonic(&self) -> Mnemonic {
        self.spec.mnemonic
    }

    pub const fn operand(&self) -> OperandKind {
        self.spec.operand
    }

    /// Bank-relative file register.
    pub const fn file(&self) -> u8 {
        (self.word & 0x7f) as u8
    }

    pub const fn dest(&self) -> Dest {
        if self.word & 0x80 != 0 { Dest::F } else { Dest::W }
    }

    pub const fn bit(&self) -> u8 {
        ((self.word >> 7) & 7) as u8
    }

    pub const fn literal8(&self) -> u8 {
        self.word as u8
    }

    /// Page-relative branch target.
    pub const fn literal11(&self) -> u16 {
        self.word & 0x7ff
    }

    pub const fn is_skip(&self) -> bool {
        self.spec.mnemonic.is_skip()
    }

    pub const fn is_table_dispatch(&self) -> bool {
        self.word == TABLE_DISPATCH
    }
}
