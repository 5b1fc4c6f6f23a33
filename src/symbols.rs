use std::collections::BTreeMap;

use tracing::warn;

use crate::addr::Addr;

/// Mid-range special function registers, all four banks.
const DEFAULT_REGISTERS: &[(u16, &str)] = &[
    (0x000, "INDF"),
    (0x001, "TMR0"),
    (0x002, "PCL"),
    (0x003, "STATUS"),
    (0x004, "FSR"),
    (0x005, "PORTA"),
    (0x006, "PORTB"),
    (0x007, "PORTC"),
    (0x008, "PORTD"),
    (0x009, "PORTE"),
    (0x00a, "PCLATH"),
    (0x00b, "INTCON"),
    (0x00c, "PIR1"),
    (0x00d, "PIR2"),
    (0x00e, "TMR1L"),
    (0x00f, "TMR1H"),
    (0x010, "T1CON"),
    (0x011, "TMR2"),
    (0x012, "T2CON"),
    (0x013, "SSPBUF"),
    (0x014, "SSPCON"),
    (0x015, "CCPR1L"),
    (0x016, "CCPR1H"),
    (0x017, "CCP1CON"),
    (0x018, "RCSTA"),
    (0x019, "TXREG"),
    (0x01a, "RCREG"),
    (0x01b, "CCPR2L"),
    (0x01c, "CCPR2H"),
    (0x01d, "CCP2CON"),
    (0x01e, "ADRESH"),
    (0x01f, "ADCON0"),
    (0x080, "INDF"),
    (0x081, "OPTION_REG"),
    (0x082, "PCL"),
    (0x083, "STATUS"),
    (0x084, "FSR"),
    (0x085, "TRISA"),
    (0x086, "TRISB"),
    (0x087, "TRISC"),
    (0x088, "TRISD"),
    (0x089, "TRISE"),
    (0x08a, "PCLATH"),
    (0x08b, "INTCON"),
    (0x08c, "PIE1"),
    (0x08d, "PIE2"),
    (0x08e, "PCON"),
    (0x091, "SSPCON2"),
    (0x092, "PR2"),
    (0x093, "SSPADD"),
    (0x094, "SSPSTAT"),
    (0x098, "TXSTA"),
    (0x099, "SPBRG"),
    (0x09e, "ADRESL"),
    (0x09f, "ADCON1"),
    (0x100, "INDF"),
    (0x101, "TMR0"),
    (0x102, "PCL"),
    (0x103, "STATUS"),
    (0x104, "FSR"),
    (0x106, "PORTB"),
    (0x10a, "PCLATH"),
    (0x10b, "INTCON"),
    (0x10c, "EEDATA"),
    (0x10d, "EEADR"),
    (0x10e, "EEDATH"),
    (0x10f, "EEADRH"),
    (0x180, "INDF"),
    (0x181, "OPTION_REG"),
    (0x182, "PCL"),
    (0x183, "STATUS"),
    (0x184, "FSR"),
    (0x186, "TRISB"),
    (0x18a, "PCLATH"),
    (0x18b, "INTCON"),
    (0x18c, "EECON1"),
    (0x18d, "EECON2"),
];

/// Bit names by register name, bit 0 first. Empty strings are unnamed bits.
const BIT_NAMES: &[(&str, [&str; 8])] = &[
    ("STATUS", ["C", "DC", "Z", "NOT_PD", "NOT_TO", "RP0", "RP1", "IRP"]),
    ("INTCON", ["RBIF", "INTF", "T0IF", "RBIE", "INTE", "T0IE", "PEIE", "GIE"]),
    (
        "OPTION_REG",
        ["PS0", "PS1", "PS2", "PSA", "T0SE", "T0CS", "INTEDG", "NOT_RBPU"],
    ),
    (
        "PIR1",
        ["TMR1IF", "TMR2IF", "CCP1IF", "SSPIF", "TXIF", "RCIF", "ADIF", "PSPIF"],
    ),
    (
        "PIE1",
        ["TMR1IE", "TMR2IE", "CCP1IE", "SSPIE", "TXIE", "RCIE", "ADIE", "PSPIE"],
    ),
    ("PIR2", ["CCP2IF", "", "", "BCLIF", "EEIF", "", "", ""]),
    ("PIE2", ["CCP2IE", "", "", "BCLIE", "EEIE", "", "", ""]),
    (
        "T1CON",
        ["TMR1ON", "TMR1CS", "NOT_T1SYNC", "T1OSCEN", "T1CKPS0", "T1CKPS1", "", ""],
    ),
    (
        "T2CON",
        ["T2CKPS0", "T2CKPS1", "TMR2ON", "TOUTPS0", "TOUTPS1", "TOUTPS2", "TOUTPS3", ""],
    ),
    ("RCSTA", ["RX9D", "OERR", "FERR", "ADDEN", "CREN", "SREN", "RX9", "SPEN"]),
    ("TXSTA", ["TX9D", "TRMT", "BRGH", "", "SYNC", "TXEN", "TX9", "CSRC"]),
    ("EECON1", ["RD", "WR", "WREN", "WRERR", "", "", "", "EEPGD"]),
    ("PCON", ["NOT_BOR", "NOT_POR", "", "", "", "", "", ""]),
    ("ADCON0", ["ADON", "", "GO", "CHS0", "CHS1", "CHS2", "ADCS0", "ADCS1"]),
    ("ADCON1", ["PCFG0", "PCFG1", "PCFG2", "PCFG3", "", "", "", "ADFM"]),
];

pub fn bit_name(register: &str, bit: u8) -> Option<&'static str> {
    let (_, names) = BIT_NAMES.iter().find(|(name, _)| *name == register)?;
    names.get(usize::from(bit)).copied().filter(|name| !name.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOrigin {
    User,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub origin: LabelOrigin,
}

/// Address to name. Entries are never overwritten once assigned.
#[derive(Debug, Clone, Default)]
pub struct Labels {
    map: BTreeMap<Addr, Label>,
}

impl Labels {
    pub fn get(&self, addr: Addr) -> Option<&str> {
        self.map.get(&addr).map(|label| label.name.as_str())
    }

    pub fn label(&self, addr: Addr) -> Option<&Label> {
        self.map.get(&addr)
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.map.contains_key(&addr)
    }

    /// Returns false if the address already had a label.
    pub fn insert_user(&mut self, addr: Addr, name: impl Into<String>) -> bool {
        if let Some(existing) = self.map.get(&addr) {
            warn!(%addr, existing = %existing.name, "address already labeled");
            return false;
        }
        self.map.insert(
            addr,
            Label {
                name: name.into(),
                origin: LabelOrigin::User,
            },
        );
        true
    }

    /// Name for `addr`, synthesizing `Lxxxx` on first use.
    pub fn resolve(&mut self, addr: Addr) -> &str {
        &self
            .map
            .entry(addr)
            .or_insert_with(|| Label {
                name: addr.synthetic_label(),
                origin: LabelOrigin::Synthetic,
            })
            .name
    }

    pub fn iter(&self) -> impl Iterator<Item = (Addr, &Label)> {
        self.map.iter().map(|(addr, label)| (*addr, label))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Half-open range of words excluded from decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRange {
    pub start: Addr,
    pub end: Addr,
    pub name: String,
}

impl DataRange {
    pub fn new(start: Addr, end: Addr, name: impl Into<String>) -> Self {
        Self {
            start,
            end,
            name: name.into(),
        }
    }

    pub fn inclusive(first: Addr, last: Addr, name: impl Into<String>) -> Self {
        Self::new(first, Addr(last.0.saturating_add(1)), name)
    }

    pub fn contains(&self, addr: Addr) -> bool {
        (self.start..self.end).contains(&addr)
    }
}

#[derive(Debug, Clone)]
pub struct Symbols {
    registers: BTreeMap<u16, String>,
    labels: Labels,
    data: Vec<DataRange>,
}

impl Symbols {
    /// Built-in register names and the config/eeprom data ranges.
    pub fn new() -> Self {
        let mut symbols = Self::empty();
        for (index, name) in DEFAULT_REGISTERS {
            symbols.registers.insert(*index, (*name).to_owned());
        }
        symbols.add_data_range(DataRange::new(Addr::CONFIG, Addr::CONFIG.add(1), "config"));
        symbols.add_data_range(DataRange::new(Addr::EEPROM, Addr::IMAGE_END, "eeprom"));
        symbols
    }

    pub fn empty() -> Self {
        Self {
            registers: BTreeMap::new(),
            labels: Labels::default(),
            data: vec![],
        }
    }

    pub fn register_name(&self, index: u16) -> Option<&str> {
        self.registers.get(&index).map(String::as_str)
    }

    pub fn set_register(&mut self, index: u16, name: impl Into<String>) {
        self.registers.insert(index, name.into());
    }

    pub fn registers(&self) -> impl Iterator<Item = (u16, &str)> {
        self.registers.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut Labels {
        &mut self.labels
    }

    pub fn add_data_range(&mut self, range: DataRange) {
        self.data.push(range);
    }

    pub fn data_ranges(&self) -> &[DataRange] {
        &self.data
    }

    pub fn is_data_word(&self, addr: Addr) -> bool {
        self.data.iter().any(|range| range.contains(addr))
    }
}

impl Default for Symbols {
    fn default() -> Self {
        Self::new()
    }
}
