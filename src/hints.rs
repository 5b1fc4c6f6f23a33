//! Symbol and section hint files.
//!
//! ```text
//! # comment
//! reg   0x20 counter
//! label 0x0100 main
//! data  0x0800 0x08ff strings
//! ```

use std::path::Path;

use tracing::{debug, warn};

use crate::{
    Error,
    addr::{Addr, parse_u16},
    symbols::{DataRange, Symbols},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct HintError {
    pub line: usize,
    pub kind: HintErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HintErrorKind {
    #[error("unknown directive `{0}`")]
    UnknownDirective(String),
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("invalid number `{0}`")]
    BadNumber(String),
    #[error("range end lies before its start")]
    EmptyRange,
    #[error("unexpected trailing `{0}`")]
    Trailing(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HintSummary {
    pub registers: usize,
    pub labels: usize,
    pub ranges: usize,
}

pub fn load(path: impl AsRef<Path>, symbols: &mut Symbols) -> Result<HintSummary, Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_owned(),
        source,
    })?;
    let summary = parse(&text, symbols)?;
    debug!(path = %path.display(), ?summary, "loaded hints");
    Ok(summary)
}

pub fn parse(text: &str, symbols: &mut Symbols) -> Result<HintSummary, HintError> {
    let mut summary = HintSummary::default();
    for (ix, line) in text.lines().enumerate() {
        let line = line.split(['#', ';']).next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        let Some(directive) = fields.next() else {
            continue;
        };
        let err = |kind| HintError { line: ix + 1, kind };
        match directive {
            "reg" => {
                let index = number(fields.next(), "register address").map_err(err)?;
                let name = field(fields.next(), "register name").map_err(err)?;
                symbols.set_register(index, name);
                summary.registers += 1;
            }
            "label" => {
                let addr = number(fields.next(), "label address").map_err(err)?;
                let name = field(fields.next(), "label name").map_err(err)?;
                if symbols.labels_mut().insert_user(Addr(addr), name) {
                    summary.labels += 1;
                } else {
                    warn!(line = ix + 1, addr = %Addr(addr), "keeping earlier label");
                }
            }
            "data" => {
                let first = number(fields.next(), "range start").map_err(err)?;
                let last = number(fields.next(), "range end").map_err(err)?;
                if last < first {
                    return Err(err(HintErrorKind::EmptyRange));
                }
                let name = fields.next().unwrap_or("data");
                symbols.add_data_range(DataRange::inclusive(Addr(first), Addr(last), name));
                summary.ranges += 1;
            }
            other => return Err(err(HintErrorKind::UnknownDirective(other.to_owned()))),
        }
        if let Some(extra) = fields.next() {
            return Err(err(HintErrorKind::Trailing(extra.to_owned())));
        }
    }
    Ok(summary)
}

fn field<'a>(field: Option<&'a str>, what: &'static str) -> Result<&'a str, HintErrorKind> {
    field.ok_or(HintErrorKind::MissingField(what))
}

fn number(field: Option<&str>, what: &'static str) -> Result<u16, HintErrorKind> {
    let field = field.ok_or(HintErrorKind::MissingField(what))?;
    parse_u16(field).ok_or_else(|| HintErrorKind::BadNumber(field.to_owned()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn all_directives() {
        let mut symbols = Symbols::new();
        let text = "
# user registers
reg 0x20 counter
reg 0xa0 shadow   ; bank 1
label 0x0100 main
data 0x0800 0x08ff strings
data 2000 2001
";
        let summary = parse(text, &mut symbols).unwrap();
        assert_eq!(
            summary,
            HintSummary {
                registers: 2,
                labels: 1,
                ranges: 2
            }
        );
        assert_eq!(symbols.register_name(0x20), Some("counter"));
        assert_eq!(symbols.register_name(0xa0), Some("shadow"));
        assert_eq!(symbols.labels().get(Addr(0x100)), Some("main"));
        assert!(symbols.is_data_word(Addr(0x08ff)));
        assert!(!symbols.is_data_word(Addr(0x0900)));
        assert!(symbols.is_data_word(Addr(2001)));
        assert_eq!(symbols.data_ranges().last().unwrap().name, "data");
    }

    #[test]
    fn duplicate_label_keeps_first() {
        let mut symbols = Symbols::new();
        let summary = parse("label 0x10 first\nlabel 0x10 second\n", &mut symbols).unwrap();
        assert_eq!(summary.labels, 1);
        assert_eq!(symbols.labels().get(Addr(0x10)), Some("first"));
    }

    #[test]
    fn errors_carry_line_numbers() {
        let mut symbols = Symbols::new();
        assert_matches!(
            parse("reg 0x20 a\nfoo 1 2\n", &mut symbols),
            Err(HintError { line: 2, kind: HintErrorKind::UnknownDirective(d) }) if d == "foo"
        );
        assert_matches!(
            parse("label 0x10\n", &mut symbols),
            Err(HintError {
                line: 1,
                kind: HintErrorKind::MissingField("label name")
            })
        );
        assert_matches!(
            parse("\n\nreg 0xzz x\n", &mut symbols),
            Err(HintError { line: 3, kind: HintErrorKind::BadNumber(_) })
        );
        assert_matches!(
            parse("data 0x10 0x0f\n", &mut symbols),
            Err(HintError {
                kind: HintErrorKind::EmptyRange,
                ..
            })
        );
        assert_matches!(
            parse("reg 0x20 a b\n", &mut symbols),
            Err(HintError {
                kind: HintErrorKind::Trailing(_),
                ..
            })
        );
    }
}
