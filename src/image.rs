use std::path::Path;

use nom::{
    IResult,
    bytes::complete::take_while_m_n,
    character::complete::char,
    combinator::map_res,
    multi::many0,
    sequence::preceded,
};
use tracing::{debug, warn};

use crate::{Error, addr::Addr};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image contains no words")]
    Empty,
    #[error("binary image has an odd number of bytes ({0})")]
    OddLength(usize),
    #[error("word address 0x{0:x} is outside the program image")]
    OutOfRange(u32),
    #[error("line {line}: {kind}")]
    Record { line: usize, kind: RecordError },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record does not start with ':'")]
    MissingColon,
    #[error("invalid hex digits")]
    BadHex,
    #[error("record too short")]
    Truncated,
    #[error("byte count does not match record length")]
    LengthMismatch,
    #[error("checksum mismatch (expected {expected:02x}, found {found:02x})")]
    Checksum { expected: u8, found: u8 },
    #[error("unsupported record type {0:02x}")]
    UnknownType(u8),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Intel HEX if the file starts with `:`, raw binary otherwise.
    #[default]
    Auto,
    Binary,
    Hex,
}

/// Sparse program image with a presence mask.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    words: Vec<u16>,
    present: Vec<bool>,
    codesize: u16,
}

impl MemoryImage {
    pub const SIZE: usize = Addr::IMAGE_END.index();

    pub fn new() -> Self {
        Self {
            words: vec![0; Self::SIZE],
            present: vec![false; Self::SIZE],
            codesize: 0,
        }
    }

    /// Consecutive words starting at `base`.
    pub fn from_words(base: Addr, words: &[u16]) -> Result<Self, ImageError> {
        let mut image = Self::new();
        for (i, word) in words.iter().enumerate() {
            image.set(Addr(base.0.wrapping_add(i as u16)), *word)?;
        }
        Ok(image)
    }

    /// Little-endian words starting at address 0.
    pub fn from_binary(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let pairs: &[[u8; 2]] = bytemuck::try_cast_slice(bytes)
            .map_err(|_| ImageError::OddLength(bytes.len()))?;
        if pairs.len() > Self::SIZE {
            return Err(ImageError::OutOfRange(Self::SIZE as u32));
        }
        let words = pairs
            .iter()
            .map(|pair| u16::from_le_bytes(*pair))
            .collect::<Vec<_>>();
        Self::from_words(Addr::RESET, &words)
    }

    pub fn from_ihex(text: &str) -> Result<Self, ImageError> {
        let mut image = Self::new();
        let mut base: u32 = 0;
        let mut seen_eof = false;
        for (ix, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = parse_record(line).map_err(|kind| ImageError::Record { line: ix + 1, kind })?;
            match record.ty {
                0x00 => {
                    let start = base + u32::from(record.offset);
                    for (i, byte) in record.data.iter().enumerate() {
                        image.set_byte(start + i as u32, *byte)?;
                    }
                }
                0x01 => {
                    seen_eof = true;
                    break;
                }
                0x02 | 0x04 => {
                    let &[hi, lo] = record.data.as_slice() else {
                        return Err(ImageError::Record {
                            line: ix + 1,
                            kind: RecordError::LengthMismatch,
                        });
                    };
                    let value = u32::from(u16::from_be_bytes([hi, lo]));
                    base = if record.ty == 0x02 { value << 4 } else { value << 16 };
                }
                0x03 | 0x05 => debug!(line = ix + 1, "ignoring start address record"),
                ty => {
                    return Err(ImageError::Record {
                        line: ix + 1,
                        kind: RecordError::UnknownType(ty),
                    });
                }
            }
        }
        if !seen_eof {
            warn!("hex file has no end-of-file record");
        }
        if image.present.iter().all(|p| !p) {
            return Err(ImageError::Empty);
        }
        Ok(image)
    }

    pub fn load(path: impl AsRef<Path>, format: Format) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })?;
        let format = match format {
            Format::Auto if bytes.first() == Some(&b':') => Format::Hex,
            Format::Auto => Format::Binary,
            format => format,
        };
        let image = match format {
            Format::Hex => Self::from_ihex(&String::from_utf8_lossy(&bytes))?,
            _ => Self::from_binary(&bytes)?,
        };
        debug!(path = %path.display(), ?format, codesize = image.codesize, "loaded image");
        Ok(image)
    }

    pub fn set(&mut self, addr: Addr, word: u16) -> Result<(), ImageError> {
        let ix = addr.index();
        if ix >= Self::SIZE {
            return Err(ImageError::OutOfRange(ix as u32));
        }
        self.words[ix] = word;
        self.present[ix] = true;
        if addr.is_code() && addr.0 >= self.codesize {
            self.codesize = addr.0 + 1;
        }
        Ok(())
    }

    fn set_byte(&mut self, byte_addr: u32, byte: u8) -> Result<(), ImageError> {
        let word_addr = byte_addr >> 1;
        let addr = u16::try_from(word_addr).map_err(|_| ImageError::OutOfRange(word_addr))?;
        let [lo, hi] = self.get(Addr(addr)).unwrap_or(0).to_le_bytes();
        let word = if byte_addr & 1 == 0 {
            u16::from_le_bytes([byte, hi])
        } else {
            u16::from_le_bytes([lo, byte])
        };
        self.set(Addr(addr), word)
    }

    pub fn get(&self, addr: Addr) -> Option<u16> {
        self.is_present(addr).then(|| self.words[addr.index()])
    }

    pub fn is_present(&self, addr: Addr) -> bool {
        self.present.get(addr.index()).copied().unwrap_or(false)
    }

    /// Highest present code address + 1.
    pub const fn codesize(&self) -> u16 {
        self.codesize
    }

    /// Every present address, code and data, in increasing order.
    pub fn present_addrs(&self) -> impl Iterator<Item = Addr> + '_ {
        self.present
            .iter()
            .enumerate()
            .filter(|(_, p)| **p)
            .map(|(ix, _)| Addr(ix as u16))
    }
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

struct Record {
    ty: u8,
    offset: u16,
    data: Vec<u8>,
}

fn hex_byte(input: &str) -> IResult<&str, u8> {
    map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()), |hex| {
        u8::from_str_radix(hex, 16)
    })(input)
}

/// `:` followed by as many hex byte pairs as there are.
fn record_bytes(input: &str) -> IResult<&str, Vec<u8>> {
    preceded(char(':'), many0(hex_byte))(input)
}

fn parse_record(line: &str) -> Result<Record, RecordError> {
    let (rest, bytes) = record_bytes(line).map_err(|_| RecordError::MissingColon)?;
    if !rest.is_empty() {
        // a lone trailing digit means an odd number of digits
        let odd = rest.len() == 1 && rest.chars().all(|c| c.is_ascii_hexdigit());
        return Err(if odd { RecordError::LengthMismatch } else { RecordError::BadHex });
    }
    let [len, hi, lo, ty, rest @ ..] = bytes.as_slice() else {
        return Err(RecordError::Truncated);
    };
    let [data @ .., found] = rest else {
        return Err(RecordError::Truncated);
    };
    if data.len() != usize::from(*len) {
        return Err(RecordError::LengthMismatch);
    }
    let expected = [*len, *hi, *lo, *ty]
        .iter()
        .chain(data)
        .fold(0u8, |sum, b| sum.wrapping_add(*b))
        .wrapping_neg();
    if expected != *found {
        return Err(RecordError::Checksum {
            expected,
            found: *found,
        });
    }
    Ok(Record {
        ty: *ty,
        offset: u16::from_be_bytes([*hi, *lo]),
        data: data.to_vec(),
    })
}
