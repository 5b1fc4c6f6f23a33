use std::io::{self, Write};

use itertools::Itertools;
use tracing::debug;

use crate::{addr::Addr, analyzer::Analysis, disasm::Disassembler, state::ProcessorState};

pub const PROCESSOR: &str = "16F877";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingOptions {
    /// Comment every line with its address and raw word.
    pub show_words: bool,
    /// Comment every line with its call depth, when an analysis is given.
    pub show_depth: bool,
}

/// Writes an assembler-compatible listing of every present word.
///
/// Branch operands are rendered with whatever labels exist, so run
/// [`Disassembler::scan`] first.
pub fn write_listing(
    out: &mut impl Write,
    disasm: &mut Disassembler,
    analysis: Option<&Analysis>,
    opts: &ListingOptions,
) -> io::Result<()> {
    let addrs = disasm.image.present_addrs().collect_vec();

    writeln!(out, "; disassembled by pic-dasm")?;
    writeln!(
        out,
        "; {} words, code size 0x{:04X}",
        addrs.len(),
        disasm.image.codesize()
    )?;
    writeln!(out)?;
    writeln!(out, "\tlist\tp={PROCESSOR}")?;
    writeln!(out, "\tradix\thex")?;
    if let Some(analysis) = analysis {
        if !analysis.warnings.is_empty() {
            writeln!(out)?;
        }
        for warning in &analysis.warnings {
            writeln!(out, "; warning: {warning}")?;
        }
    }

    let mut state = ProcessorState::default();
    let mut prev: Option<Addr> = None;
    for &addr in &addrs {
        let Some(word) = disasm.image.get(addr) else {
            continue;
        };
        if prev.map(|prev| prev.add(1)) != Some(addr) {
            writeln!(out)?;
            writeln!(out, "\torg\t0x{:04X}", addr.0)?;
        }
        prev = Some(addr);

        if let Some(label) = disasm.symbols.labels().get(addr) {
            writeln!(out, "{label}:")?;
        }

        let mut comments = vec![];
        if opts.show_words {
            comments.push(format!("{addr}: {word:04X}"));
        }
        if opts.show_depth {
            if let Some(depth) = analysis.and_then(|analysis| analysis.depth_at(addr)) {
                comments.push(format!("depth {depth}"));
            }
        }

        let text = if disasm.is_data_word(addr) {
            format!("\tdw\t0x{word:04X}")
        } else {
            match disasm.instruction_at(addr) {
                Some(instr) => {
                    let operands = disasm.resolve_operands(&instr, addr, &mut state);
                    if instr.is_table_dispatch() {
                        comments.push("lookup table".to_owned());
                    }
                    if operands.is_empty() {
                        format!("\t{}", instr.mnemonic())
                    } else {
                        format!("\t{}\t{operands}", instr.mnemonic())
                    }
                }
                None => {
                    comments.push("unknown opcode".to_owned());
                    format!("\tdw\t0x{word:04X}")
                }
            }
        };

        if comments.is_empty() {
            writeln!(out, "{text}")?;
        } else {
            writeln!(out, "{text}\t; {}", comments.join(", "))?;
        }
    }

    if let Some(analysis) = analysis {
        writeln!(out)?;
        match analysis.max_depth() {
            Some((addr, record)) => {
                writeln!(out, "; maximum call depth {} at {addr}", record.depth)?;
                writeln!(out, "; via {}", record.call_stack)?;
            }
            None => writeln!(out, "; no reachable code")?,
        }
    }
    writeln!(out, "\tend")?;
    debug!(words = addrs.len(), "listing written");
    Ok(())
}
