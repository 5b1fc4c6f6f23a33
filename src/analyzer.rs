use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque, hash_map::Entry};

use itertools::Itertools;
use tracing::{debug, info, trace, warn};

use crate::{
    Error, Result,
    addr::Addr,
    disasm::Disassembler,
    graph::{CallGraph, EdgeKind},
    instruction::{Instruction, Mnemonic},
    state::{ProcessorState, apply_flag_effect},
};

#[cfg(test)]
mod tests;

pub const RESET_ORIGIN: &str = "RESET";
pub const INTERRUPT_ORIGIN: &str = "INTERRUPT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Deeper call nesting than this aborts the analysis.
    pub max_depth: u32,
    /// Keep one graph edge per (from, to) pair.
    pub single_trace: bool,
    /// Emit graph edges for `call`.
    pub subroutine_edges: bool,
    pub reset_vector: Addr,
    pub interrupt_vector: Option<Addr>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            single_trace: false,
            subroutine_edges: true,
            reset_vector: Addr::RESET,
            interrupt_vector: Some(Addr::INTERRUPT),
        }
    }
}

/// An active call: entry address of the routine and its label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub addr: Addr,
    pub label: String,
}

/// The calls that are active, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn push(&mut self, addr: Addr, label: impl Into<String>) {
        self.frames.push(Frame {
            addr,
            label: label.into(),
        });
    }

    /// Whether the routine entered at `addr` is active.
    pub fn contains(&self, addr: Addr) -> bool {
        self.frames.iter().any(|frame| frame.addr == addr)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Every routine active here is also active in `other`.
    pub fn is_subset(&self, other: &CallStack) -> bool {
        self.frames.iter().all(|frame| other.contains(frame.addr))
    }

    fn entries(&self) -> BTreeSet<Addr> {
        self.frames.iter().map(|frame| frame.addr).collect()
    }
}

impl core::fmt::Display for CallStack {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if self.frames.is_empty() {
            return f.write_str("-");
        }
        write!(f, "{}", self.frames.iter().map(|frame| &frame.label).join(" > "))
    }
}

/// Control may reach `pc` with `depth` nested calls made via `call_stack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avenue {
    pub pc: Addr,
    pub depth: u32,
    pub call_stack: CallStack,
    /// Label the walk is attributed to in the call graph.
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthRecord {
    pub depth: u32,
    pub call_stack: CallStack,
}

/// Addresses covered by one explored avenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Addr,
    pub end: Addr,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    UnknownOpcode(u16),
    /// Branch target had no label yet; the page state is probably off.
    UnlabeledTarget(Addr),
    RanIntoHole,
    RanIntoData,
    RecursiveCall(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub addr: Addr,
    pub kind: WarningKind,
}

impl core::fmt::Display for Warning {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let addr = self.addr;
        match &self.kind {
            WarningKind::UnknownOpcode(word) => {
                write!(f, "{addr}: unknown opcode 0x{word:04X} on a code path")
            }
            WarningKind::UnlabeledTarget(target) => write!(
                f,
                "{addr}: branch target {target} was never labeled, page tracking may be off"
            ),
            WarningKind::RanIntoHole => write!(f, "{addr}: code path runs into unloaded memory"),
            WarningKind::RanIntoData => write!(f, "{addr}: code path runs into a data word"),
            WarningKind::RecursiveCall(label) => write!(f, "{addr}: recursive call to {label}"),
        }
    }
}

/// Start address plus the set of active routines. Recursion cuts depend on
/// the set, so two avenues with equal keys reach the same code at the same
/// depth.
type AvenueKey = (Addr, BTreeSet<Addr>);

impl Avenue {
    fn key(&self) -> AvenueKey {
        (self.pc, self.call_stack.entries())
    }
}

/// Pending avenues, at most one per key.
#[derive(Debug, Default)]
struct Worklist {
    queue: VecDeque<AvenueKey>,
    pending: HashMap<AvenueKey, Avenue>,
    explored: HashSet<AvenueKey>,
}

impl Worklist {
    /// Queues `avenue` unless it was already explored, is already pending or
    /// is covered by `depths`.
    fn push(&mut self, avenue: Avenue, depths: &BTreeMap<Addr, DepthRecord>) -> bool {
        let key = avenue.key();
        if self.explored.contains(&key) || is_covered(depths, &avenue) {
            trace!(pc = %avenue.pc, depth = avenue.depth, "avenue already covered");
            return false;
        }
        match self.pending.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                self.queue.push_back(entry.key().clone());
                entry.insert(avenue);
                true
            }
        }
    }

    fn pop(&mut self) -> Option<Avenue> {
        let key = self.queue.pop_front()?;
        let avenue = self.pending.remove(&key)?;
        self.explored.insert(key);
        Some(avenue)
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A walk already passed the avenue's start at least as deep, with no call
/// active that the avenue lacks.
fn is_covered(depths: &BTreeMap<Addr, DepthRecord>, avenue: &Avenue) -> bool {
    depths.get(&avenue.pc).is_some_and(|record| {
        record.depth >= avenue.depth && record.call_stack.is_subset(&avenue.call_stack)
    })
}

/// Result of a finished call-depth analysis.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub depths: BTreeMap<Addr, DepthRecord>,
    pub spans: Vec<Span>,
    pub warnings: Vec<Warning>,
    pub graph: CallGraph,
}

impl Analysis {
    pub fn depth_at(&self, addr: Addr) -> Option<u32> {
        self.depths.get(&addr).map(|record| record.depth)
    }

    /// Deepest address; the lowest one wins a tie.
    pub fn max_depth(&self) -> Option<(Addr, &DepthRecord)> {
        self.depths
            .iter()
            .rev()
            .max_by_key(|(_, record)| record.depth)
            .map(|(addr, record)| (*addr, record))
    }
}

pub struct Analyzer {
    cfg: AnalyzerConfig,
    depths: BTreeMap<Addr, DepthRecord>,
    worklist: Worklist,
    spans: Vec<Span>,
    warnings: Vec<Warning>,
    graph: CallGraph,
}

impl Analyzer {
    pub fn new(cfg: AnalyzerConfig) -> Self {
        let graph = CallGraph::new(cfg.single_trace);
        Self {
            cfg,
            depths: BTreeMap::new(),
            worklist: Worklist::default(),
            spans: vec![],
            warnings: vec![],
            graph,
        }
    }

    pub fn add_seed(&mut self, pc: Addr, call_stack: CallStack, origin: &str) {
        self.graph.add_node(origin);
        let avenue = Avenue {
            pc,
            depth: call_stack.len() as u32,
            call_stack,
            origin: origin.to_owned(),
        };
        self.worklist.push(avenue, &self.depths);
    }

    /// Reset at depth 0 and the interrupt vector at depth 1.
    pub fn add_vectors(&mut self, disasm: &Disassembler) {
        let reset = self.cfg.reset_vector;
        if disasm.image.is_present(reset) {
            self.add_seed(reset, CallStack::default(), RESET_ORIGIN);
        } else {
            warn!(%reset, "reset vector not loaded");
        }
        if let Some(interrupt) = self.cfg.interrupt_vector {
            if disasm.image.is_present(interrupt) {
                let mut call_stack = CallStack::default();
                call_stack.push(interrupt, INTERRUPT_ORIGIN);
                self.add_seed(interrupt, call_stack, INTERRUPT_ORIGIN);
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.worklist.is_empty()
    }

    pub fn analyze(mut self, disasm: &mut Disassembler) -> Result<Analysis> {
        self.add_vectors(disasm);
        while !self.is_done() {
            self.analyze_step(disasm)?;
        }
        let analysis = self.finish();
        if let Some((addr, record)) = analysis.max_depth() {
            info!(%addr, depth = record.depth, stack = %record.call_stack, "maximum call depth");
        }
        Ok(analysis)
    }

    pub fn analyze_step(&mut self, disasm: &mut Disassembler) -> Result<()> {
        let Some(avenue) = self.worklist.pop() else {
            return Ok(());
        };
        // the start may have been reached by a deeper walk since it was queued
        if is_covered(&self.depths, &avenue) {
            trace!(pc = %avenue.pc, depth = avenue.depth, "dropping avenue");
            return Ok(());
        }
        self.walk(disasm, avenue)
    }

    pub fn finish(self) -> Analysis {
        debug!(
            addresses = self.depths.len(),
            avenues = self.spans.len(),
            warnings = self.warnings.len(),
            "call depth analysis done"
        );
        Analysis {
            depths: self.depths,
            spans: self.spans,
            warnings: self.warnings,
            graph: self.graph,
        }
    }

    fn warn(&mut self, addr: Addr, kind: WarningKind) {
        let warning = Warning { addr, kind };
        warn!("{warning}");
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    fn record(&mut self, pc: Addr, depth: u32, call_stack: &CallStack) {
        if self.depths.get(&pc).is_some_and(|record| record.depth >= depth) {
            return;
        }
        self.depths.insert(
            pc,
            DepthRecord {
                depth,
                call_stack: call_stack.clone(),
            },
        );
    }

    fn enqueue(&mut self, avenue: Avenue) {
        self.worklist.push(avenue, &self.depths);
    }

    /// Absolute `call`/`goto` target and its label.
    fn branch_target(
        &mut self,
        disasm: &mut Disassembler,
        pc: Addr,
        instr: &Instruction,
        state: &ProcessorState,
    ) -> (Addr, String) {
        let target = state.target(instr.literal11());
        if !disasm.symbols.labels().contains(target) {
            self.warn(pc, WarningKind::UnlabeledTarget(target));
        }
        (target, disasm.label_for(target).to_owned())
    }

    /// Follows one avenue until it returns, jumps away or leaves the code.
    fn walk(&mut self, disasm: &mut Disassembler, avenue: Avenue) -> Result<()> {
        let Avenue {
            pc: start,
            depth,
            call_stack,
            origin,
        } = avenue;
        trace!(%start, depth, %origin, "exploring avenue");
        let mut state = ProcessorState::at(start);
        let mut pc = start;
        let mut in_table = false;
        let mut last = None;

        loop {
            if pc.0 >= disasm.image.codesize() {
                trace!(%pc, "ran off the end of code");
                break;
            }
            if disasm.is_data_word(pc) {
                self.warn(pc, WarningKind::RanIntoData);
                break;
            }
            let Some(word) = disasm.image.get(pc) else {
                self.warn(pc, WarningKind::RanIntoHole);
                break;
            };
            let Some(instr) = Instruction::decode(word) else {
                self.warn(pc, WarningKind::UnknownOpcode(word));
                break;
            };
            let mnemonic = instr.mnemonic();
            if in_table && !matches!(mnemonic, Mnemonic::Goto | Mnemonic::Retlw | Mnemonic::Nop) {
                trace!(%pc, "end of lookup table");
                break;
            }

            self.record(pc, depth, &call_stack);
            last = Some(pc);

            match mnemonic {
                Mnemonic::Return | Mnemonic::Retfie => break,
                Mnemonic::Retlw if !in_table => break,
                Mnemonic::Goto => {
                    let (target, label) = self.branch_target(disasm, pc, &instr, &state);
                    self.graph.add_edge(&origin, &label, EdgeKind::Goto);
                    self.enqueue(Avenue {
                        pc: target,
                        depth,
                        call_stack: call_stack.clone(),
                        origin: label,
                    });
                    if !in_table {
                        break;
                    }
                }
                Mnemonic::Call => {
                    let (target, label) = self.branch_target(disasm, pc, &instr, &state);
                    if self.cfg.subroutine_edges {
                        self.graph.add_edge(&origin, &label, EdgeKind::Call);
                    }
                    if call_stack.contains(target) {
                        self.warn(pc, WarningKind::RecursiveCall(label));
                    } else {
                        let mut inner = call_stack.clone();
                        inner.push(target, label.clone());
                        if depth + 1 > self.cfg.max_depth {
                            return Err(Error::DepthLimit {
                                addr: pc,
                                limit: self.cfg.max_depth,
                                stack: inner.to_string(),
                            });
                        }
                        self.enqueue(Avenue {
                            pc: target,
                            depth: depth + 1,
                            call_stack: inner,
                            origin: label,
                        });
                    }
                }
                Mnemonic::Bsf | Mnemonic::Bcf => {
                    apply_flag_effect(&disasm.symbols, pc, &instr, &mut state);
                }
                m if m.is_skip() => {
                    self.enqueue(Avenue {
                        pc: pc.add(2),
                        depth,
                        call_stack: call_stack.clone(),
                        origin: origin.clone(),
                    });
                }
                _ => (),
            }

            if instr.is_table_dispatch() {
                trace!(%pc, "lookup table dispatch");
                in_table = true;
            }
            pc = pc.add(1);
        }

        if let Some(end) = last {
            self.spans.push(Span { start, end, depth });
        }
        Ok(())
    }
}
