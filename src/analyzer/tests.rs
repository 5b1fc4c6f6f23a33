use assert_matches::assert_matches;

use super::*;
use crate::{image::MemoryImage, symbols::DataRange, symbols::Symbols};

fn no_interrupt() -> AnalyzerConfig {
    AnalyzerConfig {
        interrupt_vector: None,
        ..Default::default()
    }
}

fn disasm(words: &[u16]) -> Disassembler {
    let image = MemoryImage::from_words(Addr::RESET, words).unwrap();
    Disassembler::new(image, Symbols::new())
}

fn run(d: &mut Disassembler, cfg: AnalyzerConfig) -> Analysis {
    d.scan();
    Analyzer::new(cfg).analyze(d).unwrap()
}

fn spans(analysis: &Analysis) -> Vec<(u16, u16, u32)> {
    analysis
        .spans
        .iter()
        .map(|span| (span.start.0, span.end.0, span.depth))
        .collect()
}

fn edges(analysis: &Analysis) -> Vec<(&str, &str, EdgeKind)> {
    analysis
        .graph
        .edges()
        .iter()
        .map(|edge| (edge.from.as_str(), edge.to.as_str(), edge.kind))
        .collect()
}

#[test]
fn test_lookup_table_example() {
    // movlw 5 ; addwf PCL, F ; retlw 1 ; retlw 2 ; retlw 3
    let mut d = disasm(&[0x3005, 0x0782, 0x3401, 0x3402, 0x3403]);
    let analysis = run(&mut d, AnalyzerConfig::default());

    assert_eq!(spans(&analysis), [(0, 4, 0), (4, 4, 1)]);
    for ix in 0..4 {
        assert_eq!(analysis.depth_at(Addr(ix)), Some(0));
    }
    // the interrupt vector sits in the table
    assert_eq!(analysis.depth_at(Addr(4)), Some(1));
    let (addr, record) = analysis.max_depth().unwrap();
    assert_eq!(addr, Addr(4));
    assert_eq!(record.call_stack.to_string(), "INTERRUPT");
    assert!(analysis.warnings.is_empty());
}

#[test]
fn test_lookup_table_ends_at_first_other_instruction() {
    // addwf PCL, F ; retlw 1 ; retlw 2 ; retlw 3 ; movlw 5 ; return
    let mut d = disasm(&[0x0782, 0x3401, 0x3402, 0x3403, 0x3005, 0x0008]);
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(spans(&analysis), [(0, 3, 0)]);
    assert_eq!(analysis.depth_at(Addr(3)), Some(0));
    assert_eq!(analysis.depth_at(Addr(4)), None);
    assert_eq!(analysis.depth_at(Addr(5)), None);
}

#[test]
fn test_goto_inside_table_does_not_end_walk() {
    // addwf PCL, F ; goto 5 ; nop ; retlw 0 ; return ; return
    let mut d = disasm(&[0x0782, 0x2805, 0x0000, 0x3400, 0x0008, 0x0008]);
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(spans(&analysis), [(0, 3, 0), (5, 5, 0)]);
    assert_eq!(edges(&analysis), [("RESET", "L0005", EdgeKind::Goto)]);
}

#[test]
fn test_call_cycle_terminates() {
    // 0: call A ; goto $
    // A: call B ; return
    // B: call A ; return
    let mut d = disasm(&[0x2004, 0x2801, 0x0000, 0x0000, 0x2006, 0x0008, 0x2004, 0x0008]);
    d.symbols.labels_mut().insert_user(Addr(4), "A");
    d.symbols.labels_mut().insert_user(Addr(6), "B");
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(analysis.depth_at(Addr(4)), Some(1));
    assert_eq!(analysis.depth_at(Addr(6)), Some(2));
    assert_eq!(analysis.depth_at(Addr(7)), Some(2));
    assert_eq!(
        analysis.warnings,
        [Warning {
            addr: Addr(6),
            kind: WarningKind::RecursiveCall("A".into())
        }]
    );
    let (addr, record) = analysis.max_depth().unwrap();
    assert_eq!(addr, Addr(6));
    assert_eq!(record.call_stack.to_string(), "A > B");
    assert_eq!(
        edges(&analysis),
        [
            ("RESET", "A", EdgeKind::Call),
            ("RESET", "L0001", EdgeKind::Goto),
            ("A", "B", EdgeKind::Call),
            ("B", "A", EdgeKind::Call),
        ]
    );
}

/// `n` subroutines, each calling the next.
fn call_chain(n: u16) -> Vec<u16> {
    let mut words = vec![];
    for k in 0..n {
        words.push(0x2000 | (2 * k + 2));
        words.push(0x0008);
    }
    words.push(0x0008);
    words
}

#[test]
fn test_depth_limit() {
    let mut d = disasm(&call_chain(5));
    d.scan();
    let cfg = AnalyzerConfig {
        max_depth: 3,
        ..no_interrupt()
    };
    assert_matches!(
        Analyzer::new(cfg).analyze(&mut d),
        Err(Error::DepthLimit { addr: Addr(6), limit: 3, .. })
    );

    let analysis = run(&mut d, no_interrupt());
    assert_eq!(analysis.depth_at(Addr(10)), Some(5));
    let (_, record) = analysis.max_depth().unwrap();
    assert_eq!(record.call_stack.to_string(), "L0002 > L0004 > L0006 > L0008 > L000A");
}

#[test]
fn test_skip_enqueues_taken_path() {
    // btfsc STATUS, Z ; goto 5 ; call 6 ; return ; nop ; return ; return
    let mut d = disasm(&[0x1903, 0x2805, 0x2006, 0x0008, 0x0000, 0x0008, 0x0008]);
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(spans(&analysis), [(0, 1, 0), (2, 3, 0), (5, 5, 0), (6, 6, 1)]);
    assert_eq!(analysis.depth_at(Addr(2)), Some(0));
    assert_eq!(analysis.depth_at(Addr(4)), None);
    assert_eq!(analysis.depth_at(Addr(6)), Some(1));
}

#[test]
fn test_deeper_path_wins() {
    // 0: call T ; call S ; goto $
    // S: call T
    // T: return
    let mut d = disasm(&[0x2004, 0x2003, 0x2802, 0x2004, 0x0008]);
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(analysis.depth_at(Addr(3)), Some(1));
    assert_eq!(analysis.depth_at(Addr(4)), Some(2));
    assert_eq!(analysis.depths[&Addr(4)].call_stack.to_string(), "L0003 > L0004");
}

#[test]
fn test_analysis_is_deterministic() {
    let words = [0x1903, 0x2005, 0x2007, 0x2803, 0x0000, 0x2007, 0x0008, 0x0008];
    let mut a = disasm(&words);
    let mut b = disasm(&words);
    let first = run(&mut a, AnalyzerConfig::default());
    let second = run(&mut b, AnalyzerConfig::default());
    assert_eq!(first.depths, second.depths);
    assert_eq!(first.graph.edges(), second.graph.edges());
    assert_eq!(first.warnings, second.warnings);
}

#[test]
fn test_edge_modes() {
    // call 3 ; call 3 ; goto $ ; return
    let words = [0x2003, 0x2003, 0x2802, 0x0008];

    let all = run(&mut disasm(&words), no_interrupt());
    assert_eq!(
        edges(&all),
        [
            ("RESET", "L0003", EdgeKind::Call),
            ("RESET", "L0003", EdgeKind::Call),
            ("RESET", "L0002", EdgeKind::Goto),
        ]
    );

    let single = AnalyzerConfig {
        single_trace: true,
        ..no_interrupt()
    };
    assert_eq!(edges(&run(&mut disasm(&words), single)).len(), 2);

    let no_calls = AnalyzerConfig {
        subroutine_edges: false,
        ..no_interrupt()
    };
    let analysis = run(&mut disasm(&words), no_calls);
    assert_eq!(edges(&analysis), [("RESET", "L0002", EdgeKind::Goto)]);
    // depths do not depend on the edge mode
    assert_eq!(analysis.depth_at(Addr(3)), Some(1));
}

#[test]
fn test_unlabeled_target_is_reported() {
    let mut d = disasm(&[0x2003, 0x2003, 0x0008, 0x0008]);
    let analysis = Analyzer::new(no_interrupt()).analyze(&mut d).unwrap();
    assert_eq!(
        analysis.warnings,
        [Warning {
            addr: Addr(0),
            kind: WarningKind::UnlabeledTarget(Addr(3))
        }]
    );
    assert_eq!(d.symbols.labels().get(Addr(3)), Some("L0003"));
}

#[test]
fn test_page_state_is_per_avenue() {
    // bsf PCLATH, 3 ; call 0x010 ; sleep ; return
    let mut image =
        MemoryImage::from_words(Addr::RESET, &[0x158a, 0x2010, 0x0063, 0x0008]).unwrap();
    // 0x810: call 0x020 ; return
    image.set(Addr(0x810), 0x2020).unwrap();
    image.set(Addr(0x811), 0x0008).unwrap();
    image.set(Addr(0x820), 0x0008).unwrap();
    let mut d = Disassembler::new(image, Symbols::new());
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(analysis.depth_at(Addr(0x810)), Some(1));
    assert_eq!(analysis.depth_at(Addr(0x820)), Some(2));
    assert_eq!(analysis.depth_at(Addr(0x010)), None);
    assert_eq!(analysis.depth_at(Addr(0x004)), None);
    assert!(analysis.warnings.is_empty());
}

#[test]
fn test_skip_avenue_starts_from_entry_state() {
    // bsf PCLATH, 3 ; btfss STATUS, C ; goto 0x005 ; goto 0x006 ; nop ; nop ; return
    let mut image =
        MemoryImage::from_words(Addr::RESET, &[0x158a, 0x1c03, 0x2805, 0x2806, 0x0000, 0x0000, 0x0008])
            .unwrap();
    image.set(Addr(0x805), 0x0008).unwrap();
    let mut d = Disassembler::new(image, Symbols::new());
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(spans(&analysis), [(0, 2, 0), (3, 3, 0), (0x805, 0x805, 0), (6, 6, 0)]);
    assert_eq!(analysis.depth_at(Addr(0x806)), None);
    // the linear scan resolved the second goto into page 1
    assert_eq!(
        analysis.warnings,
        [Warning {
            addr: Addr(3),
            kind: WarningKind::UnlabeledTarget(Addr(6))
        }]
    );
}

#[test]
fn test_walk_stops_on_data_and_holes() {
    let mut image = MemoryImage::from_words(Addr::RESET, &[0x0000, 0x0000, 0x0008]).unwrap();
    image.set(Addr::INTERRUPT, 0x0000).unwrap();
    image.set(Addr(8), 0x0008).unwrap();
    let mut d = Disassembler::new(image, Symbols::new());
    d.symbols.add_data_range(DataRange::inclusive(Addr(1), Addr(1), "table"));
    let analysis = run(&mut d, AnalyzerConfig::default());

    assert_eq!(spans(&analysis), [(0, 0, 0), (4, 4, 1)]);
    assert_eq!(
        analysis.warnings,
        [
            Warning {
                addr: Addr(1),
                kind: WarningKind::RanIntoData
            },
            Warning {
                addr: Addr(5),
                kind: WarningKind::RanIntoHole
            },
        ]
    );
}

#[test]
fn test_unknown_opcode_stops_walk() {
    let mut d = disasm(&[0x0000, 0x3b00, 0x0008]);
    let analysis = run(&mut d, no_interrupt());
    assert_eq!(spans(&analysis), [(0, 0, 0)]);
    assert_eq!(
        analysis.warnings,
        [Warning {
            addr: Addr(1),
            kind: WarningKind::UnknownOpcode(0x3b00)
        }]
    );
}

/// Image built from `(address, words)` runs.
fn sparse(runs: &[(u16, &[u16])]) -> Disassembler {
    let mut image = MemoryImage::new();
    for (base, words) in runs {
        for (ix, word) in words.iter().enumerate() {
            image.set(Addr(base + ix as u16), *word).unwrap();
        }
    }
    Disassembler::new(image, Symbols::new())
}

#[test]
fn test_shared_code_reached_with_different_stacks() {
    // 0:    call L ; call N ; goto $
    // L:    call M ; return
    // M:    goto X
    // N:    goto X
    // X:    call L ; return
    let mut d = sparse(&[
        (0x00, &[0x2010, 0x2020, 0x2802]),
        (0x10, &[0x2018, 0x0008]),
        (0x18, &[0x2830]),
        (0x20, &[0x2830]),
        (0x30, &[0x2010, 0x0008]),
    ]);
    let analysis = run(&mut d, no_interrupt());

    // RESET > N > X > L > M > X
    assert_eq!(analysis.depth_at(Addr(0x10)), Some(2));
    assert_eq!(analysis.depth_at(Addr(0x18)), Some(3));
    assert_eq!(analysis.depth_at(Addr(0x30)), Some(3));
    assert_eq!(analysis.depth_at(Addr(0x20)), Some(1));
    let (addr, record) = analysis.max_depth().unwrap();
    assert_eq!(addr, Addr(0x18));
    assert_eq!(record.call_stack.to_string(), "L0020 > L0010 > L0018");
    assert_eq!(
        analysis.warnings,
        [Warning {
            addr: Addr(0x30),
            kind: WarningKind::RecursiveCall("L0010".into())
        }]
    );
}

#[test]
fn test_shallow_avenue_after_deeper_one_is_explored() {
    // same shape, but N reaches X only after the deeper walk through M
    // 0:    call L ; call N ; goto $
    // L:    call M ; return
    // M:    goto X
    // N:    goto 0x22 ; 0x22: goto 0x24 ; 0x24: goto X
    // X:    call L ; return
    let mut d = sparse(&[
        (0x00, &[0x2010, 0x2020, 0x2802]),
        (0x10, &[0x2018, 0x0008]),
        (0x18, &[0x2830]),
        (0x20, &[0x2822, 0x0000, 0x2824, 0x0000, 0x2830]),
        (0x30, &[0x2010, 0x0008]),
    ]);
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(analysis.depth_at(Addr(0x10)), Some(2));
    assert_eq!(analysis.depth_at(Addr(0x11)), Some(2));
    assert_eq!(analysis.depth_at(Addr(0x30)), Some(3));
    assert_eq!(analysis.depth_at(Addr(0x21)), None);
    assert_eq!(
        analysis.depths[&Addr(0x30)].call_stack.to_string(),
        "L0020 > L0010 > L0018"
    );
}

#[test]
fn test_recursion_is_detected_by_address() {
    // 0: call 4 ; goto $
    // 4: call 6 ; return
    // 6: return
    let mut d = disasm(&[0x2004, 0x2801, 0x0000, 0x0000, 0x2006, 0x0008, 0x0008]);
    d.symbols.labels_mut().insert_user(Addr(4), "wait");
    d.symbols.labels_mut().insert_user(Addr(6), "wait");
    let analysis = run(&mut d, no_interrupt());

    assert_eq!(analysis.depth_at(Addr(6)), Some(2));
    assert!(analysis.warnings.is_empty());
    assert_eq!(analysis.depths[&Addr(6)].call_stack.to_string(), "wait > wait");
}

fn stack(frames: &[u16]) -> CallStack {
    let mut stack = CallStack::default();
    for addr in frames {
        stack.push(Addr(*addr), Addr(*addr).synthetic_label());
    }
    stack
}

#[test]
fn test_worklist_memo_and_dedup() {
    let avenue = |pc, frames: &[u16]| Avenue {
        pc: Addr(pc),
        depth: frames.len() as u32,
        call_stack: stack(frames),
        origin: "RESET".into(),
    };
    let mut depths = BTreeMap::new();
    let mut worklist = Worklist::default();

    assert!(worklist.push(avenue(5, &[0x10]), &depths));
    assert!(!worklist.push(avenue(5, &[0x10]), &depths));
    // same depth, different routine active
    assert!(worklist.push(avenue(5, &[0x20]), &depths));
    assert_eq!(worklist.pop().map(|a| a.call_stack), Some(stack(&[0x10])));
    assert_eq!(worklist.pop().map(|a| a.call_stack), Some(stack(&[0x20])));
    assert!(worklist.is_empty());
    // explored
    assert!(!worklist.push(avenue(5, &[0x10]), &depths));

    depths.insert(
        Addr(6),
        DepthRecord {
            depth: 2,
            call_stack: stack(&[0x10, 0x20]),
        },
    );
    // call order does not matter
    assert!(!worklist.push(avenue(6, &[0x20, 0x10]), &depths));
    // shallower, but 0x20 is not active so a call to it is not cut
    assert!(worklist.push(avenue(6, &[0x10]), &depths));
    assert!(worklist.push(avenue(6, &[0x10, 0x20, 0x30]), &depths));
    assert_eq!(worklist.pop().map(|a| a.depth), Some(1));
    assert_eq!(worklist.pop().map(|a| a.depth), Some(3));
    assert_eq!(worklist.pop(), None);
}

#[test]
fn test_call_stack_display() {
    let mut stack = CallStack::default();
    assert_eq!(stack.to_string(), "-");
    stack.push(Addr(0x10), "main");
    stack.push(Addr(0x40), "delay");
    assert_eq!(stack.to_string(), "main > delay");
    assert!(stack.contains(Addr(0x40)));
    assert!(!stack.contains(Addr(0x41)));
}
