//! CFG-edges analysis over the sample control-flow shapes, plus the
//! use-count and operand-replacement scenarios that passes lean on.

use sable_ir::analysis::AnalysisManager;
use sable_ir::cfg::{cfg_edges, CfgAnalysis};
use sable_ir::module::{BlockId, FuncId, Module};
use sable_ir::parse::parse;

const SAMPLE_IF_ELSE: &str = "\
func i32 @f(i32 $0) {
%entry:
    $1 = icmp eq i32 $0, 0
    cbr bool $1, if %if.true, else %if.false
%if.true:
    br %merge
%if.false:
    br %merge
%merge:
    ret i32 $0
}
";

const SAMPLE_LOOP: &str = "\
func i32 @f(i32 $0) {
%entry:
    br %loop.header
%loop.header:
    $1 = phi i32 [ $0, %entry ],
                 [ $3, %loop.latch ]
    $2 = icmp eq i32 $0, $1
    cbr bool $2, if %exit, else %loop.body
%loop.body:
    br %loop.latch
%loop.latch:
    $3 = iadd i32 $1, 1
    br %loop.header
%exit:
    ret i32 $1
}
";

const SAMPLE_INFINITE: &str = "\
func i32 @f(i32 $0) {
%entry:
    br %a
%a:
    br %b
%b:
    br %a
%exit:
    unreachable
}
";

fn func(module: &Module, name: &str) -> FuncId {
    module.find_func(name).expect("function should exist")
}

fn block(module: &Module, func: FuncId, name: &str) -> BlockId {
    module
        .func(func)
        .blocks()
        .iter()
        .copied()
        .find(|&b| module.block_name(b) == Some(name))
        .unwrap_or_else(|| panic!("no block named %{name}"))
}

fn same_set(actual: &[BlockId], expected: &[BlockId]) -> bool {
    actual.len() == expected.len() && expected.iter().all(|b| actual.contains(b))
}

#[test]
fn if_else_edges() {
    let module = parse(SAMPLE_IF_ELSE).expect("should parse");
    let f = func(&module, "f");

    let entry = block(&module, f, "entry");
    let if_true = block(&module, f, "if.true");
    let if_false = block(&module, f, "if.false");
    let merge = block(&module, f, "merge");

    let edges = cfg_edges(&module, f);

    assert!(same_set(edges.direct_successors(entry), &[if_true, if_false]));
    assert!(same_set(edges.indirect_successors(entry), &[merge]));
    assert!(edges.all_predecessors(entry).is_empty());

    for arm in [if_true, if_false] {
        assert!(same_set(edges.direct_successors(arm), &[merge]));
        assert!(edges.indirect_successors(arm).is_empty());
        assert!(same_set(edges.direct_predecessors(arm), &[entry]));
        assert!(edges.indirect_predecessors(arm).is_empty());
    }

    assert!(same_set(edges.direct_predecessors(merge), &[if_true, if_false]));
    assert!(same_set(edges.indirect_predecessors(merge), &[entry]));
    assert!(edges.all_successors(merge).is_empty());

    assert!(edges.successors(entry).has_direct_edge(if_true));
    assert!(!edges.successors(entry).has_direct_edge(merge));
    assert!(edges.successors(entry).has_indirect_edge(merge));
    assert!(edges.successors(entry).has_edge(merge));
}

#[test]
fn loop_edges() {
    let module = parse(SAMPLE_LOOP).expect("should parse");
    let f = func(&module, "f");

    let entry = block(&module, f, "entry");
    let header = block(&module, f, "loop.header");
    let body = block(&module, f, "loop.body");
    let latch = block(&module, f, "loop.latch");
    let exit = block(&module, f, "exit");

    let edges = cfg_edges(&module, f);

    assert!(same_set(edges.direct_successors(header), &[exit, body]));
    assert!(same_set(edges.direct_successors(latch), &[header]));

    // the backedge makes the whole loop transitively reach itself
    assert!(edges.successors(header).has_indirect_edge(header));
    assert!(edges.successors(body).has_indirect_edge(header));

    assert!(same_set(
        edges.indirect_successors(entry),
        &[header, body, latch, exit]
    ));

    assert!(same_set(edges.direct_predecessors(exit), &[header]));
    assert!(same_set(edges.indirect_predecessors(exit), &[entry]));

    assert!(same_set(edges.direct_predecessors(header), &[entry, latch]));
}

#[test]
fn unreachable_blocks_have_no_edges() {
    let module = parse(SAMPLE_INFINITE).expect("should parse");
    let f = func(&module, "f");

    let entry = block(&module, f, "entry");
    let a = block(&module, f, "a");
    let b = block(&module, f, "b");
    let exit = block(&module, f, "exit");

    let edges = cfg_edges(&module, f);

    assert!(edges.all_successors(exit).is_empty());
    assert!(edges.all_predecessors(exit).is_empty());

    assert!(edges.successors(a).has_indirect_edge(a));
    assert!(same_set(edges.direct_successors(b), &[a]));

    // `a` is both a direct and an indirect successor of the entry
    assert!(edges.successors(entry).has_direct_edge(a));
    assert!(edges.successors(entry).has_indirect_edge(a));
    assert_eq!(
        edges
            .all_successors(entry)
            .iter()
            .filter(|&&bb| bb == a)
            .count(),
        2
    );
}

#[test]
fn edge_runs_are_sorted_and_partitioned() {
    let module = parse(SAMPLE_LOOP).expect("should parse");
    let f = func(&module, "f");
    let edges = cfg_edges(&module, f);

    for &bb in module.func(f).blocks() {
        for run in [
            edges.successors(bb).direct_edges(),
            edges.successors(bb).indirect_edges(),
            edges.predecessors(bb).direct_edges(),
            edges.predecessors(bb).indirect_edges(),
        ] {
            assert!(run.windows(2).all(|w| w[0].index() < w[1].index()));
        }

        let all = edges.successors(bb).all_edges();
        let direct = edges.successors(bb).direct_edges();
        let indirect = edges.successors(bb).indirect_edges();
        assert_eq!(all.len(), direct.len() + indirect.len());
        assert_eq!(&all[..direct.len()], direct);
        assert_eq!(&all[direct.len()..], indirect);
    }
}

#[test]
fn the_analysis_caches_and_recomputes() {
    let module = parse(SAMPLE_IF_ELSE).expect("should parse");
    let f = func(&module, "f");
    let merge = block(&module, f, "merge");

    let mut manager = AnalysisManager::new(&module);

    let analysis = manager.get::<CfgAnalysis>();
    assert!(analysis.edges(f).successors(merge).all_edges().is_empty());

    // a second get hands back the cached analysis
    let again = manager.get::<CfgAnalysis>();
    assert_eq!(again.edges(f).direct_predecessors(merge).len(), 2);

    manager.invalidate::<CfgAnalysis>();
    let recomputed = manager.get::<CfgAnalysis>();
    assert_eq!(recomputed.edges(f).direct_predecessors(merge).len(), 2);
}

#[test]
fn use_counts_and_replacement() {
    let source = "\
func i32 @f(i32 $0) {
%entry:
    $1 = iadd i32 $0, $0
    $2 = iadd i32 $0, $1
    ret i32 $2
}
";
    let mut module = parse(source).expect("should parse");
    let f = func(&module, "f");

    let arg = module.func(f).args()[0];
    let entry = module.func(f).entry().expect("should have an entry");
    let insts: Vec<_> = module.block(entry).insts().to_vec();
    let (add1, add2) = (insts[0], insts[1]);

    assert_eq!(module.use_count(arg), 3);

    let counts = module.use_count_of_every_instruction();
    assert_eq!(counts.get(&add1), Some(&1));
    assert_eq!(counts.get(&add2), Some(&1));

    module.inst_mut(add2).replace_operand_with(arg, add1);

    assert_eq!(module.use_count(arg), 2);
    assert_eq!(module.use_count(add1), 2);
    assert_eq!(module.inst(add2).use_count(add1), 2);
}
