//! The matcher DSL driven over parsed IR, the way a peephole pass would use
//! it.

use sable_ir::analysis::AnalysisManager;
use sable_ir::inst::ICmpOrder;
use sable_ir::matching as m;
use sable_ir::matching::Matcher;
use sable_ir::parse::parse;
use sable_ir::value::ValueId;
use std::cell::Cell;

const SOURCE: &str = "\
decl i32 @callee(i32 $0)

func i32 @f(i32 $0, ptr $1) {
%entry:
    $2 = iadd i32 $0, 1
    $3 = imul i32 $2, $2
    $4 = icmp slt i32 $3, 100
    $5 = sel i32, bool $4, if $3, else $0
    $6 = load i32, ptr $1
    $7 = sext i64, i32 $6
    $8 = trunc i32, i64 $7
    $9 = call i32 @callee(i32 $8)
    store i32 $9, ptr $1
    ret i32 $5
}
";

fn nth_inst(module: &sable_ir::module::Module, n: usize) -> ValueId {
    let f = module.find_func("f").expect("f should exist");
    let entry = module.func(f).entry().expect("f should have a body");
    module.block(entry).insts()[n]
}

#[test]
fn patterns_match_parsed_ir() {
    let module = parse(SOURCE).expect("should parse");
    let mut am = AnalysisManager::new(&module);

    let add = nth_inst(&module, 0);
    let mul = nth_inst(&module, 1);
    let cmp = nth_inst(&module, 2);
    let select = nth_inst(&module, 3);
    let loaded = nth_inst(&module, 4);
    let widened = nth_inst(&module, 5);
    let narrowed = nth_inst(&module, 6);
    let called = nth_inst(&module, 7);
    let stored = nth_inst(&module, 8);
    let returned = nth_inst(&module, 9);

    // squaring a value: the canonical "both operands are the same shape"
    assert!(m::matches(
        mul,
        &mut am,
        m::imul(m::iadd(m::argument(), m::const_int()), m::any())
    ));

    assert!(m::matches(
        cmp,
        &mut am,
        m::icmp_with(ICmpOrder::Slt, m::binary_inst(), m::const_int())
    ));

    assert!(m::matches(select, &mut am, m::both(m::sel(), m::of_int_ty())));
    assert!(m::matches(loaded, &mut am, m::load()));
    assert!(m::matches(widened, &mut am, m::sext(m::load())));
    assert!(m::matches(narrowed, &mut am, m::trunc(m::sext(m::any()))));
    assert!(m::matches(called, &mut am, m::call()));
    assert!(m::matches(stored, &mut am, m::store()));
    assert!(m::matches(returned, &mut am, m::terminator_inst()));

    assert!(!m::matches(add, &mut am, m::conversion_inst()));
    assert!(!m::matches(widened, &mut am, m::zext(m::any())));
}

#[test]
fn combinators_compose() {
    let module = parse(SOURCE).expect("should parse");
    let mut am = AnalysisManager::new(&module);

    let add = nth_inst(&module, 0);
    let loaded = nth_inst(&module, 4);

    assert!(m::matches(
        add,
        &mut am,
        m::all((m::binary_inst(), m::of_int_ty(), m::iadd(m::any(), m::any())))
    ));

    assert!(m::matches(
        loaded,
        &mut am,
        m::one_of((m::store(), m::load(), m::call()))
    ));

    assert!(!m::matches(
        loaded,
        &mut am,
        m::one_of((m::store(), m::call()))
    ));
}

#[test]
fn a_peephole_shaped_rewrite_finds_its_pieces() {
    // the sort of pattern a "x * x where x = a + c" peephole would start
    // from: grab the shared operand and its type through captures
    let module = parse(SOURCE).expect("should parse");
    let mut am = AnalysisManager::new(&module);

    let mul = nth_inst(&module, 1);

    let lhs = Cell::new(None);
    let rhs = Cell::new(None);
    let ty = Cell::new(None);

    let pattern = m::capture_ty(
        &ty,
        m::imul(m::capture(&lhs, m::any()), m::capture(&rhs, m::any())),
    );
    assert!(pattern.matches(&mut am, mul));

    assert_eq!(lhs.get(), rhs.get(), "squaring uses one value twice");
    assert_eq!(ty.get(), Some(module.i32_ty()));

    let shared = lhs.get().expect("operand should be captured");
    assert!(m::matches(
        shared,
        &mut am,
        m::iadd(m::argument(), m::const_int())
    ));
}
