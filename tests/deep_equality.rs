//! Deep-equality laws: equivalence is structural, cascades through every
//! container, and is insensitive to arena-id accidents.

use sable_ir::builder::Builder;
use sable_ir::module::{deep_equals, Module};
use sable_ir::parse::parse;

fn both(source: &str) -> (Module, Module) {
    (
        parse(source).expect("should parse"),
        parse(source).expect("should parse"),
    )
}

const BASE: &str = "\
func i32 @f(i32 $0) {
%entry:
    $1 = icmp eq i32 $0, 0
    cbr bool $1, if %then, else %exit
%then:
    br %exit
%exit:
    ret i32 $0
}
";

#[test]
fn identical_sources_are_deep_equal() {
    let (a, b) = both(BASE);
    assert!(deep_equals(&a, &b));
    assert!(deep_equals(&b, &a));
}

#[test]
fn differing_constants_are_not_equal() {
    let a = parse(BASE).unwrap();
    let b = parse(&BASE.replace("i32 $0, 0", "i32 $0, 1")).unwrap();
    assert!(!deep_equals(&a, &b));
}

#[test]
fn differing_comparison_orders_are_not_equal() {
    let a = parse(BASE).unwrap();
    let b = parse(&BASE.replace("icmp eq", "icmp ne")).unwrap();
    assert!(!deep_equals(&a, &b));
}

#[test]
fn differing_function_names_are_not_equal() {
    let a = parse(BASE).unwrap();
    let b = parse(&BASE.replace("@f", "@g")).unwrap();
    assert!(!deep_equals(&a, &b));
}

#[test]
fn swapped_branch_targets_are_not_equal() {
    let a = parse(BASE).unwrap();
    let b = parse(&BASE.replace("if %then, else %exit", "if %exit, else %then")).unwrap();
    assert!(!deep_equals(&a, &b));
}

#[test]
fn the_volatile_bit_participates() {
    let template = "\
func void @f() {
%entry:
    store i32 1, ptr null
    ret void
}
";
    let a = parse(template).unwrap();
    let b = parse(&template.replace("store i32", "store volatile i32")).unwrap();
    assert!(!deep_equals(&a, &b));
}

#[test]
fn extra_functions_break_equality() {
    let a = parse(BASE).unwrap();
    let b = parse(&format!("{BASE}\ndecl void @extra()")).unwrap();
    assert!(!deep_equals(&a, &b));
}

#[test]
fn extra_instructions_break_equality() {
    let a = parse(BASE).unwrap();
    let b = parse(&BASE.replace(
        "    $1 = icmp eq i32 $0, 0\n",
        "    $1 = icmp eq i32 $0, 0\n    $tmp = iadd i32 $0, $0\n",
    ))
    .unwrap();
    assert!(!deep_equals(&a, &b));
}

#[test]
fn block_names_are_presentation_only() {
    let a = parse(BASE).unwrap();
    let renamed = BASE
        .replace("%then", "%somewhere")
        .replace("%exit", "%elsewhere");
    let b = parse(&renamed).unwrap();

    assert!(deep_equals(&a, &b));
}

#[test]
fn builder_modules_equal_their_parsed_form() {
    let mut module = Module::new();
    let i32_ty = module.i32_ty();

    let mut b = Builder::new(&mut module);
    let f = b.create_func("f", i32_ty, &[i32_ty]);
    let arg = b.module().func(f).args()[0];

    let entry = b.create_block_in(f);
    let then = b.create_block_named("then");
    let exit = b.create_block_named("exit");

    b.set_insert_point(entry);
    let zero = b.const_i32(0);
    let cmp = b.icmp_eq(arg, zero).unwrap();
    b.cond_br(cmp, then, exit).unwrap();

    b.set_insert_point(then);
    b.br(exit).unwrap();

    b.set_insert_point(exit);
    b.ret(arg).unwrap();

    let parsed = parse(BASE).unwrap();
    assert!(deep_equals(&module, &parsed));
}

#[test]
fn phi_incoming_order_does_not_matter_across_modules() {
    // the two sources list the incoming pairs in opposite orders; sorted
    // canonical form makes the modules equivalent
    let forward = "\
func i32 @f(i32 $0) {
%entry:
    cbr bool true, if %a, else %b
%a:
    br %m
%b:
    br %m
%m:
    $1 = phi i32 [ 3, %a ], [ 7, %b ]
    ret i32 $1
}
";
    let backward = forward.replace("[ 3, %a ], [ 7, %b ]", "[ 7, %b ], [ 3, %a ]");

    let a = parse(forward).unwrap();
    let b = parse(&backward).unwrap();
    assert!(deep_equals(&a, &b));
}
