//! Composable pattern matching over IR values.
//!
//! Matchers are small predicate values that can be nested to describe a
//! shape of IR, the building block for writing peephole rewrites:
//!
//! ```
//! use sable_ir::builder::Builder;
//! use sable_ir::analysis::AnalysisManager;
//! use sable_ir::matching as m;
//! use sable_ir::module::Module;
//!
//! let mut module = Module::new();
//! let mut b = Builder::new(&mut module);
//! let i32_ty = b.i32_ty();
//! let f = b.create_func("f", i32_ty, &[i32_ty]);
//! let arg = b.module().func(f).args()[0];
//! let entry = b.create_block_in(f);
//! b.set_insert_point(entry);
//!
//! let one = b.const_i32(1);
//! let sum = b.iadd(arg, one).unwrap();
//! b.ret(sum).unwrap();
//!
//! let mut manager = AnalysisManager::new(&module);
//! assert!(m::matches(sum, &mut manager, m::iadd(m::any(), m::const_int())));
//! assert!(!m::matches(sum, &mut manager, m::imul(m::any(), m::any())));
//! ```

use crate::analysis::AnalysisManager;
use crate::inst::{BinaryOp, ConvOp, FCmpOrder, ICmpOrder, Inst};
use crate::module::Module;
use crate::ty::{TyId, Type};
use crate::value::{Constant, ValueData, ValueId};
use std::cell::Cell;

/// A predicate over values.
///
/// Matchers receive the analysis manager so that future, smarter patterns
/// can consult analyses; the structural ones here only read the module.
pub trait Matcher {
    /// Whether `value` fits this pattern.
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool;
}

/// Evaluates `pattern` against `value`.
pub fn matches(
    value: ValueId,
    manager: &mut AnalysisManager<'_>,
    pattern: impl Matcher,
) -> bool {
    pattern.matches(manager, value)
}

/// Matches any value at all.
pub fn any() -> impl Matcher {
    struct Any;

    impl Matcher for Any {
        fn matches(&self, _manager: &mut AnalysisManager<'_>, _value: ValueId) -> bool {
            true
        }
    }

    Any
}

/// A matcher driven by a plain predicate over the module.
#[derive(Copy, Clone, Debug)]
pub struct ClassMatcher {
    pred: fn(&Module, ValueId) -> bool,
}

impl Matcher for ClassMatcher {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        (self.pred)(manager.module(), value)
    }
}

macro_rules! class_matchers {
    ( $( $( #[$meta:meta] )* $name:ident => $pred:expr; )* ) => {
        $(
            $( #[$meta] )*
            pub fn $name() -> ClassMatcher {
                ClassMatcher { pred: $pred }
            }
        )*
    };
}

class_matchers! {
    /// Matches integer constants.
    const_int => |m, v| matches!(m.value(v).as_constant(), Some(Constant::Int(_)));
    /// Matches `true` and `false`.
    const_bool => |m, v| matches!(m.value(v).as_constant(), Some(Constant::Bool(_)));
    /// Matches floating-point constants.
    const_float => |m, v| matches!(m.value(v).as_constant(), Some(Constant::Float(_)));
    /// Matches `null`.
    const_null => |m, v| matches!(m.value(v).as_constant(), Some(Constant::Null));
    /// Matches `undef` of any type.
    const_undef => |m, v| matches!(m.value(v).as_constant(), Some(Constant::Undef));
    /// Matches array constants (but not strings).
    const_array => |m, v| matches!(m.value(v).as_constant(), Some(Constant::Array(_)));
    /// Matches struct constants.
    const_struct => |m, v| matches!(m.value(v).as_constant(), Some(Constant::Struct(_)));
    /// Matches string constants.
    const_string => |m, v| matches!(m.value(v).as_constant(), Some(Constant::String(_)));
    /// Matches any constant.
    constant => |m, v| m.value(v).is_constant();
    /// Matches function arguments.
    argument => |m, v| matches!(m.value(v).data(), ValueData::Argument { .. });
    /// Matches phis.
    phi => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Phi { .. }));
    /// Matches calls.
    call => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Call { .. }));
    /// Matches `sel` instructions.
    sel => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Sel { .. }));
    /// Matches `alloca` instructions.
    alloca => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Alloca { .. }));
    /// Matches loads.
    load => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Load { .. }));
    /// Matches stores.
    store => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Store { .. }));
    /// Matches `offset` instructions.
    offset => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Offset { .. }));
    /// Matches `elemptr` instructions.
    elem_ptr => |m, v| matches!(m.value(v).as_inst(), Some(Inst::ElemPtr { .. }));
    /// Matches `extract` instructions.
    extract => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Extract { .. }));
    /// Matches `insert` instructions.
    insert => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Insert { .. }));
    /// Matches unconditional branches.
    br => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Br { .. }));
    /// Matches conditional branches.
    cond_br => |m, v| matches!(m.value(v).as_inst(), Some(Inst::CondBr { .. }));
    /// Matches returns.
    ret => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Ret { .. }));
    /// Matches `unreachable`.
    unreachable_inst => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Unreachable));
    /// Matches any binary arithmetic or logic instruction.
    binary_inst => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Binary { .. }));
    /// Matches any conversion.
    conversion_inst => |m, v| matches!(m.value(v).as_inst(), Some(Inst::Conv { .. }));
    /// Matches any terminator.
    terminator_inst => |m, v| m.value(v).as_inst().map_or(false, Inst::is_terminator);
}

/// A matcher driven by a predicate over the value's type.
#[derive(Copy, Clone, Debug)]
pub struct TypeClassMatcher {
    pred: fn(&Type) -> bool,
}

impl Matcher for TypeClassMatcher {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        let module = manager.module();
        (self.pred)(module.ty(module.value(value).ty()))
    }
}

macro_rules! type_class_matchers {
    ( $( $( #[$meta:meta] )* $name:ident => $pred:path; )* ) => {
        $(
            $( #[$meta] )*
            pub fn $name() -> TypeClassMatcher {
                TypeClassMatcher { pred: $pred }
            }
        )*
    };
}

type_class_matchers! {
    /// Matches values of integer type.
    of_int_ty => Type::is_int;
    /// Matches values of float type.
    of_float_ty => Type::is_float;
    /// Matches values of `bool` type.
    of_bool_ty => Type::is_bool;
    /// Matches values of `ptr` type.
    of_ptr_ty => Type::is_ptr;
    /// Matches values of `void` type.
    of_void_ty => Type::is_void;
    /// Matches values of array type.
    of_array_ty => Type::is_array;
    /// Matches values of struct type.
    of_struct_ty => Type::is_struct;
}

/// Matches a binary instruction, with sub-patterns for its operands.
#[derive(Debug)]
pub struct BinaryMatcher<L, R> {
    op: Option<BinaryOp>,
    lhs: L,
    rhs: R,
}

impl<L: Matcher, R: Matcher> Matcher for BinaryMatcher<L, R> {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        let module = manager.module();

        let (op, lhs, rhs) = match module.value(value).as_inst() {
            Some(Inst::Binary { op, lhs, rhs }) => (*op, *lhs, *rhs),
            _ => return false,
        };

        if let Some(expected) = self.op {
            if op != expected {
                return false;
            }
        }

        self.lhs.matches(manager, lhs) && self.rhs.matches(manager, rhs)
    }
}

/// Matches any binary instruction whose operands fit the sub-patterns.
pub fn binary<L: Matcher, R: Matcher>(lhs: L, rhs: R) -> BinaryMatcher<L, R> {
    BinaryMatcher { op: None, lhs, rhs }
}

macro_rules! binary_matchers {
    ( $( $( #[$meta:meta] )* $name:ident => $op:ident; )* ) => {
        $(
            $( #[$meta] )*
            pub fn $name<L: Matcher, R: Matcher>(lhs: L, rhs: R) -> BinaryMatcher<L, R> {
                BinaryMatcher { op: Some(BinaryOp::$op), lhs, rhs }
            }
        )*
    };
}

binary_matchers! {
    /// Matches `and`.
    and => And;
    /// Matches `or`.
    or => Or;
    /// Matches `xor`.
    xor => Xor;
    /// Matches `shl`.
    shl => Shl;
    /// Matches `lshr`.
    lshr => LShr;
    /// Matches `ashr`.
    ashr => AShr;
    /// Matches `iadd`.
    iadd => IAdd;
    /// Matches `isub`.
    isub => ISub;
    /// Matches `imul`.
    imul => IMul;
    /// Matches `udiv`.
    udiv => UDiv;
    /// Matches `sdiv`.
    sdiv => SDiv;
    /// Matches `urem`.
    urem => URem;
    /// Matches `srem`.
    srem => SRem;
    /// Matches `fneg`.
    fneg => FNeg;
    /// Matches `fadd`.
    fadd => FAdd;
    /// Matches `fsub`.
    fsub => FSub;
    /// Matches `fmul`.
    fmul => FMul;
    /// Matches `fdiv`.
    fdiv => FDiv;
    /// Matches `frem`.
    frem => FRem;
}

/// Matches an `icmp`, optionally of one specific ordering, with operand
/// sub-patterns.
#[derive(Debug)]
pub struct ICmpMatcher<L, R> {
    order: Option<ICmpOrder>,
    lhs: L,
    rhs: R,
}

impl<L: Matcher, R: Matcher> Matcher for ICmpMatcher<L, R> {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        let module = manager.module();

        let (order, lhs, rhs) = match module.value(value).as_inst() {
            Some(Inst::ICmp { order, lhs, rhs }) => (*order, *lhs, *rhs),
            _ => return false,
        };

        if let Some(expected) = self.order {
            if order != expected {
                return false;
            }
        }

        self.lhs.matches(manager, lhs) && self.rhs.matches(manager, rhs)
    }
}

/// Matches any `icmp` whose operands fit the sub-patterns.
pub fn icmp<L: Matcher, R: Matcher>(lhs: L, rhs: R) -> ICmpMatcher<L, R> {
    ICmpMatcher {
        order: None,
        lhs,
        rhs,
    }
}

/// Matches an `icmp` with this exact ordering.
pub fn icmp_with<L: Matcher, R: Matcher>(
    order: ICmpOrder,
    lhs: L,
    rhs: R,
) -> ICmpMatcher<L, R> {
    ICmpMatcher {
        order: Some(order),
        lhs,
        rhs,
    }
}

/// Matches an `fcmp`, optionally of one specific ordering, with operand
/// sub-patterns.
#[derive(Debug)]
pub struct FCmpMatcher<L, R> {
    order: Option<FCmpOrder>,
    lhs: L,
    rhs: R,
}

impl<L: Matcher, R: Matcher> Matcher for FCmpMatcher<L, R> {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        let module = manager.module();

        let (order, lhs, rhs) = match module.value(value).as_inst() {
            Some(Inst::FCmp { order, lhs, rhs }) => (*order, *lhs, *rhs),
            _ => return false,
        };

        if let Some(expected) = self.order {
            if order != expected {
                return false;
            }
        }

        self.lhs.matches(manager, lhs) && self.rhs.matches(manager, rhs)
    }
}

/// Matches any `fcmp` whose operands fit the sub-patterns.
pub fn fcmp<L: Matcher, R: Matcher>(lhs: L, rhs: R) -> FCmpMatcher<L, R> {
    FCmpMatcher {
        order: None,
        lhs,
        rhs,
    }
}

/// Matches an `fcmp` with this exact ordering.
pub fn fcmp_with<L: Matcher, R: Matcher>(
    order: FCmpOrder,
    lhs: L,
    rhs: R,
) -> FCmpMatcher<L, R> {
    FCmpMatcher {
        order: Some(order),
        lhs,
        rhs,
    }
}

/// Matches a conversion, with a sub-pattern for its operand.
#[derive(Debug)]
pub struct ConvMatcher<M> {
    op: Option<ConvOp>,
    from: M,
}

impl<M: Matcher> Matcher for ConvMatcher<M> {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        let module = manager.module();

        let (op, from) = match module.value(value).as_inst() {
            Some(Inst::Conv { op, from }) => (*op, *from),
            _ => return false,
        };

        if let Some(expected) = self.op {
            if op != expected {
                return false;
            }
        }

        self.from.matches(manager, from)
    }
}

/// Matches any conversion whose operand fits the sub-pattern.
pub fn conversion<M: Matcher>(from: M) -> ConvMatcher<M> {
    ConvMatcher { op: None, from }
}

macro_rules! conv_matchers {
    ( $( $( #[$meta:meta] )* $name:ident => $op:ident; )* ) => {
        $(
            $( #[$meta] )*
            pub fn $name<M: Matcher>(from: M) -> ConvMatcher<M> {
                ConvMatcher { op: Some(ConvOp::$op), from }
            }
        )*
    };
}

conv_matchers! {
    /// Matches `sext`.
    sext => Sext;
    /// Matches `zext`.
    zext => Zext;
    /// Matches `trunc`.
    trunc => Trunc;
    /// Matches `itob`.
    itob => IToB;
    /// Matches `btoi`.
    btoi => BToI;
    /// Matches `itop`.
    itop => IToP;
    /// Matches `ptoi`.
    ptoi => PToI;
    /// Matches `sitof`.
    sitof => SIToF;
    /// Matches `uitof`.
    uitof => UIToF;
    /// Matches `ftosi`.
    ftosi => FToSI;
    /// Matches `ftoui`.
    ftoui => FToUI;
}

/// The conjunction of two patterns.
#[derive(Debug)]
pub struct Both<A, B> {
    first: A,
    second: B,
}

impl<A: Matcher, B: Matcher> Matcher for Both<A, B> {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        self.first.matches(manager, value) && self.second.matches(manager, value)
    }
}

/// Matches when both patterns match.
pub fn both<A: Matcher, B: Matcher>(first: A, second: B) -> Both<A, B> {
    Both { first, second }
}

/// The conjunction of a tuple of patterns; see [`all`].
#[derive(Debug)]
pub struct All<T>(T);

/// Matches when every pattern in the tuple matches.
pub fn all<T>(patterns: T) -> All<T>
where
    All<T>: Matcher,
{
    All(patterns)
}

/// The disjunction of a tuple of patterns; see [`one_of`].
#[derive(Debug)]
pub struct OneOf<T>(T);

/// Matches when at least one pattern in the tuple matches.
pub fn one_of<T>(patterns: T) -> OneOf<T>
where
    OneOf<T>: Matcher,
{
    OneOf(patterns)
}

macro_rules! tuple_combinators {
    ( $( ( $($m:ident . $idx:tt),+ ); )* ) => {
        $(
            impl<$($m: Matcher),+> Matcher for All<($($m,)+)> {
                fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
                    $( (self.0).$idx.matches(manager, value) )&&+
                }
            }

            impl<$($m: Matcher),+> Matcher for OneOf<($($m,)+)> {
                fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
                    $( (self.0).$idx.matches(manager, value) )||+
                }
            }
        )*
    };
}

tuple_combinators! {
    (A.0);
    (A.0, B.1);
    (A.0, B.1, C.2);
    (A.0, B.1, C.2, D.3);
    (A.0, B.1, C.2, D.3, E.4);
    (A.0, B.1, C.2, D.3, E.4, F.5);
    (A.0, B.1, C.2, D.3, E.4, F.5, G.6);
    (A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7);
}

/// Captures the matched value into a slot when the inner pattern matches.
#[derive(Debug)]
pub struct Capture<'a, M> {
    slot: &'a Cell<Option<ValueId>>,
    inner: M,
}

impl<M: Matcher> Matcher for Capture<'_, M> {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        if self.inner.matches(manager, value) {
            self.slot.set(Some(value));
            return true;
        }

        false
    }
}

/// Wraps `inner` so that a successful match also stores the value id in
/// `slot`.
pub fn capture<'a, M: Matcher>(slot: &'a Cell<Option<ValueId>>, inner: M) -> Capture<'a, M> {
    Capture { slot, inner }
}

/// Captures the matched value's type into a slot when the inner pattern
/// matches.
#[derive(Debug)]
pub struct CaptureTy<'a, M> {
    slot: &'a Cell<Option<TyId>>,
    inner: M,
}

impl<M: Matcher> Matcher for CaptureTy<'_, M> {
    fn matches(&self, manager: &mut AnalysisManager<'_>, value: ValueId) -> bool {
        if self.inner.matches(manager, value) {
            self.slot.set(Some(manager.module().value(value).ty()));
            return true;
        }

        false
    }
}

/// Wraps `inner` so that a successful match also stores the value's type in
/// `slot`.
pub fn capture_ty<'a, M: Matcher>(slot: &'a Cell<Option<TyId>>, inner: M) -> CaptureTy<'a, M> {
    CaptureTy { slot, inner }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn sample() -> (Module, ValueId, ValueId, ValueId) {
        let mut module = Module::new();
        let i32_ty = module.i32_ty();

        let mut b = Builder::new(&mut module);
        let f = b.create_func("f", i32_ty, &[i32_ty]);
        let arg = b.module().func(f).args()[0];
        let entry = b.create_block_in(f);
        b.set_insert_point(entry);

        let one = b.const_i32(1);
        let sum = b.iadd(arg, one).unwrap();
        let cmp = b.icmp_eq(sum, one).unwrap();
        b.ret(sum).unwrap();

        (module, arg, sum, cmp)
    }

    #[test]
    fn class_and_operand_matchers() {
        let (module, arg, sum, cmp) = sample();
        let mut am = AnalysisManager::new(&module);

        assert!(matches(sum, &mut am, binary_inst()));
        assert!(matches(sum, &mut am, iadd(any(), any())));
        assert!(matches(sum, &mut am, iadd(argument(), const_int())));
        assert!(!matches(sum, &mut am, iadd(const_int(), any())));
        assert!(!matches(sum, &mut am, isub(any(), any())));

        assert!(matches(cmp, &mut am, icmp(any(), any())));
        assert!(matches(
            cmp,
            &mut am,
            icmp_with(crate::inst::ICmpOrder::Eq, iadd(any(), any()), const_int())
        ));
        assert!(!matches(
            cmp,
            &mut am,
            icmp_with(crate::inst::ICmpOrder::Ne, any(), any())
        ));

        assert!(matches(arg, &mut am, argument()));
        assert!(!matches(arg, &mut am, binary_inst()));
    }

    #[test]
    fn type_matchers_and_combinators() {
        let (module, arg, sum, cmp) = sample();
        let mut am = AnalysisManager::new(&module);

        assert!(matches(sum, &mut am, both(binary_inst(), of_int_ty())));
        assert!(matches(cmp, &mut am, of_bool_ty()));
        assert!(!matches(sum, &mut am, of_bool_ty()));

        assert!(matches(
            sum,
            &mut am,
            all((binary_inst(), of_int_ty(), iadd(any(), any())))
        ));
        assert!(matches(arg, &mut am, one_of((binary_inst(), argument()))));
        assert!(!matches(arg, &mut am, one_of((binary_inst(), phi()))));
    }

    #[test]
    fn captures_bind_on_match() {
        let (module, _, sum, _) = sample();
        let mut am = AnalysisManager::new(&module);

        let lhs = Cell::new(None);
        let ty = Cell::new(None);

        assert!(matches(
            sum,
            &mut am,
            capture_ty(&ty, iadd(capture(&lhs, argument()), any()))
        ));

        let bound = lhs.get().expect("lhs should be captured");
        assert!(matches(bound, &mut am, argument()));
        assert_eq!(ty.get(), Some(module.i32_ty()));

        // a failed match leaves the slot alone
        let untouched = Cell::new(None);
        assert!(!matches(sum, &mut am, capture(&untouched, phi())));
        assert_eq!(untouched.get(), None);
    }
}
