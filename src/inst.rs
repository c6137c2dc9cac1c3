//! The Sable IR instruction set.
//!
//! An instruction is a closed enum variant with a result type carried by its
//! owning [`Value`](crate::value::Value); the enum discriminant is the kind
//! tag. Operand references are [`ValueId`]s and branch targets are
//! [`BlockId`]s, both owned by the module the instruction lives in, so
//! derived equality and hashing give the deep structural laws directly.

use crate::module::{BlockId, FuncId};
use crate::ty::TyId;
use crate::value::ValueId;
use smallvec::SmallVec;

/// An instruction's operand list. Most instructions have three or fewer
/// operands, so that many are stored inline.
pub type OperandList = SmallVec<[ValueId; 3]>;

/// A terminator's possible branch targets. `cbr` has two, everything else
/// fewer.
pub type BranchTargets = SmallVec<[BlockId; 2]>;

/// A phi's incoming `(block, value)` pairs, kept sorted.
pub type PhiIncoming = SmallVec<[(BlockId, ValueId); 3]>;

macro_rules! mnemonic_enum {
    (
        $( #[$attr:meta] )*
        $vis:vis enum $name:ident {
            $(
                $( #[$vattr:meta] )*
                $token:literal => $variant:ident;
            )*
        }
    ) => {
        $( #[$attr] )*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $( #[$vattr] )*
                $variant,
            )*
        }

        impl $name {
            /// The textual-format spelling of this operation.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Self::$variant => $token, )*
                }
            }

            /// Maps a textual-format spelling back to the operation.
            pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
                match mnemonic {
                    $( $token => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

mnemonic_enum! {
    /// The ordering predicate of an [`Inst::ICmp`].
    ///
    /// `u`-prefixed predicates compare the raw bits as unsigned integers,
    /// `s`-prefixed ones as two's-complement signed integers.
    pub enum ICmpOrder {
        /// Equal.
        "eq" => Eq;
        /// Not equal.
        "ne" => Ne;
        /// Unsigned less-than.
        "ult" => Ult;
        /// Unsigned greater-than.
        "ugt" => Ugt;
        /// Unsigned less-than-or-equal.
        "ule" => Ule;
        /// Unsigned greater-than-or-equal.
        "uge" => Uge;
        /// Signed less-than.
        "slt" => Slt;
        /// Signed greater-than.
        "sgt" => Sgt;
        /// Signed less-than-or-equal.
        "sle" => Sle;
        /// Signed greater-than-or-equal.
        "sge" => Sge;
    }
}

mnemonic_enum! {
    /// The ordering predicate of an [`Inst::FCmp`].
    ///
    /// `o`-prefixed predicates are *ordered* (false if either operand is
    /// NaN), `u`-prefixed ones *unordered* (true if either operand is NaN).
    pub enum FCmpOrder {
        /// Neither operand is NaN.
        "ord" => Ord;
        /// At least one operand is NaN.
        "uno" => Uno;
        /// Ordered and equal.
        "oeq" => Oeq;
        /// Ordered and not equal.
        "one" => One;
        /// Ordered and greater-than.
        "ogt" => Ogt;
        /// Ordered and less-than.
        "olt" => Olt;
        /// Ordered and greater-than-or-equal.
        "oge" => Oge;
        /// Ordered and less-than-or-equal.
        "ole" => Ole;
        /// Unordered or equal.
        "ueq" => Ueq;
        /// Unordered or not equal.
        "une" => Une;
        /// Unordered or greater-than.
        "ugt" => Ugt;
        /// Unordered or less-than.
        "ult" => Ult;
        /// Unordered or greater-than-or-equal.
        "uge" => Uge;
        /// Unordered or less-than-or-equal.
        "ule" => Ule;
    }
}

/// The operand class a [`BinaryOp`] accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandClass {
    /// Integer or `bool` operands.
    IntOrBool,
    /// Integer operands only.
    Int,
    /// Floating-point operands only.
    Float,
}

impl OperandClass {
    /// A human-readable description, used in diagnostics.
    pub fn description(self) -> &'static str {
        match self {
            OperandClass::IntOrBool => "integral or 'bool'",
            OperandClass::Int => "integral",
            OperandClass::Float => "floating-point",
        }
    }
}

mnemonic_enum! {
    /// A two-operand arithmetic or logic operation.
    ///
    /// Both operands must have the same type, which is also the result type;
    /// the type must lie in the op's [`OperandClass`].
    pub enum BinaryOp {
        /// Bitwise and.
        "and" => And;
        /// Bitwise or.
        "or" => Or;
        /// Bitwise exclusive or.
        "xor" => Xor;
        /// Shift left.
        "shl" => Shl;
        /// Logical (zero-filling) shift right.
        "lshr" => LShr;
        /// Arithmetic (sign-extending) shift right.
        "ashr" => AShr;
        /// Wrapping integer addition.
        "iadd" => IAdd;
        /// Wrapping integer subtraction.
        "isub" => ISub;
        /// Wrapping integer multiplication.
        "imul" => IMul;
        /// Unsigned integer division.
        "udiv" => UDiv;
        /// Signed integer division.
        "sdiv" => SDiv;
        /// Unsigned integer remainder.
        "urem" => URem;
        /// Signed integer remainder.
        "srem" => SRem;
        /// Floating-point negation.
        "fneg" => FNeg;
        /// Floating-point addition.
        "fadd" => FAdd;
        /// Floating-point subtraction.
        "fsub" => FSub;
        /// Floating-point multiplication.
        "fmul" => FMul;
        /// Floating-point division.
        "fdiv" => FDiv;
        /// Floating-point remainder.
        "frem" => FRem;
    }
}

impl BinaryOp {
    /// The operand class this operation accepts.
    pub fn operand_class(self) -> OperandClass {
        use BinaryOp::*;

        match self {
            And | Or | Xor | Shl | LShr | AShr => OperandClass::IntOrBool,
            IAdd | ISub | IMul | UDiv | SDiv | URem | SRem => OperandClass::Int,
            FNeg | FAdd | FSub | FMul | FDiv | FRem => OperandClass::Float,
        }
    }
}

mnemonic_enum! {
    /// A one-operand conversion. The result type is the instruction's type.
    pub enum ConvOp {
        /// Sign-extend an integer to a strictly wider integer type.
        "sext" => Sext;
        /// Zero-extend an integer to a strictly wider integer type.
        "zext" => Zext;
        /// Truncate an integer to another integer type.
        "trunc" => Trunc;
        /// Integer to `bool`: zero becomes `false`, anything else `true`.
        "itob" => IToB;
        /// `bool` to integer: `false` becomes 0, `true` becomes 1.
        "btoi" => BToI;
        /// Integer to pointer.
        "itop" => IToP;
        /// Pointer to integer.
        "ptoi" => PToI;
        /// Signed integer to float.
        "sitof" => SIToF;
        /// Unsigned integer to float.
        "uitof" => UIToF;
        /// Float to signed integer.
        "ftosi" => FToSI;
        /// Float to unsigned integer.
        "ftoui" => FToUI;
    }
}

/// A Sable IR instruction.
///
/// The per-variant invariants listed here are enforced by the
/// [`Builder`](crate::builder::Builder) when the instruction is created;
/// violating them there is a panic, not a recoverable error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Inst {
    /// Unconditional branch. Terminator.
    Br {
        /// The block control transfers to.
        target: BlockId,
    },
    /// Two-way conditional branch. Terminator.
    CondBr {
        /// Must be of `bool` type.
        cond: ValueId,
        /// Taken when `cond` is `true`.
        true_target: BlockId,
        /// Taken when `cond` is `false`.
        false_target: BlockId,
    },
    /// Return from the function. Terminator. The value's type must match the
    /// function's return type, and is absent exactly when that type is
    /// `void`.
    Ret {
        /// The returned value, if the function returns one.
        value: Option<ValueId>,
    },
    /// Marks a point control flow can never reach. Terminator.
    Unreachable,
    /// Integer comparison. Operands share one integer or `bool` type; the
    /// result is `bool`.
    ICmp {
        /// The comparison predicate.
        order: ICmpOrder,
        /// Left operand.
        lhs: ValueId,
        /// Right operand.
        rhs: ValueId,
    },
    /// Floating-point comparison. Operands share one float type; the result
    /// is `bool`.
    FCmp {
        /// The comparison predicate.
        order: FCmpOrder,
        /// Left operand.
        lhs: ValueId,
        /// Right operand.
        rhs: ValueId,
    },
    /// Selects between two values of one type without branching.
    Sel {
        /// Must be of `bool` type.
        cond: ValueId,
        /// The result when `cond` is `true`.
        if_true: ValueId,
        /// The result when `cond` is `false`.
        if_false: ValueId,
    },
    /// An SSA join point. Every incoming value has the phi's type.
    ///
    /// The incoming list is re-sorted by `(block, value)` after every
    /// mutation, so two phis with the same incoming pairs are equal and hash
    /// identically no matter what order the pairs were added in.
    Phi {
        /// The incoming `(block, value)` pairs, sorted.
        incoming: PhiIncoming,
    },
    /// A two-operand arithmetic or logic operation; see [`BinaryOp`].
    Binary {
        /// Which operation.
        op: BinaryOp,
        /// Left operand.
        lhs: ValueId,
        /// Right operand.
        rhs: ValueId,
    },
    /// A conversion; see [`ConvOp`]. The target type is the instruction's
    /// result type.
    Conv {
        /// Which conversion.
        op: ConvOp,
        /// The value being converted.
        from: ValueId,
    },
    /// Allocates `count` objects of `alloc_ty` on the stack, yielding `ptr`.
    Alloca {
        /// The type being allocated.
        alloc_ty: TyId,
        /// How many objects; must be an integer.
        count: ValueId,
    },
    /// Loads a value of the result type from a pointer.
    Load {
        /// Must be of `ptr` type.
        target: ValueId,
        /// Whether the access may not be elided or reordered.
        volatile: bool,
    },
    /// Stores a value through a pointer. Result type is `void`.
    Store {
        /// The value being stored.
        value: ValueId,
        /// Must be of `ptr` type.
        target: ValueId,
        /// Whether the access may not be elided or reordered.
        volatile: bool,
    },
    /// Pointer arithmetic: `base + index * sizeof(elem_ty)`, yielding `ptr`.
    Offset {
        /// The element type being stepped over.
        elem_ty: TyId,
        /// Must be of `ptr` type.
        base: ValueId,
        /// Must be an integer.
        index: ValueId,
    },
    /// Computes a pointer to the `index`th element of an aggregate of type
    /// `agg_ty` behind `base`, yielding `ptr`. If `agg_ty` is a struct, the
    /// index must be a constant integer naming a field.
    ElemPtr {
        /// The aggregate type behind the pointer.
        agg_ty: TyId,
        /// Must be of `ptr` type.
        base: ValueId,
        /// Must be an integer.
        index: ValueId,
    },
    /// Extracts the element selected by `index` from an aggregate value.
    /// Struct access requires a constant index; array access may be dynamic.
    Extract {
        /// The aggregate being read.
        agg: ValueId,
        /// Must be an integer.
        index: ValueId,
    },
    /// Produces a copy of an aggregate with the element selected by `index`
    /// replaced by `value`, which must have that element's type.
    Insert {
        /// The aggregate being updated.
        agg: ValueId,
        /// Must be an integer.
        index: ValueId,
        /// The replacement element.
        value: ValueId,
    },
    /// Calls a function. Arity and per-position argument types must match
    /// the target's signature; the result type is the target's return type.
    Call {
        /// The function being called.
        target: FuncId,
        /// The arguments, in order.
        args: OperandList,
    },
}

impl Inst {
    /// The textual-format opcode of this instruction.
    pub fn opcode(&self) -> &'static str {
        match self {
            Inst::Br { .. } => "br",
            Inst::CondBr { .. } => "cbr",
            Inst::Ret { .. } => "ret",
            Inst::Unreachable => "unreachable",
            Inst::ICmp { .. } => "icmp",
            Inst::FCmp { .. } => "fcmp",
            Inst::Sel { .. } => "sel",
            Inst::Phi { .. } => "phi",
            Inst::Binary { op, .. } => op.mnemonic(),
            Inst::Conv { op, .. } => op.mnemonic(),
            Inst::Alloca { .. } => "alloca",
            Inst::Load { .. } => "load",
            Inst::Store { .. } => "store",
            Inst::Offset { .. } => "offset",
            Inst::ElemPtr { .. } => "elemptr",
            Inst::Extract { .. } => "extract",
            Inst::Insert { .. } => "insert",
            Inst::Call { .. } => "call",
        }
    }

    /// Whether this instruction must end a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Inst::Br { .. } | Inst::CondBr { .. } | Inst::Ret { .. } | Inst::Unreachable
        )
    }

    /// The value operands of this instruction, in a fixed per-kind order.
    /// Branch targets are not operands.
    pub fn operands(&self) -> OperandList {
        match self {
            Inst::Br { .. } | Inst::Unreachable => OperandList::new(),
            Inst::CondBr { cond, .. } => [*cond].into_iter().collect(),
            Inst::Ret { value } => value.iter().copied().collect(),
            Inst::ICmp { lhs, rhs, .. }
            | Inst::FCmp { lhs, rhs, .. }
            | Inst::Binary { lhs, rhs, .. } => [*lhs, *rhs].into_iter().collect(),
            Inst::Sel {
                cond,
                if_true,
                if_false,
            } => [*cond, *if_true, *if_false].into_iter().collect(),
            Inst::Phi { incoming } => incoming.iter().map(|&(_, v)| v).collect(),
            Inst::Conv { from, .. } => [*from].into_iter().collect(),
            Inst::Alloca { count, .. } => [*count].into_iter().collect(),
            Inst::Load { target, .. } => [*target].into_iter().collect(),
            Inst::Store { value, target, .. } => [*value, *target].into_iter().collect(),
            Inst::Offset { base, index, .. } | Inst::ElemPtr { base, index, .. } => {
                [*base, *index].into_iter().collect()
            }
            Inst::Extract { agg, index } => [*agg, *index].into_iter().collect(),
            Inst::Insert { agg, index, value } => [*agg, *index, *value].into_iter().collect(),
            Inst::Call { args, .. } => args.clone(),
        }
    }

    /// Whether `value` appears among this instruction's operands.
    pub fn uses(&self, value: ValueId) -> bool {
        self.operands().contains(&value)
    }

    /// How many times `value` appears among this instruction's operands.
    pub fn use_count(&self, value: ValueId) -> usize {
        self.operands().iter().filter(|&&v| v == value).count()
    }

    /// Replaces every operand occurrence of `old` with `new`.
    ///
    /// A phi re-sorts its incoming list afterwards so the canonical-order
    /// invariant holds.
    pub fn replace_operand_with(&mut self, old: ValueId, new: ValueId) {
        let replace = |v: &mut ValueId| {
            if *v == old {
                *v = new;
            }
        };

        match self {
            Inst::Br { .. } | Inst::Unreachable => {}
            Inst::CondBr { cond, .. } => replace(cond),
            Inst::Ret { value } => {
                if let Some(v) = value {
                    replace(v);
                }
            }
            Inst::ICmp { lhs, rhs, .. }
            | Inst::FCmp { lhs, rhs, .. }
            | Inst::Binary { lhs, rhs, .. } => {
                replace(lhs);
                replace(rhs);
            }
            Inst::Sel {
                cond,
                if_true,
                if_false,
            } => {
                replace(cond);
                replace(if_true);
                replace(if_false);
            }
            Inst::Phi { incoming } => {
                for (_, v) in incoming.iter_mut() {
                    replace(v);
                }
                incoming.sort_by_key(|&(b, v)| (b.index(), v.index()));
            }
            Inst::Conv { from, .. } => replace(from),
            Inst::Alloca { count, .. } => replace(count),
            Inst::Load { target, .. } => replace(target),
            Inst::Store { value, target, .. } => {
                replace(value);
                replace(target);
            }
            Inst::Offset { base, index, .. } | Inst::ElemPtr { base, index, .. } => {
                replace(base);
                replace(index);
            }
            Inst::Extract { agg, index } => {
                replace(agg);
                replace(index);
            }
            Inst::Insert { agg, index, value } => {
                replace(agg);
                replace(index);
                replace(value);
            }
            Inst::Call { args, .. } => {
                for v in args.iter_mut() {
                    replace(v);
                }
            }
        }
    }

    /// The blocks this instruction can branch to. Empty for non-terminators
    /// and for terminators that leave the function.
    pub fn possible_branch_targets(&self) -> BranchTargets {
        match self {
            Inst::Br { target } => [*target].into_iter().collect(),
            Inst::CondBr {
                true_target,
                false_target,
                ..
            } => [*true_target, *false_target].into_iter().collect(),
            _ => BranchTargets::new(),
        }
    }

    /// Whether this instruction can branch to `block`.
    pub fn can_branch_to(&self, block: BlockId) -> bool {
        self.possible_branch_targets().contains(&block)
    }

    /// Replaces every branch-target occurrence of `old` with `new`.
    pub fn replace_branch_target(&mut self, old: BlockId, new: BlockId) {
        match self {
            Inst::Br { target } => {
                if *target == old {
                    *target = new;
                }
            }
            Inst::CondBr {
                true_target,
                false_target,
                ..
            } => {
                if *true_target == old {
                    *true_target = new;
                }
                if *false_target == old {
                    *false_target = new;
                }
            }
            _ => {}
        }
    }

    /// The incoming `(block, value)` pairs of a phi, in canonical (sorted)
    /// order.
    ///
    /// # Panics
    ///
    /// Panics if this instruction is not a phi.
    pub fn incoming(&self) -> &[(BlockId, ValueId)] {
        match self {
            Inst::Phi { incoming } => incoming,
            _ => panic!("'{}' instruction has no incoming list", self.opcode()),
        }
    }

    /// Adds an incoming `(block, value)` pair to a phi, keeping the list
    /// sorted so insertion order is never observable.
    ///
    /// Type agreement between the value and the phi is checked by the
    /// [`Builder`](crate::builder::Builder), which has the module at hand.
    ///
    /// # Panics
    ///
    /// Panics if this instruction is not a phi.
    pub fn add_incoming(&mut self, block: BlockId, value: ValueId) {
        let Inst::Phi { incoming } = self else {
            panic!("cannot add an incoming block to a '{}'", self.opcode());
        };

        let key = (block.index(), value.index());
        let pos = incoming.partition_point(|&(b, v)| (b.index(), v.index()) <= key);
        incoming.insert(pos, (block, value));
    }

    /// Replaces every incoming-block occurrence of `old` with `new` in a
    /// phi, re-sorting afterwards.
    ///
    /// # Panics
    ///
    /// Panics if this instruction is not a phi.
    pub fn replace_block_ref(&mut self, old: BlockId, new: BlockId) {
        let Inst::Phi { incoming } = self else {
            panic!("cannot replace a block reference on a '{}'", self.opcode());
        };

        for (b, _) in incoming.iter_mut() {
            if *b == old {
                *b = new;
            }
        }

        incoming.sort_by_key(|&(b, v)| (b.index(), v.index()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Block, Function};
    use crate::ty::Type;
    use crate::value::{Value, ValueData};
    use id_arena::Arena;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    // enough raw arena scaffolding to mint ids without a whole module
    fn ids() -> (Vec<ValueId>, Vec<BlockId>) {
        let mut values: Arena<Value> = Arena::new();
        let mut types: Arena<Type> = Arena::new();
        let mut blocks: Arena<Block> = Arena::new();
        let mut funcs: Arena<Function> = Arena::new();

        let ty = types.alloc(Type::Bool);
        let func = funcs.alloc(Function::new("f".into(), ty, SmallVec::new()));

        let vals = (0..4)
            .map(|i| values.alloc(Value::new(ty, ValueData::Argument { index: i })))
            .collect();
        let bbs = (0..4).map(|_| blocks.alloc(Block::new(func, None))).collect();

        (vals, bbs)
    }

    #[test]
    fn phi_incoming_insertion_sorts() {
        let (vals, bbs) = ids();

        let mut phi1 = Inst::Phi {
            incoming: PhiIncoming::new(),
        };
        phi1.add_incoming(bbs[1], vals[0]);
        phi1.add_incoming(bbs[0], vals[1]);
        phi1.add_incoming(bbs[2], vals[2]);

        let mut phi2 = Inst::Phi {
            incoming: PhiIncoming::new(),
        };
        phi2.add_incoming(bbs[2], vals[2]);
        phi2.add_incoming(bbs[0], vals[1]);
        phi2.add_incoming(bbs[1], vals[0]);

        assert_eq!(phi1, phi2);
        assert_eq!(hash_of(&phi1), hash_of(&phi2));
        assert_eq!(phi1.incoming()[0], (bbs[0], vals[1]));
    }

    #[test]
    fn phi_block_replacement_resorts() {
        let (vals, bbs) = ids();

        let mut phi = Inst::Phi {
            incoming: PhiIncoming::new(),
        };
        phi.add_incoming(bbs[0], vals[0]);
        phi.add_incoming(bbs[3], vals[1]);

        phi.replace_block_ref(bbs[3], bbs[1]);
        assert_eq!(phi.incoming(), &[(bbs[0], vals[0]), (bbs[1], vals[1])]);
    }

    #[test]
    fn operand_replacement_hits_every_occurrence() {
        let (vals, _) = ids();

        let mut add = Inst::Binary {
            op: BinaryOp::IAdd,
            lhs: vals[0],
            rhs: vals[0],
        };

        assert_eq!(add.use_count(vals[0]), 2);
        add.replace_operand_with(vals[0], vals[1]);
        assert_eq!(add.use_count(vals[0]), 0);
        assert_eq!(add.use_count(vals[1]), 2);
        assert!(add.uses(vals[1]));
    }

    #[test]
    fn terminator_classification() {
        let (vals, bbs) = ids();

        let br = Inst::Br { target: bbs[0] };
        let cbr = Inst::CondBr {
            cond: vals[0],
            true_target: bbs[0],
            false_target: bbs[1],
        };
        let add = Inst::Binary {
            op: BinaryOp::IAdd,
            lhs: vals[0],
            rhs: vals[1],
        };

        assert!(br.is_terminator());
        assert!(cbr.is_terminator());
        assert!(Inst::Unreachable.is_terminator());
        assert!(Inst::Ret { value: None }.is_terminator());
        assert!(!add.is_terminator());

        assert!(cbr.can_branch_to(bbs[0]));
        assert!(cbr.can_branch_to(bbs[1]));
        assert!(!cbr.can_branch_to(bbs[2]));
        assert_eq!(br.possible_branch_targets().as_slice(), &[bbs[0]]);
    }

    #[test]
    fn branch_target_replacement() {
        let (vals, bbs) = ids();

        let mut cbr = Inst::CondBr {
            cond: vals[0],
            true_target: bbs[0],
            false_target: bbs[0],
        };

        cbr.replace_branch_target(bbs[0], bbs[2]);
        assert_eq!(cbr.possible_branch_targets().as_slice(), &[bbs[2], bbs[2]]);
    }

    #[test]
    fn mnemonics_round_trip() {
        for op in [
            BinaryOp::And,
            BinaryOp::Shl,
            BinaryOp::IAdd,
            BinaryOp::SDiv,
            BinaryOp::FRem,
        ] {
            assert_eq!(BinaryOp::from_mnemonic(op.mnemonic()), Some(op));
        }

        assert_eq!(ICmpOrder::from_mnemonic("sle"), Some(ICmpOrder::Sle));
        assert_eq!(FCmpOrder::from_mnemonic("ueq"), Some(FCmpOrder::Ueq));
        assert_eq!(ConvOp::from_mnemonic("ptoi"), Some(ConvOp::PToI));
        assert_eq!(BinaryOp::from_mnemonic("bogus"), None);
    }
}
