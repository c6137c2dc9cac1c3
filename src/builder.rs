//! A validating, cursor-based API for constructing IR.
//!
//! Every `create`-style method checks its instruction's structural
//! invariants and panics on violation; IR that comes out of a [`Builder`] is
//! well-formed by construction. If no insertion block is set, instruction
//! constructors quietly return `None` instead — a deliberate affordance that
//! lets tests exercise construction paths without a full function skeleton.

use crate::inst::{BinaryOp, ConvOp, FCmpOrder, ICmpOrder, Inst, OperandClass, PhiIncoming};
use crate::module::{BlockId, FuncId, Module};
use crate::ty::{ApInt, FloatWidth, IntWidth, TyId, Type};
use crate::value::{Constant, ValueId};

/// Builds IR into a [`Module`], one instruction at a time, at an insertion
/// cursor.
#[derive(Debug)]
pub struct Builder<'m> {
    module: &'m mut Module,
    func: Option<FuncId>,
    block: Option<BlockId>,
}

macro_rules! binary_ctors {
    ( $( $( #[$meta:meta] )* $name:ident => $op:ident; )* ) => {
        $(
            $( #[$meta] )*
            pub fn $name(&mut self, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
                self.binary(BinaryOp::$op, lhs, rhs)
            }
        )*
    };
}

macro_rules! icmp_ctors {
    ( $( $name:ident => $order:ident; )* ) => {
        $(
            /// Creates an `icmp` with this predicate.
            pub fn $name(&mut self, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
                self.icmp(ICmpOrder::$order, lhs, rhs)
            }
        )*
    };
}

macro_rules! fcmp_ctors {
    ( $( $name:ident => $order:ident; )* ) => {
        $(
            /// Creates an `fcmp` with this predicate.
            pub fn $name(&mut self, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
                self.fcmp(FCmpOrder::$order, lhs, rhs)
            }
        )*
    };
}

impl<'m> Builder<'m> {
    /// Creates a builder with no insertion point.
    pub fn new(module: &'m mut Module) -> Self {
        Builder {
            module,
            func: None,
            block: None,
        }
    }

    /// The module being built.
    #[inline]
    pub fn module(&self) -> &Module {
        self.module
    }

    // ---- cursor ----

    /// The block instructions are currently appended to, if any.
    #[inline]
    pub fn current_block(&self) -> Option<BlockId> {
        self.block
    }

    /// The function blocks are currently created in, if any.
    #[inline]
    pub fn current_func(&self) -> Option<FuncId> {
        self.func
    }

    /// Moves the cursor to the end of `block` (and into its function).
    pub fn set_insert_point(&mut self, block: BlockId) {
        self.func = Some(self.module.block(block).parent());
        self.block = Some(block);
    }

    /// Selects the function new blocks are appended to, without choosing an
    /// insertion block.
    pub fn set_insert_func(&mut self, func: FuncId) {
        self.func = Some(func);
    }

    /// Clears both the insertion block and function.
    pub fn clear_insert_point(&mut self) {
        self.func = None;
        self.block = None;
    }

    // ---- functions and blocks ----

    /// Creates a function.
    ///
    /// # Panics
    ///
    /// Panics if a function with this name already exists.
    pub fn create_func(&mut self, name: &str, return_ty: TyId, arg_tys: &[TyId]) -> FuncId {
        self.module.create_func(name, return_ty, arg_tys)
    }

    /// Finds a function by name.
    pub fn find_func(&self, name: &str) -> Option<FuncId> {
        self.module.find_func(name)
    }

    /// Finds the function with this name, creating it if absent.
    ///
    /// # Panics
    ///
    /// Panics if the function exists with a different signature.
    pub fn find_or_create_func(
        &mut self,
        name: &str,
        return_ty: TyId,
        arg_tys: &[TyId],
    ) -> FuncId {
        self.module.find_or_create_func(name, return_ty, arg_tys)
    }

    /// Appends a fresh empty block to the current function.
    ///
    /// # Panics
    ///
    /// Panics if no function is selected; use
    /// [`set_insert_func`](Self::set_insert_func) first.
    pub fn create_block(&mut self) -> BlockId {
        let func = self
            .func
            .expect("must have a function to put the block in; use set_insert_func");
        self.module.append_block(func, None)
    }

    /// Appends a fresh empty block with a declared name to the current
    /// function.
    ///
    /// # Panics
    ///
    /// Panics if no function is selected.
    pub fn create_block_named(&mut self, name: &str) -> BlockId {
        let func = self
            .func
            .expect("must have a function to put the block in; use set_insert_func");
        self.module.append_block(func, Some(name))
    }

    /// Appends a fresh empty block to `func`, which also becomes the current
    /// function.
    pub fn create_block_in(&mut self, func: FuncId) -> BlockId {
        self.func = Some(func);
        self.create_block()
    }

    /// Finds a block of the current function by declared name.
    pub fn find_block_with_name(&self, name: &str) -> Option<BlockId> {
        let func = self.func?;

        self.module
            .func(func)
            .blocks()
            .iter()
            .copied()
            .find(|&b| self.module.block_name(b) == Some(name))
    }

    // ---- types ----

    /// The `i8` type.
    #[inline]
    pub fn i8_ty(&self) -> TyId {
        self.module.i8_ty()
    }

    /// The `i16` type.
    #[inline]
    pub fn i16_ty(&self) -> TyId {
        self.module.i16_ty()
    }

    /// The `i32` type.
    #[inline]
    pub fn i32_ty(&self) -> TyId {
        self.module.i32_ty()
    }

    /// The `i64` type.
    #[inline]
    pub fn i64_ty(&self) -> TyId {
        self.module.i64_ty()
    }

    /// The `bool` type.
    #[inline]
    pub fn bool_ty(&self) -> TyId {
        self.module.bool_ty()
    }

    /// The `ptr` type.
    #[inline]
    pub fn ptr_ty(&self) -> TyId {
        self.module.ptr_ty()
    }

    /// The `f32` type.
    #[inline]
    pub fn f32_ty(&self) -> TyId {
        self.module.f32_ty()
    }

    /// The `f64` type.
    #[inline]
    pub fn f64_ty(&self) -> TyId {
        self.module.f64_ty()
    }

    /// The `void` type.
    #[inline]
    pub fn void_ty(&self) -> TyId {
        self.module.void_ty()
    }

    /// The `{ }` type.
    #[inline]
    pub fn empty_struct_ty(&self) -> TyId {
        self.module.empty_struct_ty()
    }

    /// The integer type of the given width.
    #[inline]
    pub fn int_ty(&self, width: IntWidth) -> TyId {
        self.module.int_ty(width)
    }

    /// The float type of the given width.
    #[inline]
    pub fn float_ty(&self, width: FloatWidth) -> TyId {
        self.module.float_ty(width)
    }

    /// The array type `[element; len]`.
    pub fn array_ty(&mut self, element: TyId, len: u64) -> TyId {
        self.module.array_ty(element, len)
    }

    /// The struct type with the given fields.
    pub fn struct_ty(&mut self, fields: &[TyId]) -> TyId {
        self.module.struct_ty(fields)
    }

    // ---- constants ----

    /// The integer constant for `value`, typed by its width.
    pub fn const_int(&mut self, value: ApInt) -> ValueId {
        self.module.const_int(value)
    }

    /// An `i8` constant.
    pub fn const_i8(&mut self, value: u8) -> ValueId {
        self.const_int(ApInt::new(value as u64, IntWidth::W8))
    }

    /// An `i16` constant.
    pub fn const_i16(&mut self, value: u16) -> ValueId {
        self.const_int(ApInt::new(value as u64, IntWidth::W16))
    }

    /// An `i32` constant.
    pub fn const_i32(&mut self, value: u32) -> ValueId {
        self.const_int(ApInt::new(value as u64, IntWidth::W32))
    }

    /// An `i64` constant.
    pub fn const_i64(&mut self, value: u64) -> ValueId {
        self.const_int(ApInt::new(value, IntWidth::W64))
    }

    /// A `bool` constant.
    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.module.const_bool(value)
    }

    /// The constant `true`.
    pub fn const_true(&mut self) -> ValueId {
        self.const_bool(true)
    }

    /// The constant `false`.
    pub fn const_false(&mut self) -> ValueId {
        self.const_bool(false)
    }

    /// An `f32` constant.
    pub fn const_f32(&mut self, value: f32) -> ValueId {
        let ty = self.f32_ty();
        self.module.const_float(ty, value as f64)
    }

    /// An `f64` constant.
    pub fn const_f64(&mut self, value: f64) -> ValueId {
        let ty = self.f64_ty();
        self.module.const_float(ty, value)
    }

    /// A float constant of an explicit float type.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is not a float type.
    pub fn const_float(&mut self, ty: TyId, value: f64) -> ValueId {
        self.module.const_float(ty, value)
    }

    /// The null pointer constant.
    pub fn const_null(&mut self) -> ValueId {
        self.module.const_null()
    }

    /// The undefined constant of type `ty`.
    pub fn const_undef(&mut self, ty: TyId) -> ValueId {
        self.module.const_undef(ty)
    }

    /// An array constant.
    ///
    /// # Panics
    ///
    /// Panics if `elements` is empty or the elements are not uniformly-typed
    /// constants.
    pub fn const_array(&mut self, elements: &[ValueId]) -> ValueId {
        self.module.const_array(elements)
    }

    /// An array constant of `len` copies of `element`.
    ///
    /// # Panics
    ///
    /// Panics if `element` is not a constant or `len` is zero.
    pub fn const_array_fill(&mut self, element: ValueId, len: usize) -> ValueId {
        self.module.const_array(&vec![element; len])
    }

    /// A struct constant; its type is the struct of the field types.
    ///
    /// # Panics
    ///
    /// Panics if any field is not a constant.
    pub fn const_struct(&mut self, fields: &[ValueId]) -> ValueId {
        self.module.const_struct(fields)
    }

    /// A string constant of type `[i8; len]`.
    pub fn const_string(&mut self, bytes: impl AsRef<[u8]>) -> ValueId {
        self.module.const_string(bytes.as_ref())
    }

    // ---- instructions ----

    fn val_ty(&self, value: ValueId) -> TyId {
        self.module.value(value).ty()
    }

    fn emit(&mut self, ty: TyId, inst: Inst) -> Option<ValueId> {
        let block = self.block?;
        let id = self.module.alloc_inst(ty, inst);
        self.module.block_mut(block).append(id);
        Some(id)
    }

    /// Creates a binary arithmetic or logic instruction.
    ///
    /// # Panics
    ///
    /// Panics if the operands' types differ or fall outside the op's operand
    /// class.
    pub fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
        self.block?;

        let lhs_ty = self.val_ty(lhs);
        assert!(
            lhs_ty == self.val_ty(rhs),
            "`lhs` and `rhs` for '{}' must have the same type",
            op.mnemonic()
        );

        let ok = match op.operand_class() {
            OperandClass::IntOrBool => self.module.ty(lhs_ty).is_int_or_bool(),
            OperandClass::Int => self.module.ty(lhs_ty).is_int(),
            OperandClass::Float => self.module.ty(lhs_ty).is_float(),
        };
        assert!(
            ok,
            "'{}' operands must be {}",
            op.mnemonic(),
            op.operand_class().description()
        );

        self.emit(lhs_ty, Inst::Binary { op, lhs, rhs })
    }

    binary_ctors! {
        /// Creates a bitwise `and`.
        and => And;
        /// Creates a bitwise `or`.
        or => Or;
        /// Creates a bitwise `xor`.
        xor => Xor;
        /// Creates a `shl`.
        shl => Shl;
        /// Creates a logical shift right.
        lshr => LShr;
        /// Creates an arithmetic shift right.
        ashr => AShr;
        /// Creates an integer addition.
        iadd => IAdd;
        /// Creates an integer subtraction.
        isub => ISub;
        /// Creates an integer multiplication.
        imul => IMul;
        /// Creates an unsigned division.
        udiv => UDiv;
        /// Creates a signed division.
        sdiv => SDiv;
        /// Creates an unsigned remainder.
        urem => URem;
        /// Creates a signed remainder.
        srem => SRem;
        /// Creates a float negation.
        fneg => FNeg;
        /// Creates a float addition.
        fadd => FAdd;
        /// Creates a float subtraction.
        fsub => FSub;
        /// Creates a float multiplication.
        fmul => FMul;
        /// Creates a float division.
        fdiv => FDiv;
        /// Creates a float remainder.
        frem => FRem;
    }

    /// Creates an integer comparison; the result is `bool`.
    ///
    /// # Panics
    ///
    /// Panics if the operands' types differ or are not integers or `bool`s.
    pub fn icmp(&mut self, order: ICmpOrder, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
        self.block?;

        let lhs_ty = self.val_ty(lhs);
        assert!(
            lhs_ty == self.val_ty(rhs),
            "`lhs` and `rhs` for 'icmp' must have the same type"
        );
        assert!(
            self.module.ty(lhs_ty).is_int_or_bool(),
            "'icmp' operands must be integers or booleans"
        );

        let bool_ty = self.bool_ty();
        self.emit(bool_ty, Inst::ICmp { order, lhs, rhs })
    }

    icmp_ctors! {
        icmp_eq => Eq;
        icmp_ne => Ne;
        icmp_ult => Ult;
        icmp_ugt => Ugt;
        icmp_ule => Ule;
        icmp_uge => Uge;
        icmp_slt => Slt;
        icmp_sgt => Sgt;
        icmp_sle => Sle;
        icmp_sge => Sge;
    }

    /// Creates a float comparison; the result is `bool`.
    ///
    /// # Panics
    ///
    /// Panics if the operands' types differ or are not floats.
    pub fn fcmp(&mut self, order: FCmpOrder, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
        self.block?;

        let lhs_ty = self.val_ty(lhs);
        assert!(
            lhs_ty == self.val_ty(rhs),
            "`lhs` and `rhs` for 'fcmp' must have the same type"
        );
        assert!(
            self.module.ty(lhs_ty).is_float(),
            "'fcmp' operands must be floating-point"
        );

        let bool_ty = self.bool_ty();
        self.emit(bool_ty, Inst::FCmp { order, lhs, rhs })
    }

    fcmp_ctors! {
        fcmp_ord => Ord;
        fcmp_uno => Uno;
        fcmp_oeq => Oeq;
        fcmp_one => One;
        fcmp_ogt => Ogt;
        fcmp_olt => Olt;
        fcmp_oge => Oge;
        fcmp_ole => Ole;
        fcmp_ueq => Ueq;
        fcmp_une => Une;
        fcmp_ugt => Ugt;
        fcmp_ult => Ult;
        fcmp_uge => Uge;
        fcmp_ule => Ule;
    }

    /// Creates a `sel`.
    ///
    /// # Panics
    ///
    /// Panics if `cond` is not a `bool` or the branches' types differ.
    pub fn sel(&mut self, cond: ValueId, if_true: ValueId, if_false: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(cond)).is_bool(),
            "'sel' condition must be boolean"
        );

        let ty = self.val_ty(if_true);
        assert!(
            ty == self.val_ty(if_false),
            "`lhs` and `rhs` for 'sel' must have the same type"
        );

        self.emit(
            ty,
            Inst::Sel {
                cond,
                if_true,
                if_false,
            },
        )
    }

    /// Creates an empty phi of type `ty`; add incoming pairs with
    /// [`phi_add_incoming`](Self::phi_add_incoming).
    pub fn phi(&mut self, ty: TyId) -> Option<ValueId> {
        self.emit(
            ty,
            Inst::Phi {
                incoming: PhiIncoming::new(),
            },
        )
    }

    /// Creates a phi with the given incoming pairs.
    ///
    /// # Panics
    ///
    /// Panics if any incoming value's type is not `ty`.
    pub fn phi_with_incoming(
        &mut self,
        ty: TyId,
        incoming: &[(BlockId, ValueId)],
    ) -> Option<ValueId> {
        let phi = self.phi(ty)?;

        for &(block, value) in incoming {
            self.phi_add_incoming(phi, block, value);
        }

        Some(phi)
    }

    /// Adds an incoming `(block, value)` pair to an existing phi; the list
    /// stays sorted regardless of insertion order.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not a phi or the value's type is not the phi's
    /// type.
    pub fn phi_add_incoming(&mut self, phi: ValueId, block: BlockId, value: ValueId) {
        self.module.add_phi_incoming(phi, block, value);
    }

    /// Creates an unconditional branch.
    pub fn br(&mut self, target: BlockId) -> Option<ValueId> {
        let void = self.void_ty();
        self.emit(void, Inst::Br { target })
    }

    /// Creates a conditional branch.
    ///
    /// # Panics
    ///
    /// Panics if `cond` is not a `bool`.
    pub fn cond_br(
        &mut self,
        cond: ValueId,
        true_target: BlockId,
        false_target: BlockId,
    ) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(cond)).is_bool(),
            "'cbr' condition must be boolean"
        );

        let void = self.void_ty();
        self.emit(
            void,
            Inst::CondBr {
                cond,
                true_target,
                false_target,
            },
        )
    }

    /// Creates a `ret` carrying a value.
    ///
    /// # Panics
    ///
    /// Panics if the value's type does not match the current function's
    /// return type.
    pub fn ret(&mut self, value: ValueId) -> Option<ValueId> {
        let block = self.block?;

        let func = self.module.block(block).parent();
        assert!(
            self.val_ty(value) == self.module.func(func).return_ty(),
            "'ret' value must match the function's return type"
        );

        let void = self.void_ty();
        self.emit(void, Inst::Ret { value: Some(value) })
    }

    /// Creates a `ret void`.
    ///
    /// # Panics
    ///
    /// Panics if the current function's return type is not `void`.
    pub fn ret_void(&mut self) -> Option<ValueId> {
        let block = self.block?;

        let func = self.module.block(block).parent();
        assert!(
            self.module
                .ty(self.module.func(func).return_ty())
                .is_void(),
            "cannot 'ret void' from a function with a non-void return type"
        );

        let void = self.void_ty();
        self.emit(void, Inst::Ret { value: None })
    }

    /// Creates an `unreachable`.
    pub fn unreachable(&mut self) -> Option<ValueId> {
        let void = self.void_ty();
        self.emit(void, Inst::Unreachable)
    }

    /// Creates an `alloca` for a single object of `ty`.
    pub fn alloca(&mut self, ty: TyId) -> Option<ValueId> {
        self.block?;

        let count = self.const_i64(1);
        self.alloca_n(ty, count)
    }

    /// Creates an `alloca` for `count` objects of `ty`.
    ///
    /// # Panics
    ///
    /// Panics if `count` is not an integer.
    pub fn alloca_n(&mut self, ty: TyId, count: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(count)).is_int(),
            "'alloca' object count must be an integer"
        );

        let ptr = self.ptr_ty();
        self.emit(
            ptr,
            Inst::Alloca {
                alloc_ty: ty,
                count,
            },
        )
    }

    /// Creates a `load` of a value of type `ty`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not a pointer.
    pub fn load(&mut self, ty: TyId, target: ValueId) -> Option<ValueId> {
        self.load_impl(ty, target, false)
    }

    /// Creates a `load volatile`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not a pointer.
    pub fn load_volatile(&mut self, ty: TyId, target: ValueId) -> Option<ValueId> {
        self.load_impl(ty, target, true)
    }

    fn load_impl(&mut self, ty: TyId, target: ValueId, volatile: bool) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(target)).is_ptr(),
            "cannot load from a non-'ptr' value"
        );

        self.emit(ty, Inst::Load { target, volatile })
    }

    /// Creates a `store`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not a pointer.
    pub fn store(&mut self, value: ValueId, target: ValueId) -> Option<ValueId> {
        self.store_impl(value, target, false)
    }

    /// Creates a `store volatile`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not a pointer.
    pub fn store_volatile(&mut self, value: ValueId, target: ValueId) -> Option<ValueId> {
        self.store_impl(value, target, true)
    }

    fn store_impl(&mut self, value: ValueId, target: ValueId, volatile: bool) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(target)).is_ptr(),
            "cannot store to a non-'ptr' value"
        );

        let void = self.void_ty();
        self.emit(
            void,
            Inst::Store {
                value,
                target,
                volatile,
            },
        )
    }

    /// Creates an `offset`: `base + index * sizeof(elem_ty)`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not a pointer or `index` is not an integer.
    pub fn offset(&mut self, elem_ty: TyId, base: ValueId, index: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(base)).is_ptr(),
            "'offset' first operand must be a pointer"
        );
        assert!(
            self.module.ty(self.val_ty(index)).is_int(),
            "'offset' second operand must be an integer"
        );

        let ptr = self.ptr_ty();
        self.emit(
            ptr,
            Inst::Offset {
                elem_ty,
                base,
                index,
            },
        )
    }

    // the element type an aggregate access selects, with the
    // struct-requires-constant-index and bounds rules applied
    fn aggregate_elem_ty(&self, agg_ty: TyId, index: ValueId, opcode: &str) -> TyId {
        assert!(
            self.module.ty(self.val_ty(index)).is_int(),
            "'{opcode}' index must be an integer"
        );

        let const_index = match self.module.value(index).as_constant() {
            Some(Constant::Int(v)) => Some(v.value()),
            _ => None,
        };

        match self.module.ty(agg_ty) {
            Type::Array { element, len } => {
                if let Some(i) = const_index {
                    assert!(i < *len, "'{opcode}' index must be within bounds");
                }

                *element
            }
            Type::Struct { fields } => {
                let i = const_index.unwrap_or_else(|| {
                    panic!("'{opcode}' index must be a constant integer when the aggregate is a structure")
                });
                assert!(
                    (i as usize) < fields.len(),
                    "'{opcode}' index must be within bounds"
                );

                fields[i as usize]
            }
            _ => panic!("'{opcode}' only operates on arrays or structures"),
        }
    }

    /// Creates an `elemptr`, a pointer to the selected element of an
    /// aggregate of type `agg_ty` behind `base`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not a pointer, `agg_ty` is not an aggregate, or
    /// the index violates the struct/bounds rules.
    pub fn elem_ptr(&mut self, agg_ty: TyId, base: ValueId, index: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(base)).is_ptr(),
            "'elemptr' first operand must be a pointer"
        );
        let _ = self.aggregate_elem_ty(agg_ty, index, "elemptr");

        let ptr = self.ptr_ty();
        self.emit(
            ptr,
            Inst::ElemPtr {
                agg_ty,
                base,
                index,
            },
        )
    }

    /// Creates an `extract` of the selected element of an aggregate value.
    ///
    /// # Panics
    ///
    /// Panics if `agg` is not of aggregate type or the index violates the
    /// struct/bounds rules.
    pub fn extract(&mut self, agg: ValueId, index: ValueId) -> Option<ValueId> {
        self.block?;

        let elem_ty = self.aggregate_elem_ty(self.val_ty(agg), index, "extract");
        self.emit(elem_ty, Inst::Extract { agg, index })
    }

    /// Creates an `insert`, a copy of `agg` with the selected element
    /// replaced by `value`.
    ///
    /// # Panics
    ///
    /// Panics if `agg` is not of aggregate type, the index violates the
    /// struct/bounds rules, or `value` does not have the selected element's
    /// type.
    pub fn insert(&mut self, agg: ValueId, index: ValueId, value: ValueId) -> Option<ValueId> {
        self.block?;

        let agg_ty = self.val_ty(agg);
        let elem_ty = self.aggregate_elem_ty(agg_ty, index, "insert");
        assert!(
            self.val_ty(value) == elem_ty,
            "'insert' value must have the selected element's type"
        );

        self.emit(agg_ty, Inst::Insert { agg, index, value })
    }

    fn conv(&mut self, op: ConvOp, into: TyId, from: ValueId) -> Option<ValueId> {
        self.emit(into, Inst::Conv { op, from })
    }

    /// Creates a `sext` to a strictly wider integer type.
    ///
    /// # Panics
    ///
    /// Panics unless both types are integers and the width strictly grows.
    pub fn sext(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;
        self.check_widening("sext", into, from);
        self.conv(ConvOp::Sext, into, from)
    }

    /// Creates a `zext` to a strictly wider integer type.
    ///
    /// # Panics
    ///
    /// Panics unless both types are integers and the width strictly grows.
    pub fn zext(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;
        self.check_widening("zext", into, from);
        self.conv(ConvOp::Zext, into, from)
    }

    fn check_widening(&self, opcode: &str, into: TyId, from: ValueId) {
        let into_width = self
            .module
            .ty(into)
            .int_width()
            .unwrap_or_else(|| panic!("'{opcode}' result type must be integral"));
        let from_width = self
            .module
            .ty(self.val_ty(from))
            .int_width()
            .unwrap_or_else(|| panic!("'{opcode}' operand must be an integer"));

        assert!(
            from_width < into_width,
            "'{opcode}' must increase width, cannot shrink or leave the same"
        );
    }

    /// Creates a `trunc` to another integer type.
    ///
    /// # Panics
    ///
    /// Panics unless both types are integers.
    pub fn trunc(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(into).is_int(),
            "'trunc' result type must be integral"
        );
        assert!(
            self.module.ty(self.val_ty(from)).is_int(),
            "'trunc' operand must be an integer"
        );

        self.conv(ConvOp::Trunc, into, from)
    }

    /// Creates an `itob`.
    ///
    /// # Panics
    ///
    /// Panics unless the operand is an integer.
    pub fn itob(&mut self, from: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(from)).is_int(),
            "'itob' operand must be an integer"
        );

        let bool_ty = self.bool_ty();
        self.conv(ConvOp::IToB, bool_ty, from)
    }

    /// Creates a `btoi`.
    ///
    /// # Panics
    ///
    /// Panics unless the result type is an integer and the operand a `bool`.
    pub fn btoi(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(into).is_int(),
            "'btoi' result type must be an integer"
        );
        assert!(
            self.module.ty(self.val_ty(from)).is_bool(),
            "'btoi' operand must be a boolean"
        );

        self.conv(ConvOp::BToI, into, from)
    }

    /// Creates an `itop`.
    ///
    /// # Panics
    ///
    /// Panics unless the operand is an integer.
    pub fn itop(&mut self, from: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(self.val_ty(from)).is_int(),
            "'itop' operand must be an integer"
        );

        let ptr = self.ptr_ty();
        self.conv(ConvOp::IToP, ptr, from)
    }

    /// Creates a `ptoi`.
    ///
    /// # Panics
    ///
    /// Panics unless the result type is an integer and the operand a
    /// pointer.
    pub fn ptoi(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;

        assert!(
            self.module.ty(into).is_int(),
            "'ptoi' result type must be integral"
        );
        assert!(
            self.module.ty(self.val_ty(from)).is_ptr(),
            "'ptoi' operand must be a pointer"
        );

        self.conv(ConvOp::PToI, into, from)
    }

    /// Creates a `sitof`.
    ///
    /// # Panics
    ///
    /// Panics unless the result type is a float and the operand an integer.
    pub fn sitof(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;
        self.check_int_to_float("sitof", into, from);
        self.conv(ConvOp::SIToF, into, from)
    }

    /// Creates a `uitof`.
    ///
    /// # Panics
    ///
    /// Panics unless the result type is a float and the operand an integer.
    pub fn uitof(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;
        self.check_int_to_float("uitof", into, from);
        self.conv(ConvOp::UIToF, into, from)
    }

    fn check_int_to_float(&self, opcode: &str, into: TyId, from: ValueId) {
        assert!(
            self.module.ty(into).is_float(),
            "'{opcode}' type must be a floating-point type"
        );
        assert!(
            self.module.ty(self.val_ty(from)).is_int(),
            "'{opcode}' operand must be an integer"
        );
    }

    /// Creates an `ftosi`.
    ///
    /// # Panics
    ///
    /// Panics unless the result type is an integer and the operand a float.
    pub fn ftosi(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;
        self.check_float_to_int("ftosi", into, from);
        self.conv(ConvOp::FToSI, into, from)
    }

    /// Creates an `ftoui`.
    ///
    /// # Panics
    ///
    /// Panics unless the result type is an integer and the operand a float.
    pub fn ftoui(&mut self, into: TyId, from: ValueId) -> Option<ValueId> {
        self.block?;
        self.check_float_to_int("ftoui", into, from);
        self.conv(ConvOp::FToUI, into, from)
    }

    fn check_float_to_int(&self, opcode: &str, into: TyId, from: ValueId) {
        assert!(
            self.module.ty(into).is_int(),
            "'{opcode}' result type must be an integer"
        );
        assert!(
            self.module.ty(self.val_ty(from)).is_float(),
            "'{opcode}' operand must be a float"
        );
    }

    /// Creates a `call`.
    ///
    /// # Panics
    ///
    /// Panics if the arity or any per-position argument type disagrees with
    /// the target's signature.
    pub fn call(&mut self, target: FuncId, args: &[ValueId]) -> Option<ValueId> {
        self.block?;

        let target_args = self.module.func(target).args();
        assert!(
            target_args.len() == args.len(),
            "must have the right number of arguments for call"
        );

        for (i, (&arg, &param)) in args.iter().zip(target_args).enumerate() {
            assert!(
                self.val_ty(arg) == self.module.value(param).ty(),
                "call argument {i} must have the parameter's type"
            );
        }

        let ret_ty = self.module.func(target).return_ty();
        self.emit(
            ret_ty,
            Inst::Call {
                target,
                args: args.iter().copied().collect(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn with_entry(module: &mut Module) -> Builder<'_> {
        let mut b = Builder::new(module);
        let void = b.void_ty();
        let f = b.create_func("main", void, &[]);
        let entry = b.create_block_in(f);
        b.set_insert_point(entry);
        b
    }

    #[test]
    fn no_insert_point_returns_none() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);

        let one = b.const_i32(1);
        let two = b.const_i32(2);
        assert_eq!(b.iadd(one, two), None);
    }

    #[test]
    fn instructions_append_to_the_current_block() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let one = b.const_i32(1);
        let two = b.const_i32(2);
        let sum = b.iadd(one, two).unwrap();
        b.ret_void().unwrap();

        let entry = b.current_block().unwrap();
        let insts = module.block(entry).insts();
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0], sum);
    }

    #[test]
    fn phis_ignore_insertion_order() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let bb1 = b.create_block();
        let bb2 = b.create_block();

        let three = b.const_i64(3);
        let one = b.const_i64(1);

        let i64_ty = b.i64_ty();
        let phi1 = b.phi_with_incoming(i64_ty, &[(bb1, three), (bb2, one)]).unwrap();
        let phi2 = b.phi_with_incoming(i64_ty, &[(bb2, one), (bb1, three)]).unwrap();

        let v1 = module.value(phi1);
        let v2 = module.value(phi2);
        assert_eq!(v1, v2);

        let hash = |v: &crate::value::Value| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(v1), hash(v2));
    }

    #[test]
    #[should_panic(expected = "must have the same type")]
    fn binary_type_mismatch_panics() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let one = b.const_i32(1);
        let two = b.const_i64(2);
        b.iadd(one, two);
    }

    #[test]
    #[should_panic(expected = "'iadd' operands must be integral")]
    fn integer_op_rejects_floats() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let x = b.const_f32(1.0);
        let y = b.const_f32(2.0);
        b.iadd(x, y);
    }

    #[test]
    #[should_panic(expected = "must increase width")]
    fn sext_must_widen() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let x = b.const_i32(5);
        let i32_ty = b.i32_ty();
        b.sext(i32_ty, x);
    }

    #[test]
    #[should_panic(expected = "must increase width")]
    fn zext_rejects_narrowing() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let x = b.const_i64(5);
        let i16_ty = b.i16_ty();
        b.zext(i16_ty, x);
    }

    #[test]
    #[should_panic(expected = "right number of arguments")]
    fn call_arity_mismatch_panics() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let i32_ty = b.i32_ty();
        let void = b.void_ty();
        let callee = b.create_func("callee", void, &[i32_ty]);
        b.call(callee, &[]);
    }

    #[test]
    #[should_panic(expected = "parameter's type")]
    fn call_argument_type_mismatch_panics() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let i32_ty = b.i32_ty();
        let void = b.void_ty();
        let callee = b.create_func("callee", void, &[i32_ty]);
        let bad = b.const_i64(1);
        b.call(callee, &[bad]);
    }

    #[test]
    #[should_panic(expected = "constant integer when the aggregate is a structure")]
    fn struct_extract_requires_constant_index() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let i32_ty = b.i32_ty();
        let one = b.const_i32(1);
        let two = b.const_i32(2);
        let agg = b.const_struct(&[one, two]);

        let i64_ty = b.i64_ty();
        let st = b.struct_ty(&[i32_ty, i32_ty]);
        let slot = b.alloca(st).unwrap();
        let dynamic = b.load(i64_ty, slot).unwrap();

        b.extract(agg, dynamic);
    }

    #[test]
    #[should_panic(expected = "within bounds")]
    fn struct_index_out_of_bounds_panics() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let one = b.const_i32(1);
        let agg = b.const_struct(&[one]);
        let index = b.const_i64(3);
        b.extract(agg, index);
    }

    #[test]
    fn extract_selects_the_element_type() {
        let mut module = Module::new();
        let mut b = with_entry(&mut module);

        let one = b.const_i32(1);
        let truth = b.const_true();
        let agg = b.const_struct(&[one, truth]);
        let index = b.const_i64(1);

        let extracted = b.extract(agg, index).unwrap();
        assert_eq!(module.value(extracted).ty(), module.bool_ty());
    }

    #[test]
    fn use_counts_scan_the_store() {
        let mut module = Module::new();
        let i32_ty = module.i32_ty();

        let mut b = Builder::new(&mut module);
        let f = b.create_func("f", i32_ty, &[i32_ty]);
        let arg = b.module().func(f).args()[0];
        let entry = b.create_block_in(f);
        b.set_insert_point(entry);

        let add1 = b.iadd(arg, arg).unwrap();
        let add2 = b.iadd(arg, add1).unwrap();
        let ret = b.ret(add2).unwrap();

        assert_eq!(module.use_count(arg), 3);

        let counts = module.use_count_of_every_instruction();
        assert_eq!(counts.get(&add1), Some(&1));
        assert_eq!(counts.get(&add2), Some(&1));
        assert_eq!(counts.get(&ret), None);

        module.inst_mut(add2).replace_operand_with(arg, add1);
        assert_eq!(module.use_count(arg), 2);
        assert_eq!(module.use_count(add1), 2);
    }
}
