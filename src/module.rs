//! The containers: basic blocks, functions, and the module that owns
//! everything.
//!
//! A [`Module`] is one ownership tree. It holds the arenas for types,
//! values, blocks, and functions; every cross-reference in the IR is an id
//! into those arenas, and dropping the module releases the lot at once.
//! Blocks and functions never own their instructions, they only order them.

use crate::inst::Inst;
use crate::ty::{ApInt, FloatWidth, IntWidth, TyId, Type, TypeInterner};
use crate::value::{Constant, FloatBits, StrId, StringPool, Value, ValueData, ValueId};
use id_arena::{Arena, Id};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// An identifier for a [`Block`] owned by a module.
pub type BlockId = Id<Block>;

/// An identifier for a [`Function`] owned by a module.
pub type FuncId = Id<Function>;

/// An ordered sequence of instructions inside one function.
///
/// The last instruction of a non-empty block must be a terminator before any
/// control-flow analysis runs, but insertion itself never checks that; bulk
/// construction is legal.
#[derive(Debug)]
pub struct Block {
    parent: FuncId,
    name: Option<StrId>,
    insts: SmallVec<[ValueId; 5]>,
}

impl Block {
    pub(crate) fn new(parent: FuncId, name: Option<StrId>) -> Self {
        Block {
            parent,
            name,
            insts: SmallVec::new(),
        }
    }

    /// The function this block belongs to.
    #[inline]
    pub fn parent(&self) -> FuncId {
        self.parent
    }

    pub(crate) fn name_id(&self) -> Option<StrId> {
        self.name
    }

    pub(crate) fn set_name_id(&mut self, name: StrId) {
        self.name = Some(name);
    }

    /// The instructions of this block, in order.
    #[inline]
    pub fn insts(&self) -> &[ValueId] {
        &self.insts
    }

    /// Whether this block has no instructions yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Appends an instruction at the end of the block.
    pub fn append(&mut self, inst: ValueId) {
        self.insts.push(inst);
    }

    /// Inserts an instruction at the front of the block.
    pub fn prepend(&mut self, inst: ValueId) {
        self.insts.insert(0, inst);
    }

    /// Inserts `inst` immediately before `before`.
    ///
    /// # Panics
    ///
    /// Panics if `before` is not in this block.
    pub fn insert_before(&mut self, before: ValueId, inst: ValueId) {
        let pos = self
            .insts
            .iter()
            .position(|&v| v == before)
            .expect("cannot insert before an instruction that is not in this block");
        self.insts.insert(pos, inst);
    }

    /// Inserts `inst` immediately after `after`.
    ///
    /// # Panics
    ///
    /// Panics if `after` is not in this block.
    pub fn insert_after(&mut self, after: ValueId, inst: ValueId) {
        let pos = self
            .insts
            .iter()
            .position(|&v| v == after)
            .expect("cannot insert after an instruction that is not in this block");
        self.insts.insert(pos + 1, inst);
    }
}

/// A function: a name, a return type, arguments, and an ordered block list.
///
/// A function with no blocks is *opaque*, a declaration of something defined
/// elsewhere. The first block of a non-opaque function is its entry.
#[derive(Debug)]
pub struct Function {
    name: String,
    return_ty: TyId,
    args: SmallVec<[ValueId; 2]>,
    blocks: SmallVec<[BlockId; 4]>,
}

impl Function {
    pub(crate) fn new(name: String, return_ty: TyId, args: SmallVec<[ValueId; 2]>) -> Self {
        Function {
            name,
            return_ty,
            args,
            blocks: SmallVec::new(),
        }
    }

    /// The function's name, without the `@` sigil.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The function's return type.
    #[inline]
    pub fn return_ty(&self) -> TyId {
        self.return_ty
    }

    /// The argument values, in signature order.
    #[inline]
    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    /// The blocks, in insertion order.
    #[inline]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// The entry block, if the function has a body.
    #[inline]
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    /// Whether this function is a bodyless declaration.
    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.blocks.is_empty()
    }

    pub(crate) fn add_block(&mut self, block: BlockId) {
        self.blocks.push(block);
    }

    pub(crate) fn set_block_order(&mut self, order: SmallVec<[BlockId; 4]>) {
        debug_assert!(order.len() == self.blocks.len());
        self.blocks = order;
    }
}

/// Ownership accounting for instructions, and whole-module use-count
/// queries.
///
/// Use counts are computed by scanning every owned instruction; no
/// incremental use lists are maintained.
#[derive(Debug, Default)]
struct InstructionStore {
    insts: FxHashSet<ValueId>,
}

impl InstructionStore {
    fn insert(&mut self, inst: ValueId) {
        self.insts.insert(inst);
    }

    fn remove(&mut self, inst: ValueId) {
        assert!(
            self.insts.remove(&inst),
            "cannot remove an instruction the module does not own"
        );
    }
}

/// The root container of the IR.
///
/// Move-only: a module can be handed around by value but never copied, and
/// everything reachable from it dies with it.
#[derive(Debug)]
pub struct Module {
    types: TypeInterner,
    values: Arena<Value>,
    blocks: Arena<Block>,
    funcs: Arena<Function>,
    func_names: FxHashMap<String, FuncId>,
    constants: FxHashMap<(TyId, Constant), ValueId>,
    strings: StringPool,
    store: InstructionStore,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    /// Creates an empty module.
    pub fn new() -> Self {
        Module {
            types: TypeInterner::new(),
            values: Arena::new(),
            blocks: Arena::new(),
            funcs: Arena::new(),
            func_names: FxHashMap::default(),
            constants: FxHashMap::default(),
            strings: StringPool::default(),
            store: InstructionStore::default(),
        }
    }

    // ---- types ----

    /// The `i8` type.
    #[inline]
    pub fn i8_ty(&self) -> TyId {
        self.types.predefined().i8
    }

    /// The `i16` type.
    #[inline]
    pub fn i16_ty(&self) -> TyId {
        self.types.predefined().i16
    }

    /// The `i32` type.
    #[inline]
    pub fn i32_ty(&self) -> TyId {
        self.types.predefined().i32
    }

    /// The `i64` type.
    #[inline]
    pub fn i64_ty(&self) -> TyId {
        self.types.predefined().i64
    }

    /// The `bool` type.
    #[inline]
    pub fn bool_ty(&self) -> TyId {
        self.types.predefined().boolean
    }

    /// The `ptr` type.
    #[inline]
    pub fn ptr_ty(&self) -> TyId {
        self.types.predefined().ptr
    }

    /// The `f32` type.
    #[inline]
    pub fn f32_ty(&self) -> TyId {
        self.types.predefined().f32
    }

    /// The `f64` type.
    #[inline]
    pub fn f64_ty(&self) -> TyId {
        self.types.predefined().f64
    }

    /// The `void` type.
    #[inline]
    pub fn void_ty(&self) -> TyId {
        self.types.predefined().void
    }

    /// The `{ }` type.
    #[inline]
    pub fn empty_struct_ty(&self) -> TyId {
        self.types.predefined().empty_struct
    }

    /// The integer type of the given width.
    #[inline]
    pub fn int_ty(&self, width: IntWidth) -> TyId {
        self.types.int_of_width(width)
    }

    /// The float type of the given width.
    #[inline]
    pub fn float_ty(&self, width: FloatWidth) -> TyId {
        self.types.float_of_width(width)
    }

    /// The array type `[element; len]`.
    pub fn array_ty(&mut self, element: TyId, len: u64) -> TyId {
        self.types.intern(Type::Array { element, len })
    }

    /// The struct type with the given fields.
    pub fn struct_ty(&mut self, fields: &[TyId]) -> TyId {
        self.types.intern(Type::Struct {
            fields: fields.to_vec(),
        })
    }

    /// Resolves a type id.
    #[inline]
    pub fn ty(&self, ty: TyId) -> &Type {
        self.types.get(ty)
    }

    // ---- values ----

    /// Resolves a value id.
    #[inline]
    pub fn value(&self, value: ValueId) -> &Value {
        &self.values[value]
    }

    /// The instruction named by `value`.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not an instruction.
    pub fn inst(&self, value: ValueId) -> &Inst {
        self.values[value]
            .as_inst()
            .expect("value is not an instruction")
    }

    /// Mutable access to the instruction named by `value`, for operand and
    /// branch-target surgery.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not an instruction.
    pub fn inst_mut(&mut self, value: ValueId) -> &mut Inst {
        match self.values[value].data_mut() {
            ValueData::Inst(inst) => inst,
            _ => panic!("value is not an instruction"),
        }
    }

    /// Adds an incoming `(block, value)` pair to the phi named by `phi`.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not a phi, or if the incoming value's type is not
    /// the phi's type.
    pub fn add_phi_incoming(&mut self, phi: ValueId, block: BlockId, value: ValueId) {
        assert!(
            self.values[value].ty() == self.values[phi].ty(),
            "phi incoming values must have the phi's type"
        );

        self.inst_mut(phi).add_incoming(block, value);
    }

    pub(crate) fn alloc_inst(&mut self, ty: TyId, inst: Inst) -> ValueId {
        let id = self.values.alloc(Value::new(ty, ValueData::Inst(inst)));
        self.store.insert(id);
        id
    }

    /// Removes an instruction from the module's ownership accounting. Any
    /// block list still mentioning it must be updated separately.
    ///
    /// # Panics
    ///
    /// Panics if the module does not own `inst`.
    pub fn remove_inst(&mut self, inst: ValueId) {
        self.store.remove(inst);
    }

    /// How many operand occurrences of `value` exist across every
    /// instruction the module owns.
    pub fn use_count(&self, value: ValueId) -> usize {
        self.store
            .insts
            .iter()
            .map(|&inst| self.inst(inst).use_count(value))
            .sum()
    }

    /// For every owned instruction that is used at least once, how many
    /// operand occurrences of it exist across the module.
    pub fn use_count_of_every_instruction(&self) -> FxHashMap<ValueId, usize> {
        let mut counts = FxHashMap::default();

        for &user in self.store.insts.iter() {
            for operand in self.inst(user).operands() {
                if self.values[operand].is_inst() {
                    *counts.entry(operand).or_insert(0) += 1;
                }
            }
        }

        counts
    }

    // ---- constants ----

    fn intern_constant(&mut self, ty: TyId, constant: Constant) -> ValueId {
        if let Some(&id) = self.constants.get(&(ty, constant.clone())) {
            return id;
        }

        let id = self
            .values
            .alloc(Value::new(ty, ValueData::Constant(constant.clone())));
        self.constants.insert((ty, constant), id);
        id
    }

    /// The integer constant for `value`, typed by its width.
    pub fn const_int(&mut self, value: ApInt) -> ValueId {
        let ty = self.types.int_of_width(value.width());
        self.intern_constant(ty, Constant::Int(value))
    }

    /// The boolean constant `value`.
    pub fn const_bool(&mut self, value: bool) -> ValueId {
        let ty = self.bool_ty();
        self.intern_constant(ty, Constant::Bool(value))
    }

    /// The floating-point constant `value` of type `ty`.
    ///
    /// An `f32`-typed constant is rounded to `f32` precision on creation, so
    /// every stored `f32` constant holds an exactly representable value.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is not a float type.
    pub fn const_float(&mut self, ty: TyId, value: f64) -> ValueId {
        let value = match self.ty(ty) {
            Type::Float(FloatWidth::W32) => value as f32 as f64,
            Type::Float(FloatWidth::W64) => value,
            _ => panic!("float constants must have a float type"),
        };

        self.intern_constant(ty, Constant::Float(FloatBits::from_f64(value)))
    }

    /// The null pointer constant.
    pub fn const_null(&mut self) -> ValueId {
        let ty = self.ptr_ty();
        self.intern_constant(ty, Constant::Null)
    }

    /// The undefined constant of type `ty`.
    pub fn const_undef(&mut self, ty: TyId) -> ValueId {
        self.intern_constant(ty, Constant::Undef)
    }

    /// The array constant holding `elements`.
    ///
    /// # Panics
    ///
    /// Panics if `elements` is empty, if any element is not a constant, or
    /// if the elements do not share one type.
    pub fn const_array(&mut self, elements: &[ValueId]) -> ValueId {
        assert!(!elements.is_empty(), "array constants cannot be empty");

        let elem_ty = self.values[elements[0]].ty();

        for &e in elements {
            assert!(
                self.values[e].is_constant(),
                "array constant elements must be constants"
            );
            assert!(
                self.values[e].ty() == elem_ty,
                "array constant elements must all have the same type"
            );
        }

        let ty = self.array_ty(elem_ty, elements.len() as u64);
        self.intern_constant(ty, Constant::Array(elements.to_vec()))
    }

    /// The struct constant holding `fields`; its type is the struct of the
    /// field types in order.
    ///
    /// # Panics
    ///
    /// Panics if any field is not a constant.
    pub fn const_struct(&mut self, fields: &[ValueId]) -> ValueId {
        for &f in fields {
            assert!(
                self.values[f].is_constant(),
                "struct constant fields must be constants"
            );
        }

        let field_tys: Vec<TyId> = fields.iter().map(|&f| self.values[f].ty()).collect();
        let ty = self.struct_ty(&field_tys);
        self.intern_constant(ty, Constant::Struct(fields.to_vec()))
    }

    /// The string constant holding `bytes`, of type `[i8; len]`.
    ///
    /// The per-byte `i8` constants are materialized in the pool too, so
    /// uniform array-style access to the string sees interned elements.
    pub fn const_string(&mut self, bytes: &[u8]) -> ValueId {
        for &b in bytes {
            let byte = ApInt::new(b as u64, IntWidth::W8);
            self.const_int(byte);
        }

        let i8_ty = self.i8_ty();
        let ty = self.array_ty(i8_ty, bytes.len() as u64);
        self.intern_constant(ty, Constant::String(bytes.into()))
    }

    // ---- blocks ----

    /// Resolves a block id.
    #[inline]
    pub fn block(&self, block: BlockId) -> &Block {
        &self.blocks[block]
    }

    /// Mutable access to a block's instruction list.
    #[inline]
    pub fn block_mut(&mut self, block: BlockId) -> &mut Block {
        &mut self.blocks[block]
    }

    /// The block's declared name, if it has one.
    pub fn block_name(&self, block: BlockId) -> Option<&str> {
        self.blocks[block].name_id().map(|id| self.strings.get(id))
    }

    /// Declares (or replaces) the block's name.
    pub fn set_block_name(&mut self, block: BlockId, name: &str) {
        let id = self.strings.intern(name);
        self.blocks[block].set_name_id(id);
    }

    /// Appends a fresh, empty block to `func`.
    pub fn append_block(&mut self, func: FuncId, name: Option<&str>) -> BlockId {
        let name = name.map(|n| self.strings.intern(n));
        let block = self.blocks.alloc(Block::new(func, name));
        self.funcs[func].add_block(block);
        block
    }

    // the parser creates blocks lazily at first reference but must leave
    // them in textual definition order, or printing would not be idempotent
    pub(crate) fn set_block_order(&mut self, func: FuncId, order: &[BlockId]) {
        self.funcs[func].set_block_order(order.iter().copied().collect());
    }

    /// The terminator of `block`.
    ///
    /// # Panics
    ///
    /// Panics if the block is empty or its last instruction is not a
    /// terminator.
    pub fn terminator_of(&self, block: BlockId) -> ValueId {
        let last = *self.blocks[block]
            .insts()
            .last()
            .expect("an empty block has no terminator");

        assert!(
            self.inst(last).is_terminator(),
            "the last instruction in a basic block must be a terminator"
        );

        last
    }

    // ---- functions ----

    /// Resolves a function id.
    #[inline]
    pub fn func(&self, func: FuncId) -> &Function {
        &self.funcs[func]
    }

    /// Iterates every function in insertion order.
    pub fn funcs(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.funcs.iter()
    }

    /// Looks a function up by name.
    pub fn find_func(&self, name: &str) -> Option<FuncId> {
        self.func_names.get(name).copied()
    }

    /// Creates a function with fresh argument values.
    ///
    /// # Panics
    ///
    /// Panics if a function named `name` already exists.
    pub fn create_func(&mut self, name: &str, return_ty: TyId, arg_tys: &[TyId]) -> FuncId {
        assert!(
            !self.func_names.contains_key(name),
            "a function named '@{name}' already exists"
        );

        let args = arg_tys
            .iter()
            .enumerate()
            .map(|(index, &ty)| self.values.alloc(Value::new(ty, ValueData::Argument { index })))
            .collect();

        let id = self
            .funcs
            .alloc(Function::new(name.to_string(), return_ty, args));
        self.func_names.insert(name.to_string(), id);
        id
    }

    /// Finds the function named `name`, creating it if absent.
    ///
    /// # Panics
    ///
    /// Panics if the function exists with a different signature.
    pub fn find_or_create_func(&mut self, name: &str, return_ty: TyId, arg_tys: &[TyId]) -> FuncId {
        if let Some(id) = self.find_func(name) {
            let existing = &self.funcs[id];

            assert!(
                existing.return_ty() == return_ty,
                "function '@{name}' already exists with a different return type"
            );
            assert!(
                existing.args().len() == arg_tys.len()
                    && existing
                        .args()
                        .iter()
                        .zip(arg_tys)
                        .all(|(&arg, &ty)| self.values[arg].ty() == ty),
                "function '@{name}' already exists with different argument types"
            );

            return id;
        }

        self.create_func(name, return_ty, arg_tys)
    }
}

/// Checks that two modules are *equivalent*, not bitwise identical.
///
/// Functions are compared pairwise in insertion order and the comparison
/// cascades structurally through signatures, blocks, and instructions.
/// Arguments correspond by position, instruction results by definition
/// ordinal, blocks by position, and constants by recursive structure, so the
/// result is independent of the arena ids either module happened to assign.
/// Block names are presentation data and do not participate.
pub fn deep_equals(a: &Module, b: &Module) -> bool {
    let a_fns: Vec<FuncId> = a.funcs().map(|(id, _)| id).collect();
    let b_fns: Vec<FuncId> = b.funcs().map(|(id, _)| id).collect();

    a_fns.len() == b_fns.len()
        && a_fns
            .iter()
            .zip(&b_fns)
            .all(|(&fa, &fb)| func_deep_equals(a, fa, b, fb))
}

fn ty_deep_equals(a: &Module, at: TyId, b: &Module, bt: TyId) -> bool {
    match (a.ty(at), b.ty(bt)) {
        (Type::Int(x), Type::Int(y)) => x == y,
        (Type::Float(x), Type::Float(y)) => x == y,
        (Type::Bool, Type::Bool) | (Type::Ptr, Type::Ptr) | (Type::Void, Type::Void) => true,
        (
            Type::Array {
                element: e1,
                len: l1,
            },
            Type::Array {
                element: e2,
                len: l2,
            },
        ) => l1 == l2 && ty_deep_equals(a, *e1, b, *e2),
        (Type::Struct { fields: f1 }, Type::Struct { fields: f2 }) => {
            f1.len() == f2.len()
                && f1
                    .iter()
                    .zip(f2)
                    .all(|(&x, &y)| ty_deep_equals(a, x, b, y))
        }
        _ => false,
    }
}

fn const_deep_equals(a: &Module, av: ValueId, b: &Module, bv: ValueId) -> bool {
    if !ty_deep_equals(a, a.value(av).ty(), b, b.value(bv).ty()) {
        return false;
    }

    match (a.value(av).as_constant(), b.value(bv).as_constant()) {
        (Some(Constant::Int(x)), Some(Constant::Int(y))) => x == y,
        (Some(Constant::Bool(x)), Some(Constant::Bool(y))) => x == y,
        (Some(Constant::Float(x)), Some(Constant::Float(y))) => x == y,
        (Some(Constant::Null), Some(Constant::Null))
        | (Some(Constant::Undef), Some(Constant::Undef)) => true,
        (Some(Constant::Array(x)), Some(Constant::Array(y)))
        | (Some(Constant::Struct(x)), Some(Constant::Struct(y))) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|(&e1, &e2)| const_deep_equals(a, e1, b, e2))
        }
        (Some(Constant::String(x)), Some(Constant::String(y))) => x == y,
        _ => false,
    }
}

struct FuncCmp<'m> {
    a: &'m Module,
    b: &'m Module,
    a_defs: FxHashMap<ValueId, usize>,
    b_defs: FxHashMap<ValueId, usize>,
    a_blocks: FxHashMap<BlockId, usize>,
    b_blocks: FxHashMap<BlockId, usize>,
}

impl<'m> FuncCmp<'m> {
    fn operand_eq(&self, av: ValueId, bv: ValueId) -> bool {
        let ac = self.a.value(av).is_constant();
        let bc = self.b.value(bv).is_constant();

        match (ac, bc) {
            (true, true) => const_deep_equals(self.a, av, self.b, bv),
            (false, false) => match (self.a_defs.get(&av), self.b_defs.get(&bv)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            _ => false,
        }
    }

    fn block_eq(&self, ab: BlockId, bb: BlockId) -> bool {
        match (self.a_blocks.get(&ab), self.b_blocks.get(&bb)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn phi_incoming_eq(&self, ai: &[(BlockId, ValueId)], bi: &[(BlockId, ValueId)]) -> bool {
        if ai.len() != bi.len() {
            return false;
        }

        // the two lists are sorted by their own modules' ids, which need not
        // induce the same order, so match as a multiset
        let mut used = vec![false; bi.len()];

        'outer: for &(ab, av) in ai {
            for (j, &(bb, bv)) in bi.iter().enumerate() {
                if !used[j] && self.block_eq(ab, bb) && self.operand_eq(av, bv) {
                    used[j] = true;
                    continue 'outer;
                }
            }

            return false;
        }

        true
    }

    fn inst_eq(&self, av: ValueId, bv: ValueId) -> bool {
        if !ty_deep_equals(self.a, self.a.value(av).ty(), self.b, self.b.value(bv).ty()) {
            return false;
        }

        match (self.a.inst(av), self.b.inst(bv)) {
            (Inst::Br { target: t1 }, Inst::Br { target: t2 }) => self.block_eq(*t1, *t2),
            (
                Inst::CondBr {
                    cond: c1,
                    true_target: t1,
                    false_target: f1,
                },
                Inst::CondBr {
                    cond: c2,
                    true_target: t2,
                    false_target: f2,
                },
            ) => self.operand_eq(*c1, *c2) && self.block_eq(*t1, *t2) && self.block_eq(*f1, *f2),
            (Inst::Ret { value: v1 }, Inst::Ret { value: v2 }) => match (v1, v2) {
                (None, None) => true,
                (Some(x), Some(y)) => self.operand_eq(*x, *y),
                _ => false,
            },
            (Inst::Unreachable, Inst::Unreachable) => true,
            (
                Inst::ICmp {
                    order: o1,
                    lhs: l1,
                    rhs: r1,
                },
                Inst::ICmp {
                    order: o2,
                    lhs: l2,
                    rhs: r2,
                },
            ) => o1 == o2 && self.operand_eq(*l1, *l2) && self.operand_eq(*r1, *r2),
            (
                Inst::FCmp {
                    order: o1,
                    lhs: l1,
                    rhs: r1,
                },
                Inst::FCmp {
                    order: o2,
                    lhs: l2,
                    rhs: r2,
                },
            ) => o1 == o2 && self.operand_eq(*l1, *l2) && self.operand_eq(*r1, *r2),
            (
                Inst::Sel {
                    cond: c1,
                    if_true: t1,
                    if_false: f1,
                },
                Inst::Sel {
                    cond: c2,
                    if_true: t2,
                    if_false: f2,
                },
            ) => {
                self.operand_eq(*c1, *c2)
                    && self.operand_eq(*t1, *t2)
                    && self.operand_eq(*f1, *f2)
            }
            (Inst::Phi { incoming: i1 }, Inst::Phi { incoming: i2 }) => {
                self.phi_incoming_eq(i1, i2)
            }
            (
                Inst::Binary {
                    op: o1,
                    lhs: l1,
                    rhs: r1,
                },
                Inst::Binary {
                    op: o2,
                    lhs: l2,
                    rhs: r2,
                },
            ) => o1 == o2 && self.operand_eq(*l1, *l2) && self.operand_eq(*r1, *r2),
            (Inst::Conv { op: o1, from: f1 }, Inst::Conv { op: o2, from: f2 }) => {
                o1 == o2 && self.operand_eq(*f1, *f2)
            }
            (
                Inst::Alloca {
                    alloc_ty: t1,
                    count: c1,
                },
                Inst::Alloca {
                    alloc_ty: t2,
                    count: c2,
                },
            ) => ty_deep_equals(self.a, *t1, self.b, *t2) && self.operand_eq(*c1, *c2),
            (
                Inst::Load {
                    target: t1,
                    volatile: v1,
                },
                Inst::Load {
                    target: t2,
                    volatile: v2,
                },
            ) => v1 == v2 && self.operand_eq(*t1, *t2),
            (
                Inst::Store {
                    value: x1,
                    target: t1,
                    volatile: v1,
                },
                Inst::Store {
                    value: x2,
                    target: t2,
                    volatile: v2,
                },
            ) => v1 == v2 && self.operand_eq(*x1, *x2) && self.operand_eq(*t1, *t2),
            (
                Inst::Offset {
                    elem_ty: t1,
                    base: b1,
                    index: i1,
                },
                Inst::Offset {
                    elem_ty: t2,
                    base: b2,
                    index: i2,
                },
            )
            | (
                Inst::ElemPtr {
                    agg_ty: t1,
                    base: b1,
                    index: i1,
                },
                Inst::ElemPtr {
                    agg_ty: t2,
                    base: b2,
                    index: i2,
                },
            ) => {
                ty_deep_equals(self.a, *t1, self.b, *t2)
                    && self.operand_eq(*b1, *b2)
                    && self.operand_eq(*i1, *i2)
            }
            (
                Inst::Extract { agg: a1, index: i1 },
                Inst::Extract { agg: a2, index: i2 },
            ) => self.operand_eq(*a1, *a2) && self.operand_eq(*i1, *i2),
            (
                Inst::Insert {
                    agg: a1,
                    index: i1,
                    value: v1,
                },
                Inst::Insert {
                    agg: a2,
                    index: i2,
                    value: v2,
                },
            ) => {
                self.operand_eq(*a1, *a2)
                    && self.operand_eq(*i1, *i2)
                    && self.operand_eq(*v1, *v2)
            }
            (
                Inst::Call {
                    target: t1,
                    args: a1,
                },
                Inst::Call {
                    target: t2,
                    args: a2,
                },
            ) => {
                self.a.func(*t1).name() == self.b.func(*t2).name()
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(&x, &y)| self.operand_eq(x, y))
            }
            _ => false,
        }
    }
}

fn func_deep_equals(a: &Module, fa: FuncId, b: &Module, fb: FuncId) -> bool {
    let af = a.func(fa);
    let bf = b.func(fb);

    if af.name() != bf.name()
        || !ty_deep_equals(a, af.return_ty(), b, bf.return_ty())
        || af.args().len() != bf.args().len()
        || af.blocks().len() != bf.blocks().len()
    {
        return false;
    }

    for (&aa, &ba) in af.args().iter().zip(bf.args()) {
        if !ty_deep_equals(a, a.value(aa).ty(), b, b.value(ba).ty()) {
            return false;
        }
    }

    let mut cmp = FuncCmp {
        a,
        b,
        a_defs: FxHashMap::default(),
        b_defs: FxHashMap::default(),
        a_blocks: FxHashMap::default(),
        b_blocks: FxHashMap::default(),
    };

    for (i, &arg) in af.args().iter().enumerate() {
        cmp.a_defs.insert(arg, i);
    }
    for (i, &arg) in bf.args().iter().enumerate() {
        cmp.b_defs.insert(arg, i);
    }

    let mut ordinal = af.args().len();
    for (i, &block) in af.blocks().iter().enumerate() {
        cmp.a_blocks.insert(block, i);
        for &inst in a.block(block).insts() {
            cmp.a_defs.insert(inst, ordinal);
            ordinal += 1;
        }
    }

    let mut ordinal = bf.args().len();
    for (i, &block) in bf.blocks().iter().enumerate() {
        cmp.b_blocks.insert(block, i);
        for &inst in b.block(block).insts() {
            cmp.b_defs.insert(inst, ordinal);
            ordinal += 1;
        }
    }

    for (&ab, &bb) in af.blocks().iter().zip(bf.blocks()) {
        let ai = a.block(ab).insts();
        let bi = b.block(bb).insts();

        if ai.len() != bi.len() {
            return false;
        }

        for (&x, &y) in ai.iter().zip(bi) {
            if !cmp.inst_eq(x, y) {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_dedup_returns_one_object() {
        let mut module = Module::new();

        let one = module.const_int(ApInt::new(1, IntWidth::W32));
        let one_again = module.const_int(ApInt::new(1, IntWidth::W32));
        let two = module.const_int(ApInt::new(2, IntWidth::W32));
        let one_i64 = module.const_int(ApInt::new(1, IntWidth::W64));

        assert_eq!(one, one_again);
        assert_ne!(one, two);
        assert_ne!(one, one_i64);
    }

    #[test]
    fn const_string_materializes_bytes() {
        let mut module = Module::new();

        let s = module.const_string(b"hi");
        let i8_ty = module.i8_ty();
        let expected_ty = module.array_ty(i8_ty, 2);
        assert_eq!(module.value(s).ty(), expected_ty);

        // the per-byte constants were interned as a side effect
        let h = module.const_int(ApInt::new(b'h' as u64, IntWidth::W8));
        let h_again = module.const_int(ApInt::new(b'h' as u64, IntWidth::W8));
        assert_eq!(h, h_again);
    }

    #[test]
    fn function_table_is_insertion_ordered() {
        let mut module = Module::new();
        let void = module.void_ty();
        let i32_ty = module.i32_ty();

        module.create_func("one", void, &[]);
        module.create_func("two", i32_ty, &[i32_ty]);
        module.create_func("three", void, &[]);

        let names: Vec<&str> = module.funcs().map(|(_, f)| f.name()).collect();
        assert_eq!(names, ["one", "two", "three"]);

        assert!(module.find_func("two").is_some());
        assert!(module.find_func("four").is_none());
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn duplicate_function_name_panics() {
        let mut module = Module::new();
        let void = module.void_ty();

        module.create_func("f", void, &[]);
        module.create_func("f", void, &[]);
    }

    #[test]
    #[should_panic(expected = "different return type")]
    fn find_or_create_signature_mismatch_panics() {
        let mut module = Module::new();
        let void = module.void_ty();
        let i32_ty = module.i32_ty();

        module.create_func("f", void, &[]);
        module.find_or_create_func("f", i32_ty, &[]);
    }

    #[test]
    #[should_panic(expected = "does not own")]
    fn removing_unowned_instruction_panics() {
        let mut module = Module::new();

        let not_an_inst = module.const_bool(true);
        module.remove_inst(not_an_inst);
    }

    #[test]
    fn empty_modules_are_deep_equal() {
        assert!(deep_equals(&Module::new(), &Module::new()));
    }
}
