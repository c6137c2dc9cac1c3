//! Emitting Sable IR's text format.
//!
//! The emitter assigns `$n` labels to every argument and every
//! result-producing (non-`void`) instruction per function, in block order,
//! and names blocks with their declared name, `entry` for an unnamed entry
//! block, or `bb0, bb1, …` otherwise. Output is deterministic: functions,
//! blocks, and instructions emit in insertion order, and phi incoming lists
//! are already canonically sorted.

use crate::inst::Inst;
use crate::module::{BlockId, FuncId, Module};
use crate::ty::{FloatWidth, TyId, Type};
use crate::value::{Constant, ValueData, ValueId};
use rustc_hash::FxHashMap;
use std::fmt::Write;

/// Renders a whole module.
pub fn stringify_module(module: &Module) -> String {
    let printer = Printer::new(module);
    let mut out = String::new();

    for (func, _) in module.funcs() {
        printer.dump_function(func, &mut out);
        out.push_str("\n\n");
    }

    out
}

/// Renders a single function.
pub fn stringify_function(module: &Module, func: FuncId) -> String {
    let mut out = String::new();
    Printer::new(module).dump_function(func, &mut out);
    out
}

/// Renders a single value the way it appears in a function body, with its
/// `$n =` label if it produces a result, but without indentation or a
/// trailing newline.
pub fn stringify_value(module: &Module, value: ValueId) -> String {
    let printer = Printer::new(module);
    let mut out = String::new();

    if module.value(value).is_inst() {
        if let Some(label) = printer.labels.get(&value) {
            let _ = write!(out, "${label} = ");
        }
    }

    printer.dump_raw_value(value, &mut out);
    out
}

/// Renders a type.
pub fn stringify_type(module: &Module, ty: TyId) -> String {
    let mut out = String::new();
    dump_ty(module, ty, &mut out);
    out
}

fn dump_ty(module: &Module, ty: TyId, buf: &mut String) {
    match module.ty(ty) {
        Type::Int(w) => {
            let _ = write!(buf, "i{}", w.bits());
        }
        Type::Float(w) => {
            let _ = write!(buf, "f{}", w.bits());
        }
        Type::Bool => buf.push_str("bool"),
        Type::Ptr => buf.push_str("ptr"),
        Type::Void => buf.push_str("void"),
        Type::Array { element, len } => {
            buf.push('[');
            dump_ty(module, *element, buf);
            let _ = write!(buf, "; {len}]");
        }
        Type::Struct { fields } => {
            buf.push_str("{ ");

            for &field in fields {
                dump_ty(module, field, buf);
                buf.push(' ');
            }

            buf.push('}');
        }
    }
}

struct Printer<'m> {
    module: &'m Module,
    labels: FxHashMap<ValueId, usize>,
    block_names: FxHashMap<BlockId, String>,
}

impl<'m> Printer<'m> {
    fn new(module: &'m Module) -> Self {
        let mut printer = Printer {
            module,
            labels: FxHashMap::default(),
            block_names: FxHashMap::default(),
        };

        for (func, _) in module.funcs() {
            printer.label_function(func);
        }

        printer
    }

    fn label_function(&mut self, func: FuncId) {
        let f = self.module.func(func);
        let mut next = 0usize;

        for &arg in f.args() {
            self.labels.insert(arg, next);
            next += 1;
        }

        let mut unnamed = 0usize;

        for (i, &block) in f.blocks().iter().enumerate() {
            let name = if let Some(declared) = self.module.block_name(block) {
                declared.to_string()
            } else if i == 0 {
                "entry".to_string()
            } else {
                let n = unnamed;
                unnamed += 1;
                format!("bb{n}")
            };

            self.block_names.insert(block, name);

            for &inst in self.module.block(block).insts() {
                if !self.module.ty(self.module.value(inst).ty()).is_void() {
                    self.labels.insert(inst, next);
                    next += 1;
                }
            }
        }
    }

    fn dump_function(&self, func: FuncId, buf: &mut String) {
        let f = self.module.func(func);

        buf.push_str(if f.is_opaque() { "decl " } else { "func " });
        dump_ty(self.module, f.return_ty(), buf);
        let _ = write!(buf, " @{}(", f.name());

        for (i, &arg) in f.args().iter().enumerate() {
            dump_ty(self.module, self.module.value(arg).ty(), buf);
            let _ = write!(buf, " ${}", self.labels[&arg]);

            if i + 1 != f.args().len() {
                buf.push_str(", ");
            }
        }

        buf.push(')');

        if f.is_opaque() {
            return;
        }

        buf.push_str(" {");

        for &block in f.blocks() {
            buf.push('\n');
            self.dump_block(block, buf);
        }

        buf.push('}');
    }

    fn dump_block(&self, block: BlockId, buf: &mut String) {
        let _ = write!(buf, "%{}:\n", self.block_names[&block]);

        for &inst in self.module.block(block).insts() {
            self.dump_inst_line(inst, buf);
        }
    }

    fn dump_inst_line(&self, inst: ValueId, buf: &mut String) {
        buf.push_str("    ");

        if let Some(label) = self.labels.get(&inst) {
            let _ = write!(buf, "${label} = ");
        }

        self.dump_raw_value(inst, buf);
        buf.push('\n');
    }

    fn dump_ref_value(&self, value: ValueId, buf: &mut String) {
        match self.module.value(value).data() {
            ValueData::Constant(_) => self.dump_raw_value(value, buf),
            _ => {
                let _ = write!(buf, "${}", self.labels[&value]);
            }
        }
    }

    fn dump_ty_ref(&self, value: ValueId, buf: &mut String) {
        dump_ty(self.module, self.module.value(value).ty(), buf);
        buf.push(' ');
        self.dump_ref_value(value, buf);
    }

    fn dump_raw_value(&self, value: ValueId, buf: &mut String) {
        match self.module.value(value).data() {
            ValueData::Argument { .. } => {
                let _ = write!(buf, "${}", self.labels[&value]);
            }
            ValueData::Constant(c) => self.dump_constant(value, c, buf),
            ValueData::Inst(inst) => self.dump_inst(value, inst, buf),
        }
    }

    fn dump_constant(&self, value: ValueId, constant: &Constant, buf: &mut String) {
        match constant {
            Constant::Int(v) => {
                let _ = write!(buf, "{}", v.value());
            }
            Constant::Bool(true) => buf.push_str("true"),
            Constant::Bool(false) => buf.push_str("false"),
            Constant::Null => buf.push_str("null"),
            Constant::Undef => buf.push_str("undef"),
            Constant::Float(bits) => {
                // the bit-pattern form is exact, which no decimal rendering is
                let ty = self.module.ty(self.module.value(value).ty());
                match ty.float_width() {
                    Some(FloatWidth::W32) => {
                        let _ = write!(buf, "0xfp{:08x}", (bits.value() as f32).to_bits());
                    }
                    _ => {
                        let _ = write!(buf, "0xfp{:016x}", bits.bits());
                    }
                }
            }
            Constant::Array(elements) => {
                buf.push('[');

                for (i, &e) in elements.iter().enumerate() {
                    self.dump_ref_value(e, buf);

                    if i + 1 != elements.len() {
                        buf.push_str(", ");
                    }
                }

                buf.push(']');
            }
            Constant::Struct(fields) => {
                buf.push_str("{ ");

                for (i, &f) in fields.iter().enumerate() {
                    self.dump_ref_value(f, buf);

                    if i + 1 != fields.len() {
                        buf.push_str(", ");
                    }
                }

                buf.push_str(" }");
            }
            Constant::String(bytes) => {
                buf.push('"');

                for &b in bytes.iter() {
                    match b {
                        b'\n' => buf.push_str("\\n"),
                        b'\t' => buf.push_str("\\t"),
                        b'\r' => buf.push_str("\\r"),
                        0 => buf.push_str("\\0"),
                        b'\\' => buf.push_str("\\\\"),
                        b'"' => buf.push_str("\\\""),
                        0x20..=0x7e => buf.push(b as char),
                        _ => {
                            let _ = write!(buf, "\\x{b:02x}");
                        }
                    }
                }

                buf.push('"');
            }
        }
    }

    fn dump_inst(&self, value: ValueId, inst: &Inst, buf: &mut String) {
        match inst {
            Inst::Phi { incoming } => {
                buf.push_str("phi ");
                dump_ty(self.module, self.module.value(value).ty(), buf);
                buf.push(' ');

                // continuation pairs line up under the first `[`
                let indent = buf.len() - buf.rfind('\n').map_or(0, |p| p + 1);

                for (i, &(block, incoming_val)) in incoming.iter().enumerate() {
                    if i != 0 {
                        let _ = write!(buf, ",\n{:indent$}", "");
                    }

                    buf.push_str("[ ");
                    self.dump_ref_value(incoming_val, buf);
                    let _ = write!(buf, ", %{} ]", self.block_names[&block]);
                }
            }
            Inst::Call { target, args } => {
                buf.push_str("call ");
                dump_ty(self.module, self.module.func(*target).return_ty(), buf);
                let _ = write!(buf, " @{}(", self.module.func(*target).name());

                for (i, &arg) in args.iter().enumerate() {
                    self.dump_ty_ref(arg, buf);

                    if i + 1 != args.len() {
                        buf.push_str(", ");
                    }
                }

                buf.push(')');
            }
            Inst::Sel {
                cond,
                if_true,
                if_false,
            } => {
                buf.push_str("sel ");
                dump_ty(self.module, self.module.value(value).ty(), buf);
                buf.push_str(", bool ");
                self.dump_ref_value(*cond, buf);
                buf.push_str(", if ");
                self.dump_ref_value(*if_true, buf);
                buf.push_str(", else ");
                self.dump_ref_value(*if_false, buf);
            }
            Inst::ICmp { order, lhs, rhs } => {
                let _ = write!(buf, "icmp {} ", order.mnemonic());
                self.dump_ty_ref(*lhs, buf);
                buf.push_str(", ");
                self.dump_ref_value(*rhs, buf);
            }
            Inst::FCmp { order, lhs, rhs } => {
                let _ = write!(buf, "fcmp {} ", order.mnemonic());
                self.dump_ty_ref(*lhs, buf);
                buf.push_str(", ");
                self.dump_ref_value(*rhs, buf);
            }
            Inst::Br { target } => {
                let _ = write!(buf, "br %{}", self.block_names[target]);
            }
            Inst::CondBr {
                cond,
                true_target,
                false_target,
            } => {
                buf.push_str("cbr bool ");
                self.dump_ref_value(*cond, buf);
                let _ = write!(
                    buf,
                    ", if %{}, else %{}",
                    self.block_names[true_target], self.block_names[false_target]
                );
            }
            Inst::Ret { value: ret_val } => {
                buf.push_str("ret ");

                match ret_val {
                    Some(v) => self.dump_ty_ref(*v, buf),
                    None => buf.push_str("void"),
                }
            }
            Inst::Unreachable => buf.push_str("unreachable"),
            Inst::Binary { op, lhs, rhs } => {
                let _ = write!(buf, "{} ", op.mnemonic());
                self.dump_ty_ref(*lhs, buf);
                buf.push_str(", ");
                self.dump_ref_value(*rhs, buf);
            }
            Inst::Load { target, volatile } => {
                buf.push_str("load ");

                if *volatile {
                    buf.push_str("volatile ");
                }

                dump_ty(self.module, self.module.value(value).ty(), buf);
                buf.push_str(", ptr ");
                self.dump_ref_value(*target, buf);
            }
            Inst::Store {
                value: stored,
                target,
                volatile,
            } => {
                buf.push_str("store ");

                if *volatile {
                    buf.push_str("volatile ");
                }

                self.dump_ty_ref(*stored, buf);
                buf.push_str(", ");
                self.dump_ty_ref(*target, buf);
            }
            Inst::Alloca { alloc_ty, count } => {
                buf.push_str("alloca ");
                dump_ty(self.module, *alloc_ty, buf);

                // the one-object form elides the implicit `i64 1`
                let implicit = matches!(
                    self.module.value(*count).as_constant(),
                    Some(Constant::Int(v))
                        if v.value() == 1 && v.width() == crate::ty::IntWidth::W64
                );

                if !implicit {
                    buf.push_str(", ");
                    self.dump_ty_ref(*count, buf);
                }
            }
            Inst::Offset {
                elem_ty,
                base,
                index,
            } => {
                buf.push_str("offset ");
                dump_ty(self.module, *elem_ty, buf);
                buf.push_str(", ");
                self.dump_ty_ref(*base, buf);
                buf.push_str(", ");
                self.dump_ty_ref(*index, buf);
            }
            Inst::ElemPtr {
                agg_ty,
                base,
                index,
            } => {
                buf.push_str("elemptr ");
                dump_ty(self.module, *agg_ty, buf);
                buf.push_str(", ");
                self.dump_ty_ref(*base, buf);
                buf.push_str(", ");
                self.dump_ty_ref(*index, buf);
            }
            Inst::Extract { agg, index } => {
                buf.push_str("extract ");
                self.dump_ty_ref(*agg, buf);
                buf.push_str(", ");
                self.dump_ty_ref(*index, buf);
            }
            Inst::Insert { agg, index, value } => {
                buf.push_str("insert ");
                self.dump_ty_ref(*agg, buf);
                buf.push_str(", ");
                self.dump_ty_ref(*value, buf);
                buf.push_str(", ");
                self.dump_ty_ref(*index, buf);
            }
            Inst::Conv { op, from } => {
                let _ = write!(buf, "{} ", op.mnemonic());
                dump_ty(self.module, self.module.value(value).ty(), buf);
                buf.push_str(", ");
                self.dump_ty_ref(*from, buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    #[test]
    fn types_stringify_with_the_fixed_grammar() {
        let mut module = Module::new();

        let i8_ty = module.i8_ty();
        let arr = module.array_ty(i8_ty, 16);
        let f64_ty = module.f64_ty();
        let st = module.struct_ty(&[arr, f64_ty]);
        let empty = module.empty_struct_ty();

        assert_eq!(stringify_type(&module, i8_ty), "i8");
        assert_eq!(stringify_type(&module, module.bool_ty()), "bool");
        assert_eq!(stringify_type(&module, module.ptr_ty()), "ptr");
        assert_eq!(stringify_type(&module, module.void_ty()), "void");
        assert_eq!(stringify_type(&module, arr), "[i8; 16]");
        assert_eq!(stringify_type(&module, st), "{ [i8; 16] f64 }");
        assert_eq!(stringify_type(&module, empty), "{ }");
    }

    #[test]
    fn constants_stringify_canonically() {
        let mut module = Module::new();
        let mut b = Builder::new(&mut module);

        let one = b.const_i32(1);
        let yes = b.const_true();
        let null = b.const_null();
        let f = b.const_f32(1.5);
        let d = b.const_f64(1.5);
        let s = b.const_string("hi\n\"");

        assert_eq!(stringify_value(&module, one), "1");
        assert_eq!(stringify_value(&module, yes), "true");
        assert_eq!(stringify_value(&module, null), "null");
        assert_eq!(stringify_value(&module, f), "0xfp3fc00000");
        assert_eq!(stringify_value(&module, d), "0xfp3ff8000000000000");
        assert_eq!(stringify_value(&module, s), "\"hi\\n\\\"\"");
    }

    #[test]
    fn opaque_functions_stringify_as_decls() {
        let mut module = Module::new();
        let i32_ty = module.i32_ty();
        let ptr_ty = module.ptr_ty();
        let f = module.create_func("puts", i32_ty, &[ptr_ty]);

        assert_eq!(stringify_function(&module, f), "decl i32 @puts(ptr $0)");
    }

    #[test]
    fn function_bodies_label_and_indent() {
        let mut module = Module::new();
        let i32_ty = module.i32_ty();

        let mut b = Builder::new(&mut module);
        let f = b.create_func("double", i32_ty, &[i32_ty]);
        let arg = b.module().func(f).args()[0];
        let entry = b.create_block_in(f);
        b.set_insert_point(entry);

        let doubled = b.iadd(arg, arg).unwrap();
        b.ret(doubled).unwrap();

        let expected = "\
func i32 @double(i32 $0) {
%entry:
    $1 = iadd i32 $0, $0
    ret i32 $1
}";
        assert_eq!(stringify_function(&module, f), expected);
    }

    #[test]
    fn phi_incoming_pairs_align() {
        let mut module = Module::new();
        let i64_ty = module.i64_ty();

        let mut b = Builder::new(&mut module);
        let f = b.create_func("f", i64_ty, &[]);
        let entry = b.create_block_in(f);
        let left = b.create_block_named("left");
        let right = b.create_block_named("right");
        let merge = b.create_block_named("merge");

        b.set_insert_point(entry);
        let cond = b.const_true();
        b.cond_br(cond, left, right).unwrap();

        b.set_insert_point(left);
        b.br(merge).unwrap();
        b.set_insert_point(right);
        b.br(merge).unwrap();

        b.set_insert_point(merge);
        let three = b.const_i64(3);
        let one = b.const_i64(1);
        let phi = b
            .phi_with_incoming(i64_ty, &[(left, three), (right, one)])
            .unwrap();
        b.ret(phi).unwrap();

        let text = stringify_function(&module, f);
        let lines: Vec<&str> = text.lines().collect();

        let first = lines
            .iter()
            .position(|l| l.contains("phi i64"))
            .expect("phi line should be present");
        let bracket_col = lines[first].find('[').unwrap();
        assert_eq!(lines[first + 1].find('[').unwrap(), bracket_col);
        assert!(lines[first + 1].trim_start().starts_with('['));
        assert!(lines[first].trim_end().ends_with(','));
    }
}
