//! Parsing the Sable IR text format.
//!
//! Parsing is two-phase per function: a [`Lexer`] slices the source into
//! tokens, and a recursive-descent parser drives a [`Builder`] to rebuild
//! the object graph, so everything that comes out of `parse` went through
//! the same validation as IR built by hand. Phi incomings may reference
//! values and blocks that appear later in the function; those references go
//! on a worklist and are resolved once the function body is complete.
//!
//! This is the one recoverable error boundary in the crate: syntax and type
//! errors in the source surface as [`ParseError`] values naming the line,
//! never panics.

use crate::builder::Builder;
use crate::inst::{BinaryOp, ConvOp, FCmpOrder, ICmpOrder, Inst, OperandClass};
use crate::module::{BlockId, FuncId, Module};
use crate::stringify::stringify_type;
use crate::ty::{ApInt, FloatWidth, TyId, Type};
use crate::value::ValueId;
use rustc_hash::FxHashMap;
use std::iter::Peekable;
use std::str::CharIndices;

/// An error produced while parsing, with the 1-based line it was noticed
/// on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    /// The 1-based source line the error was noticed on.
    pub line: usize,
    /// What went wrong.
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// A `Result` type for parsing.
///
/// Either `Ok(T)` or `Err(ParseError)`.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Parses a module from its textual form.
pub fn parse(source: &str) -> Result<Module> {
    Parser::new(source).parse_module()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Tok {
    GlobalName,
    BlockLabel,
    ValLabel,
    LitBinary,
    LitOctal,
    LitDecimal,
    LitHex,
    LitFloatDecimal,
    LitFloatScientific,
    LitFloatByteHex,
    LitFloatCHex,
    LitString,
    ParenOpen,
    ParenClose,
    BraceOpen,
    BraceClose,
    BracketOpen,
    BracketClose,
    Comma,
    Colon,
    Eq,
    Semi,
    KwBool,
    KwVoid,
    KwPtr,
    KwI8,
    KwI16,
    KwI32,
    KwI64,
    KwF32,
    KwF64,
    KwIf,
    KwElse,
    KwTrue,
    KwFalse,
    KwUndef,
    KwNull,
    KwVolatile,
    KwDecl,
    KwFunc,
    KwPhi,
    KwCall,
    KwSel,
    KwBr,
    KwCbr,
    KwRet,
    KwUnreachable,
    KwICmp,
    KwFCmp,
    KwLoad,
    KwStore,
    KwAlloca,
    KwOffset,
    KwElemPtr,
    KwExtract,
    KwInsert,
    /// A binary or conversion mnemonic, resolved through `from_mnemonic`.
    Opcode,
    /// An `icmp`/`fcmp` ordering mnemonic, resolved through
    /// `from_mnemonic`.
    CmpOrder,
}

fn keyword(word: &str) -> Option<Tok> {
    let tok = match word {
        "bool" => Tok::KwBool,
        "void" => Tok::KwVoid,
        "ptr" => Tok::KwPtr,
        "i8" => Tok::KwI8,
        "i16" => Tok::KwI16,
        "i32" => Tok::KwI32,
        "i64" => Tok::KwI64,
        "f32" => Tok::KwF32,
        "f64" => Tok::KwF64,
        "if" => Tok::KwIf,
        "else" => Tok::KwElse,
        "true" => Tok::KwTrue,
        "false" => Tok::KwFalse,
        "undef" => Tok::KwUndef,
        "null" => Tok::KwNull,
        "volatile" => Tok::KwVolatile,
        "decl" => Tok::KwDecl,
        "func" => Tok::KwFunc,
        "phi" => Tok::KwPhi,
        "call" => Tok::KwCall,
        "sel" => Tok::KwSel,
        "br" => Tok::KwBr,
        "cbr" => Tok::KwCbr,
        "ret" => Tok::KwRet,
        "unreachable" => Tok::KwUnreachable,
        "icmp" => Tok::KwICmp,
        "fcmp" => Tok::KwFCmp,
        "load" => Tok::KwLoad,
        "store" => Tok::KwStore,
        "alloca" => Tok::KwAlloca,
        "offset" => Tok::KwOffset,
        "elemptr" => Tok::KwElemPtr,
        "extract" => Tok::KwExtract,
        "insert" => Tok::KwInsert,
        _ => {
            if BinaryOp::from_mnemonic(word).is_some() || ConvOp::from_mnemonic(word).is_some() {
                Tok::Opcode
            } else if ICmpOrder::from_mnemonic(word).is_some()
                || FCmpOrder::from_mnemonic(word).is_some()
            {
                Tok::CmpOrder
            } else {
                return None;
            }
        }
    };

    Some(tok)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Token<'a> {
    kind: Tok,
    raw: &'a str,
}

fn is_reserved_char(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | ',' | ':' | '=')
}

#[derive(Debug)]
struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    peeked: Option<Token<'a>>,
    line: usize,
    // a `;` is the array-type separator inside brackets and a comment
    // everywhere else
    bracket_depth: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.char_indices().peekable(),
            peeked: None,
            line: 1,
            bracket_depth: 0,
        }
    }

    fn line(&self) -> usize {
        self.line
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();

        if let Some((_, '\n')) = next {
            self.line += 1;
        }

        next
    }

    fn next(&mut self) -> Result<Option<Token<'a>>> {
        if let Some(tok) = self.peeked.take() {
            return Ok(Some(tok));
        }

        self.lex()
    }

    fn peek(&mut self) -> Result<Option<Token<'a>>> {
        if self.peeked.is_none() {
            self.peeked = self.lex()?;
        }

        Ok(self.peeked)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                }
                Some((_, ';')) if self.bracket_depth == 0 => {
                    while let Some((_, c)) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn lex(&mut self) -> Result<Option<Token<'a>>> {
        self.skip_trivia();

        let (start, c) = match self.chars.peek().copied() {
            Some(next) => next,
            None => return Ok(None),
        };

        if is_reserved_char(c) {
            self.bump();

            let kind = match c {
                '(' => Tok::ParenOpen,
                ')' => Tok::ParenClose,
                '{' => Tok::BraceOpen,
                '}' => Tok::BraceClose,
                '[' => {
                    self.bracket_depth += 1;
                    Tok::BracketOpen
                }
                ']' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    Tok::BracketClose
                }
                ',' => Tok::Comma,
                ':' => Tok::Colon,
                _ => Tok::Eq,
            };

            return Ok(Some(Token {
                kind,
                raw: &self.source[start..start + 1],
            }));
        }

        if c == ';' {
            // only reachable inside brackets; elsewhere it was a comment
            self.bump();
            return Ok(Some(Token {
                kind: Tok::Semi,
                raw: &self.source[start..start + 1],
            }));
        }

        if c == '"' {
            return self.lex_string(start).map(Some);
        }

        self.lex_word(start).map(Some)
    }

    fn lex_string(&mut self, start: usize) -> Result<Token<'a>> {
        self.bump();

        loop {
            match self.bump() {
                Some((_, '\\')) => {
                    self.bump();
                }
                Some((end, '"')) => {
                    return Ok(Token {
                        kind: Tok::LitString,
                        raw: &self.source[start..end + 1],
                    });
                }
                Some(_) => {}
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    fn lex_word(&mut self, start: usize) -> Result<Token<'a>> {
        let mut end = start;

        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_whitespace() || is_reserved_char(c) || c == ';' || c == '"' {
                break;
            }

            end = i + c.len_utf8();
            self.bump();
        }

        let raw = &self.source[start..end];
        let kind = self.classify(raw)?;

        Ok(Token { kind, raw })
    }

    fn classify(&self, raw: &str) -> Result<Tok> {
        let body = raw.strip_prefix('-').unwrap_or(raw);

        if body.starts_with(|c: char| c.is_ascii_digit()) {
            if body.starts_with("0xfp") {
                return Ok(Tok::LitFloatByteHex);
            }

            if body.contains('.') {
                if body.contains("e+") || body.contains("e-") {
                    return Ok(Tok::LitFloatScientific);
                }

                // not 0xfp but still has a `p`: the C hex-float form, where
                // the exponent marker is required
                if body.contains('p') {
                    return Ok(Tok::LitFloatCHex);
                }

                return Ok(Tok::LitFloatDecimal);
            }

            return Ok(match () {
                _ if body.starts_with("0b") => Tok::LitBinary,
                _ if body.starts_with("0o") => Tok::LitOctal,
                _ if body.starts_with("0x") => Tok::LitHex,
                _ => Tok::LitDecimal,
            });
        }

        if let Some(rest) = raw.strip_prefix('$') {
            if rest.is_empty() {
                return Err(self.error("expected a name after '$'"));
            }

            return Ok(Tok::ValLabel);
        }

        if let Some(rest) = raw.strip_prefix('%') {
            if rest.is_empty() {
                return Err(self.error("expected a name after '%'"));
            }

            return Ok(Tok::BlockLabel);
        }

        if let Some(rest) = raw.strip_prefix('@') {
            if rest.is_empty() {
                return Err(self.error("expected a name after '@'"));
            }

            return Ok(Tok::GlobalName);
        }

        keyword(raw).ok_or_else(|| self.error(format!("unexpected token '{raw}'")))
    }
}

enum PhiRef {
    Constant(ValueId),
    Named(String),
}

// phis may reference values or blocks defined later in the function, e.g.
// the backedge value of a loop:
//
// %entry:
//     br %header
// %header:
//     $1 = phi i32 [ 0, %entry ], [ $2, %latch ]
//     ...
// %latch:
//     $2 = iadd i32 $1, 1
//     br %header
//
// so every incoming pair is recorded here and resolved at function end
struct PhiFixup {
    phi: ValueId,
    value: PhiRef,
    block_label: String,
    line: usize,
}

struct Parser<'a> {
    lex: Lexer<'a>,
    module: Module,
    cur_func: Option<FuncId>,
    cur_block: Option<BlockId>,
    val_lookup: FxHashMap<String, ValueId>,
    bb_lookup: FxHashMap<String, BlockId>,
    defined_blocks: Vec<BlockId>,
    worklist: Vec<PhiFixup>,
    next_val: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Parser {
            lex: Lexer::new(source),
            module: Module::new(),
            cur_func: None,
            cur_block: None,
            val_lookup: FxHashMap::default(),
            bb_lookup: FxHashMap::default(),
            defined_blocks: Vec::new(),
            worklist: Vec::new(),
            next_val: 0,
        }
    }

    fn parse_module(mut self) -> Result<Module> {
        while let Some(tok) = self.lex.next()? {
            match tok.kind {
                Tok::KwDecl => {
                    self.parse_decl()?;
                }
                Tok::KwFunc => self.parse_func()?,
                _ => {
                    return Err(self.err(format!(
                        "unexpected token '{}', expected 'decl' or 'func'",
                        tok.raw
                    )))
                }
            }
        }

        Ok(self.module)
    }

    // ---- plumbing ----

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.lex.line(),
            message: message.into(),
        }
    }

    fn err_at(line: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            line,
            message: message.into(),
        }
    }

    fn expect_next(&mut self, expected: &str) -> Result<Token<'a>> {
        match self.lex.next()? {
            Some(tok) => Ok(tok),
            None => Err(self.err(format!("expected {expected}, but got eof"))),
        }
    }

    fn expect_kind(&mut self, kind: Tok, expected: &str) -> Result<Token<'a>> {
        let tok = self.expect_next(expected)?;

        if tok.kind != kind {
            return Err(self.err(format!("expected {}, but got '{}'", expected, tok.raw)));
        }

        Ok(tok)
    }

    fn peek_is(&mut self, kind: Tok) -> Result<bool> {
        Ok(self.lex.peek()?.map_or(false, |tok| tok.kind == kind))
    }

    fn eat(&mut self, kind: Tok) -> Result<bool> {
        if self.peek_is(kind)? {
            self.lex.next()?;
            return Ok(true);
        }

        Ok(false)
    }

    fn builder(&mut self) -> Builder<'_> {
        let mut b = Builder::new(&mut self.module);

        if let Some(block) = self.cur_block {
            b.set_insert_point(block);
        } else if let Some(func) = self.cur_func {
            b.set_insert_func(func);
        }

        b
    }

    fn ty_name(&self, ty: TyId) -> String {
        stringify_type(&self.module, ty)
    }

    // ---- declarations ----

    fn reset_func_state(&mut self) {
        self.val_lookup.clear();
        self.bb_lookup.clear();
        self.defined_blocks.clear();
        self.worklist.clear();
        self.next_val = 0;
        self.cur_func = None;
        self.cur_block = None;
    }

    fn parse_decl(&mut self) -> Result<FuncId> {
        self.reset_func_state();

        let return_ty = self.parse_ty()?;
        let name = self.expect_kind(Tok::GlobalName, "a function name")?;

        self.expect_kind(Tok::ParenOpen, "an opening '(' for the argument list")?;

        let mut arg_tys = Vec::new();
        let mut arg_names = Vec::new();

        while !self.peek_is(Tok::ParenClose)? {
            let ty = self.parse_ty()?;
            let arg_name = self.parse_val_name_def()?;

            arg_tys.push(ty);
            arg_names.push(arg_name);

            if !self.eat(Tok::Comma)? {
                break;
            }
        }

        self.expect_kind(Tok::ParenClose, "a closing ')' for the argument list")?;

        let name = &name.raw[1..];
        let func = match self.module.find_func(name) {
            Some(existing) => {
                let f = self.module.func(existing);
                let same_signature = f.return_ty() == return_ty
                    && f.args().len() == arg_tys.len()
                    && f.args()
                        .iter()
                        .zip(&arg_tys)
                        .all(|(&arg, &ty)| self.module.value(arg).ty() == ty);

                if !same_signature {
                    return Err(
                        self.err(format!("function '@{name}' redeclared with a different signature"))
                    );
                }

                existing
            }
            None => self.module.create_func(name, return_ty, &arg_tys),
        };

        for (arg_name, &arg) in arg_names.into_iter().zip(self.module.func(func).args()) {
            self.val_lookup.insert(arg_name, arg);
        }

        Ok(func)
    }

    fn parse_func(&mut self) -> Result<()> {
        let func = self.parse_decl()?;

        self.expect_kind(Tok::BraceOpen, "an opening '{' for the function body")?;

        if !self.module.func(func).is_opaque() {
            let name = self.module.func(func).name().to_string();
            return Err(self.err(format!("redefinition of function '@{name}'")));
        }

        self.cur_func = Some(func);

        loop {
            match self.lex.peek()? {
                Some(tok) if tok.kind != Tok::BraceClose => self.parse_block()?,
                _ => break,
            }
        }

        self.expect_kind(Tok::BraceClose, "a closing '}' for the function body")?;

        // branch targets may have created blocks before their definitions
        // were seen; restore textual definition order so printing this
        // module reproduces the input shape, with never-defined (empty)
        // blocks trailing
        let mut order = std::mem::take(&mut self.defined_blocks);
        for &block in self.module.func(func).blocks() {
            if !order.contains(&block) {
                order.push(block);
            }
        }
        self.module.set_block_order(func, &order);

        let fixups = std::mem::take(&mut self.worklist);

        for fixup in fixups {
            let block = match self.bb_lookup.get(&fixup.block_label) {
                Some(&block) => block,
                None => {
                    return Err(Self::err_at(
                        fixup.line,
                        format!("basic block '{}' not found", fixup.block_label),
                    ))
                }
            };

            let value = match fixup.value {
                PhiRef::Constant(value) => value,
                PhiRef::Named(name) => match self.val_lookup.get(&name) {
                    Some(&value) => value,
                    None => {
                        return Err(Self::err_at(
                            fixup.line,
                            format!("value '{name}' not found"),
                        ))
                    }
                },
            };

            let phi_ty = self.module.value(fixup.phi).ty();
            if self.module.value(value).ty() != phi_ty {
                return Err(Self::err_at(
                    fixup.line,
                    format!(
                        "phi incoming value expected to be of type '{}' but got '{}'",
                        self.ty_name(phi_ty),
                        self.ty_name(self.module.value(value).ty())
                    ),
                ));
            }

            self.module.add_phi_incoming(fixup.phi, block, value);
        }

        log::debug!(
            "parsed function '@{}'",
            self.module.func(func).name()
        );

        self.cur_func = None;
        self.cur_block = None;

        Ok(())
    }

    fn parse_block(&mut self) -> Result<()> {
        let label = self.expect_kind(Tok::BlockLabel, "a block label")?;
        let block = self.create_or_get_block(label.raw);

        if !self.defined_blocks.contains(&block) {
            self.defined_blocks.push(block);
        }

        self.cur_block = Some(block);
        self.expect_kind(Tok::Colon, "a ':' following the block label")?;

        loop {
            match self.lex.peek()? {
                Some(tok) if tok.kind != Tok::BlockLabel && tok.kind != Tok::BraceClose => {
                    self.parse_inst()?;
                }
                _ => break,
            }
        }

        Ok(())
    }

    fn create_or_get_block(&mut self, label: &str) -> BlockId {
        if let Some(&block) = self.bb_lookup.get(label) {
            return block;
        }

        let func = self
            .cur_func
            .expect("blocks are only created while parsing a function body");
        let block = self.module.append_block(func, Some(&label[1..]));
        self.bb_lookup.insert(label.to_string(), block);
        block
    }

    // ---- types and names ----

    fn parse_ty(&mut self) -> Result<TyId> {
        let tok = self.expect_next("a type")?;

        match tok.kind {
            Tok::KwBool => Ok(self.module.bool_ty()),
            Tok::KwVoid => Ok(self.module.void_ty()),
            Tok::KwPtr => Ok(self.module.ptr_ty()),
            Tok::KwI8 => Ok(self.module.i8_ty()),
            Tok::KwI16 => Ok(self.module.i16_ty()),
            Tok::KwI32 => Ok(self.module.i32_ty()),
            Tok::KwI64 => Ok(self.module.i64_ty()),
            Tok::KwF32 => Ok(self.module.f32_ty()),
            Tok::KwF64 => Ok(self.module.f64_ty()),
            Tok::BracketOpen => {
                let element = self.parse_ty()?;
                self.expect_kind(Tok::Semi, "a ';' between array element type and length")?;

                let len = self.expect_kind(Tok::LitDecimal, "an array length")?;
                let len: u64 = len
                    .raw
                    .parse()
                    .map_err(|_| self.err(format!("invalid integer constant '{}'", len.raw)))?;

                self.expect_kind(Tok::BracketClose, "a closing ']' for the array type")?;

                Ok(self.module.array_ty(element, len))
            }
            Tok::BraceOpen => {
                let mut fields = Vec::new();

                while !self.eat(Tok::BraceClose)? {
                    if self.lex.peek()?.is_none() {
                        return Err(self.err("expected a struct field type, but got eof"));
                    }

                    fields.push(self.parse_ty()?);
                }

                Ok(self.module.struct_ty(&fields))
            }
            _ => Err(self.err(format!("expected a type, got '{}'", tok.raw))),
        }
    }

    // a *defining* use of a value label; numeric labels must appear in
    // running order, user-chosen names are unconstrained
    fn parse_val_name_def(&mut self) -> Result<String> {
        let name = self.expect_kind(Tok::ValLabel, "a value name")?;
        let body = &name.raw[1..];

        if body.chars().all(|c| c.is_ascii_digit()) {
            let val: usize = body
                .parse()
                .map_err(|_| self.err(format!("invalid integer label '{}'", name.raw)))?;

            if val != self.next_val {
                return Err(self.err(format!(
                    "expected next numbered value to be named '${}' but got '${}'",
                    self.next_val, val
                )));
            }

            self.next_val += 1;
        }

        Ok(name.raw.to_string())
    }

    // ---- constants and operands ----

    fn parse_ref_value(&mut self, expected: TyId) -> Result<ValueId> {
        if let Some(tok) = self.lex.peek()? {
            if tok.kind == Tok::ValLabel {
                if let Some(&value) = self.val_lookup.get(tok.raw) {
                    self.lex.next()?;

                    let actual = self.module.value(value).ty();
                    if actual != expected {
                        return Err(self.err(format!(
                            "value '{}' expected to be of type '{}' but it has type '{}'",
                            tok.raw,
                            self.ty_name(expected),
                            self.ty_name(actual)
                        )));
                    }

                    return Ok(value);
                }
            }
        }

        self.parse_constant(expected)
    }

    fn parse_constant(&mut self, expected: TyId) -> Result<ValueId> {
        let tok = self.expect_next("a constant")?;

        match tok.kind {
            Tok::LitBinary => self.parse_int_constant(expected, tok.raw, 2),
            Tok::LitOctal => self.parse_int_constant(expected, tok.raw, 8),
            Tok::LitDecimal => self.parse_int_constant(expected, tok.raw, 10),
            Tok::LitHex => self.parse_int_constant(expected, tok.raw, 16),
            Tok::LitFloatDecimal | Tok::LitFloatScientific => {
                let ty = self.expect_float_ty(expected)?;
                let value: f64 = tok.raw.parse().map_err(|_| {
                    self.err(format!("unable to parse float literal '{}'", tok.raw))
                })?;

                Ok(self.module.const_float(ty, value))
            }
            Tok::LitFloatCHex => {
                let ty = self.expect_float_ty(expected)?;
                let value = parse_hex_float(tok.raw).ok_or_else(|| {
                    self.err(format!("unable to parse hex float literal '{}'", tok.raw))
                })?;

                Ok(self.module.const_float(ty, value))
            }
            Tok::LitFloatByteHex => {
                // a raw bit pattern sized to the destination type, parsed as
                // a hex integer and reinterpreted
                let ty = self.expect_float_ty(expected)?;
                let digits = &tok.raw[4..];

                let value = match self.module.ty(ty).float_width() {
                    Some(FloatWidth::W32) => u32::from_str_radix(digits, 16)
                        .map(|bits| f32::from_bits(bits) as f64),
                    _ => u64::from_str_radix(digits, 16).map(f64::from_bits),
                }
                .map_err(|_| {
                    self.err(format!("unable to parse float bit pattern '{}'", tok.raw))
                })?;

                Ok(self.module.const_float(ty, value))
            }
            Tok::KwTrue | Tok::KwFalse => {
                if !self.module.ty(expected).is_bool() {
                    return Err(self.err(format!(
                        "boolean literal should be of type 'bool' but was '{}'",
                        self.ty_name(expected)
                    )));
                }

                Ok(self.module.const_bool(tok.kind == Tok::KwTrue))
            }
            Tok::KwNull => {
                if !self.module.ty(expected).is_ptr() {
                    return Err(self.err(format!(
                        "'null' should be of type 'ptr' but was '{}'",
                        self.ty_name(expected)
                    )));
                }

                Ok(self.module.const_null())
            }
            Tok::KwUndef => Ok(self.module.const_undef(expected)),
            Tok::BraceOpen => self.parse_struct_constant(expected),
            Tok::BracketOpen => self.parse_array_constant(expected),
            Tok::LitString => {
                let bytes = self.unescape_string(tok.raw)?;

                let i8_ty = self.module.i8_ty();
                let string_ty = self.module.array_ty(i8_ty, bytes.len() as u64);
                if expected != string_ty {
                    return Err(self.err(format!(
                        "string literal has type '{}' but '{}' was expected",
                        self.ty_name(string_ty),
                        self.ty_name(expected)
                    )));
                }

                Ok(self.module.const_string(&bytes))
            }
            _ => Err(self.err(format!(
                "unexpected token '{}', expected a constant",
                tok.raw
            ))),
        }
    }

    fn expect_float_ty(&self, expected: TyId) -> Result<TyId> {
        if !self.module.ty(expected).is_float() {
            return Err(self.err(format!(
                "float literal should be of float type but was '{}'",
                self.ty_name(expected)
            )));
        }

        Ok(expected)
    }

    fn parse_int_constant(&mut self, expected: TyId, raw: &str, radix: u32) -> Result<ValueId> {
        let width = match self.module.ty(expected).int_width() {
            Some(width) => width,
            None => {
                return Err(self.err(format!(
                    "integer literal should be of integer type but was '{}'",
                    self.ty_name(expected)
                )))
            }
        };

        let (negative, body) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let digits = match radix {
            10 => body,
            _ => &body[2..],
        };

        let magnitude = u64::from_str_radix(digits, radix).map_err(|_| {
            self.err(format!(
                "unable to parse integer '{raw}'; integer literal values must fit within 64 bits"
            ))
        })?;

        let value = if negative {
            magnitude.wrapping_neg()
        } else {
            magnitude
        };

        Ok(self.module.const_int(ApInt::new(value, width)))
    }

    fn parse_array_constant(&mut self, expected: TyId) -> Result<ValueId> {
        let (element, len) = match self.module.ty(expected) {
            Type::Array { element, len } => (*element, *len),
            _ => {
                return Err(self.err(format!(
                    "array literal should be of array type but was '{}'",
                    self.ty_name(expected)
                )))
            }
        };

        if len == 0 {
            return Err(self.err("array constants cannot be empty"));
        }

        let mut values = Vec::with_capacity(len as usize);

        for i in 0..len {
            values.push(self.parse_constant(element)?);

            if i + 1 < len {
                self.expect_kind(Tok::Comma, "a ',' between array literal elements")?;
            }
        }

        self.expect_kind(
            Tok::BracketClose,
            "a ']' after the right number of array elements",
        )?;

        Ok(self.module.const_array(&values))
    }

    fn parse_struct_constant(&mut self, expected: TyId) -> Result<ValueId> {
        let fields = match self.module.ty(expected) {
            Type::Struct { fields } => fields.clone(),
            _ => {
                return Err(self.err(format!(
                    "struct literal should be of struct type but was '{}'",
                    self.ty_name(expected)
                )))
            }
        };

        let mut values = Vec::with_capacity(fields.len());

        for (i, &field) in fields.iter().enumerate() {
            values.push(self.parse_constant(field)?);

            if i + 1 < fields.len() {
                self.expect_kind(Tok::Comma, "a ',' between struct literal fields")?;
            }
        }

        self.expect_kind(
            Tok::BraceClose,
            "a '}' after the right number of struct fields",
        )?;

        Ok(self.module.const_struct(&values))
    }

    fn unescape_string(&self, raw: &str) -> Result<Vec<u8>> {
        let inner = raw[1..raw.len() - 1].as_bytes();
        let mut out = Vec::with_capacity(inner.len());
        let mut i = 0;

        while i < inner.len() {
            let b = inner[i];

            if b != b'\\' {
                out.push(b);
                i += 1;
                continue;
            }

            i += 1;
            let esc = *inner
                .get(i)
                .ok_or_else(|| self.err("unexpected end of string literal after '\\'"))?;

            let decoded = match esc {
                b'\'' => b'\'',
                b'"' => b'"',
                b'?' => b'?',
                b'\\' => b'\\',
                b'a' => 0x07,
                b'b' => 0x08,
                b'f' => 0x0c,
                b'n' => b'\n',
                b'r' => b'\r',
                b't' => b'\t',
                b'v' => 0x0b,
                b'0' => 0,
                b'x' => {
                    let hex = inner
                        .get(i + 1..i + 3)
                        .ok_or_else(|| self.err("unexpected end of hex escape sequence"))?;
                    i += 2;

                    std::str::from_utf8(hex)
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or_else(|| self.err("invalid hex escape sequence"))?
                }
                other => {
                    return Err(self.err(format!(
                        "unknown escape sequence '\\{}'",
                        other as char
                    )))
                }
            };

            out.push(decoded);
            i += 1;
        }

        Ok(out)
    }

    fn parse_ty_val_pair(&mut self) -> Result<(TyId, ValueId)> {
        let ty = self.parse_ty()?;
        let value = self.parse_ref_value(ty)?;

        Ok((ty, value))
    }

    fn parse_binop_operands(&mut self) -> Result<(TyId, ValueId, ValueId)> {
        let (ty, lhs) = self.parse_ty_val_pair()?;
        self.expect_kind(Tok::Comma, "a comma between binary instruction operands")?;
        let rhs = self.parse_ref_value(ty)?;

        Ok((ty, lhs, rhs))
    }

    fn parse_bool_condition(&mut self, what: &str) -> Result<ValueId> {
        let (ty, value) = self.parse_ty_val_pair()?;

        if !self.module.ty(ty).is_bool() {
            return Err(self.err(format!(
                "{} expected to be of type 'bool' but got '{}'",
                what,
                self.ty_name(ty)
            )));
        }

        Ok(value)
    }

    // ---- instructions ----

    fn parse_inst(&mut self) -> Result<()> {
        let mut name = String::new();

        if self.peek_is(Tok::ValLabel)? {
            name = self.parse_val_name_def()?;
            self.expect_kind(Tok::Eq, "a '=' after the value name")?;
        }

        let tok = self.expect_next("an instruction")?;

        let value = match tok.kind {
            Tok::KwPhi => self.parse_phi()?,
            Tok::KwCall => self.parse_call()?,
            Tok::KwSel => self.parse_sel()?,
            Tok::KwBr => self.parse_br()?,
            Tok::KwCbr => self.parse_cbr()?,
            Tok::KwRet => self.parse_ret()?,
            Tok::KwUnreachable => self.inst(|b| b.unreachable())?,
            Tok::KwICmp => self.parse_icmp()?,
            Tok::KwFCmp => self.parse_fcmp()?,
            Tok::KwLoad => self.parse_load()?,
            Tok::KwStore => self.parse_store()?,
            Tok::KwAlloca => self.parse_alloca()?,
            Tok::KwOffset => self.parse_offset()?,
            Tok::KwElemPtr => self.parse_elemptr()?,
            Tok::KwExtract => self.parse_extract()?,
            Tok::KwInsert => self.parse_insert()?,
            Tok::Opcode => {
                if let Some(op) = BinaryOp::from_mnemonic(tok.raw) {
                    self.parse_binary(op)?
                } else if let Some(op) = ConvOp::from_mnemonic(tok.raw) {
                    self.parse_conv(op)?
                } else {
                    return Err(self.err(format!(
                        "expected an instruction name but got '{}' instead",
                        tok.raw
                    )));
                }
            }
            _ => {
                return Err(self.err(format!(
                    "expected an instruction name but got '{}' instead",
                    tok.raw
                )))
            }
        };

        if !name.is_empty() {
            self.val_lookup.insert(name, value);
            return Ok(());
        }

        let unlabeled_ok = matches!(
            self.module.inst(value),
            Inst::Call { .. } | Inst::Store { .. }
        ) || self.module.inst(value).is_terminator();

        if !unlabeled_ok {
            return Err(self.err("expected instruction to be labeled"));
        }

        Ok(())
    }

    fn inst(&mut self, build: impl FnOnce(&mut Builder) -> Option<ValueId>) -> Result<ValueId> {
        let value = build(&mut self.builder());

        value.ok_or_else(|| self.err("instruction outside of a block"))
    }

    fn parse_phi(&mut self) -> Result<ValueId> {
        let ty = self.parse_ty()?;
        let phi = self.inst(|b| b.phi(ty))?;

        let fixup = self.parse_phi_incoming(phi, ty)?;
        self.worklist.push(fixup);

        while self.eat(Tok::Comma)? {
            let fixup = self.parse_phi_incoming(phi, ty)?;
            self.worklist.push(fixup);
        }

        Ok(phi)
    }

    fn parse_phi_incoming(&mut self, phi: ValueId, phi_ty: TyId) -> Result<PhiFixup> {
        self.expect_kind(Tok::BracketOpen, "an incoming branch for 'phi'")?;

        let value = match self.lex.peek()? {
            Some(tok) if tok.kind == Tok::ValLabel => {
                self.lex.next()?;
                PhiRef::Named(tok.raw.to_string())
            }
            _ => PhiRef::Constant(self.parse_constant(phi_ty)?),
        };

        self.expect_kind(Tok::Comma, "a comma between the value and the block label")?;
        let block = self.expect_kind(Tok::BlockLabel, "an incoming block name")?;
        let block_label = block.raw.to_string();
        self.expect_kind(Tok::BracketClose, "a ']' after the incoming pair")?;

        Ok(PhiFixup {
            phi,
            value,
            block_label,
            line: self.lex.line(),
        })
    }

    fn parse_call(&mut self) -> Result<ValueId> {
        let return_ty = self.parse_ty()?;
        let callee = self.expect_kind(Tok::GlobalName, "the name of the function to call")?;
        let callee_name = callee.raw[1..].to_string();

        self.expect_kind(Tok::ParenOpen, "a '(' before the argument list")?;

        let mut arg_tys = Vec::new();
        let mut args = Vec::new();

        while !self.peek_is(Tok::ParenClose)? {
            if self.lex.peek()?.is_none() {
                return Err(self.err("expected a call argument, but got eof"));
            }

            let (ty, value) = self.parse_ty_val_pair()?;
            arg_tys.push(ty);
            args.push(value);

            if !self.eat(Tok::Comma)? {
                break;
            }
        }

        self.expect_kind(Tok::ParenClose, "a ')' after the argument list")?;

        let func = match self.module.find_func(&callee_name) {
            Some(existing) => {
                let f = self.module.func(existing);

                if f.return_ty() != return_ty {
                    return Err(self.err(format!(
                        "attempted to call function '@{callee_name}' with the wrong return type"
                    )));
                }

                if f.args().len() != args.len() {
                    return Err(self.err(format!(
                        "attempted to call function '@{callee_name}' with the wrong number of arguments"
                    )));
                }

                let args_match = f
                    .args()
                    .iter()
                    .zip(&arg_tys)
                    .all(|(&param, &ty)| self.module.value(param).ty() == ty);
                if !args_match {
                    return Err(self.err(format!(
                        "attempted to call function '@{callee_name}' with arguments of the wrong type"
                    )));
                }

                existing
            }
            None => self.module.create_func(&callee_name, return_ty, &arg_tys),
        };

        self.inst(|b| b.call(func, &args))
    }

    fn parse_sel(&mut self) -> Result<ValueId> {
        let ty = self.parse_ty()?;
        self.expect_kind(Tok::Comma, "a comma after the 'sel' type")?;

        let cond = self.parse_bool_condition("'sel' condition")?;
        self.expect_kind(Tok::Comma, "a comma after the 'sel' condition")?;
        self.expect_kind(Tok::KwIf, "'if' after the 'sel' condition")?;
        let if_true = self.parse_ref_value(ty)?;

        self.expect_kind(Tok::Comma, "a comma after the 'sel' 'if' value")?;
        self.expect_kind(Tok::KwElse, "'else' after the 'sel' 'if' value")?;
        let if_false = self.parse_ref_value(ty)?;

        self.inst(|b| b.sel(cond, if_true, if_false))
    }

    fn parse_br(&mut self) -> Result<ValueId> {
        let label = self.expect_kind(Tok::BlockLabel, "a block label")?;
        let target = self.create_or_get_block(label.raw);

        self.inst(|b| b.br(target))
    }

    fn parse_cbr(&mut self) -> Result<ValueId> {
        let cond = self.parse_bool_condition("'cbr' condition")?;

        self.expect_kind(Tok::Comma, "a comma after the 'cbr' condition")?;
        self.expect_kind(Tok::KwIf, "'if' for 'cbr'")?;
        let true_label = self.expect_kind(Tok::BlockLabel, "a block label for 'if'")?;
        let true_target = self.create_or_get_block(true_label.raw);

        self.expect_kind(Tok::Comma, "a comma after the 'cbr' 'if' target")?;
        self.expect_kind(Tok::KwElse, "'else' for 'cbr'")?;
        let false_label = self.expect_kind(Tok::BlockLabel, "a block label for 'else'")?;
        let false_target = self.create_or_get_block(false_label.raw);

        self.inst(|b| b.cond_br(cond, true_target, false_target))
    }

    fn parse_ret(&mut self) -> Result<ValueId> {
        let ty = self.parse_ty()?;

        let func = self
            .cur_func
            .expect("instructions are only parsed inside a function body");
        let return_ty = self.module.func(func).return_ty();

        if ty != return_ty {
            return Err(self.err(format!(
                "'ret' type '{}' does not match the function's return type '{}'",
                self.ty_name(ty),
                self.ty_name(return_ty)
            )));
        }

        if self.module.ty(ty).is_void() {
            return self.inst(|b| b.ret_void());
        }

        let value = self.parse_ref_value(ty)?;
        self.inst(|b| b.ret(value))
    }

    fn parse_icmp(&mut self) -> Result<ValueId> {
        let tok = self.expect_next("an opcode after 'icmp'")?;
        let order = ICmpOrder::from_mnemonic(tok.raw)
            .ok_or_else(|| self.err(format!("expected an 'icmp' opcode, but got '{}'", tok.raw)))?;

        let (ty, lhs, rhs) = self.parse_binop_operands()?;

        if !self.module.ty(ty).is_int_or_bool() {
            return Err(self.err(format!(
                "expected 'icmp' operands to be integers or 'bool' values but got '{}'",
                self.ty_name(ty)
            )));
        }

        self.inst(|b| b.icmp(order, lhs, rhs))
    }

    fn parse_fcmp(&mut self) -> Result<ValueId> {
        let tok = self.expect_next("an opcode after 'fcmp'")?;
        let order = FCmpOrder::from_mnemonic(tok.raw)
            .ok_or_else(|| self.err(format!("expected an 'fcmp' opcode, but got '{}'", tok.raw)))?;

        let (ty, lhs, rhs) = self.parse_binop_operands()?;

        if !self.module.ty(ty).is_float() {
            return Err(self.err(format!(
                "expected 'fcmp' operands to be of floating-point types, but got '{}'",
                self.ty_name(ty)
            )));
        }

        self.inst(|b| b.fcmp(order, lhs, rhs))
    }

    fn parse_binary(&mut self, op: BinaryOp) -> Result<ValueId> {
        let (ty, lhs, rhs) = self.parse_binop_operands()?;

        let ok = match op.operand_class() {
            OperandClass::IntOrBool => self.module.ty(ty).is_int_or_bool(),
            OperandClass::Int => self.module.ty(ty).is_int(),
            OperandClass::Float => self.module.ty(ty).is_float(),
        };

        if !ok {
            return Err(self.err(format!(
                "expected operand type to be {} but got '{}'",
                op.operand_class().description(),
                self.ty_name(ty)
            )));
        }

        self.inst(|b| b.binary(op, lhs, rhs))
    }

    fn parse_load(&mut self) -> Result<ValueId> {
        let volatile = self.eat(Tok::KwVolatile)?;
        let ty = self.parse_ty()?;

        self.expect_kind(Tok::Comma, "a comma after the 'load' type")?;
        let (ptr_ty, target) = self.parse_ty_val_pair()?;

        if !self.module.ty(ptr_ty).is_ptr() {
            return Err(self.err("can only load from a 'ptr' operand"));
        }

        if volatile {
            self.inst(|b| b.load_volatile(ty, target))
        } else {
            self.inst(|b| b.load(ty, target))
        }
    }

    fn parse_store(&mut self) -> Result<ValueId> {
        let volatile = self.eat(Tok::KwVolatile)?;
        let (_, value) = self.parse_ty_val_pair()?;

        self.expect_kind(Tok::Comma, "a comma after the 'store' operand")?;
        let (ptr_ty, target) = self.parse_ty_val_pair()?;

        if !self.module.ty(ptr_ty).is_ptr() {
            return Err(self.err("cannot store to a non-'ptr' value"));
        }

        if volatile {
            self.inst(|b| b.store_volatile(value, target))
        } else {
            self.inst(|b| b.store(value, target))
        }
    }

    fn parse_alloca(&mut self) -> Result<ValueId> {
        let ty = self.parse_ty()?;

        if !self.eat(Tok::Comma)? {
            return self.inst(|b| b.alloca(ty));
        }

        let (count_ty, count) = self.parse_ty_val_pair()?;

        if !self.module.ty(count_ty).is_int() {
            return Err(self.err(format!(
                "'alloca' object count must be an integer, got '{}'",
                self.ty_name(count_ty)
            )));
        }

        self.inst(|b| b.alloca_n(ty, count))
    }

    fn parse_offset(&mut self) -> Result<ValueId> {
        let elem_ty = self.parse_ty()?;

        self.expect_kind(Tok::Comma, "a comma after the 'offset' type")?;
        let (base_ty, base) = self.parse_ty_val_pair()?;
        if !self.module.ty(base_ty).is_ptr() {
            return Err(self.err("'offset' base must be a 'ptr' value"));
        }

        self.expect_kind(Tok::Comma, "a comma after the 'offset' base")?;
        let (index_ty, index) = self.parse_ty_val_pair()?;
        if !self.module.ty(index_ty).is_int() {
            return Err(self.err("'offset' index must be an integer"));
        }

        self.inst(|b| b.offset(elem_ty, base, index))
    }

    fn parse_elemptr(&mut self) -> Result<ValueId> {
        let agg_ty = self.parse_ty()?;

        self.expect_kind(Tok::Comma, "a comma after the 'elemptr' type")?;
        let (base_ty, base) = self.parse_ty_val_pair()?;
        if !self.module.ty(base_ty).is_ptr() {
            return Err(self.err("'elemptr' base must be a 'ptr' value"));
        }

        self.expect_kind(Tok::Comma, "a comma after the 'elemptr' base")?;
        let (_, index) = self.parse_ty_val_pair()?;
        self.check_aggregate_index(agg_ty, index, "elemptr")?;

        self.inst(|b| b.elem_ptr(agg_ty, base, index))
    }

    fn parse_extract(&mut self) -> Result<ValueId> {
        let (agg_ty, agg) = self.parse_ty_val_pair()?;

        self.expect_kind(Tok::Comma, "a comma after the 'extract' aggregate")?;
        let (_, index) = self.parse_ty_val_pair()?;
        self.check_aggregate_index(agg_ty, index, "extract")?;

        self.inst(|b| b.extract(agg, index))
    }

    fn parse_insert(&mut self) -> Result<ValueId> {
        let (agg_ty, agg) = self.parse_ty_val_pair()?;

        self.expect_kind(Tok::Comma, "a comma after the 'insert' aggregate")?;
        let (value_ty, value) = self.parse_ty_val_pair()?;

        self.expect_kind(Tok::Comma, "a comma after the 'insert' value")?;
        let (_, index) = self.parse_ty_val_pair()?;

        let elem_ty = self.check_aggregate_index(agg_ty, index, "insert")?;
        if value_ty != elem_ty {
            return Err(self.err(format!(
                "'insert' value must have the selected element's type '{}', got '{}'",
                self.ty_name(elem_ty),
                self.ty_name(value_ty)
            )));
        }

        self.inst(|b| b.insert(agg, index, value))
    }

    // the struct-needs-constant-index and bounds rules, reported as parse
    // errors rather than the builder's panics
    fn check_aggregate_index(
        &self,
        agg_ty: TyId,
        index: ValueId,
        opcode: &str,
    ) -> Result<TyId> {
        if !self.module.ty(self.module.value(index).ty()).is_int() {
            return Err(self.err(format!("'{opcode}' index must be an integer")));
        }

        let const_index = match self.module.value(index).as_constant() {
            Some(crate::value::Constant::Int(v)) => Some(v.value()),
            _ => None,
        };

        match self.module.ty(agg_ty) {
            Type::Array { element, len } => {
                if let Some(i) = const_index {
                    if i >= *len {
                        return Err(self.err(format!("'{opcode}' index must be within bounds")));
                    }
                }

                Ok(*element)
            }
            Type::Struct { fields } => {
                let i = const_index.ok_or_else(|| {
                    self.err(format!(
                        "'{opcode}' index must be a constant integer when the aggregate is a structure"
                    ))
                })?;

                if i as usize >= fields.len() {
                    return Err(self.err(format!("'{opcode}' index must be within bounds")));
                }

                Ok(fields[i as usize])
            }
            _ => Err(self.err(format!(
                "'{opcode}' only operates on arrays or structures, got '{}'",
                self.ty_name(agg_ty)
            ))),
        }
    }

    fn parse_conv(&mut self, op: ConvOp) -> Result<ValueId> {
        let into = self.parse_ty()?;
        self.expect_kind(Tok::Comma, "a comma between conversion output and input")?;
        let (from_ty, value) = self.parse_ty_val_pair()?;

        let mnemonic = op.mnemonic();
        let into_is = |pred: fn(&Type) -> bool, what: &str| -> Result<()> {
            if !pred(self.module.ty(into)) {
                return Err(self.err(format!(
                    "'{}' result type must be {}, got '{}'",
                    mnemonic,
                    what,
                    self.ty_name(into)
                )));
            }
            Ok(())
        };
        let from_is = |pred: fn(&Type) -> bool, what: &str| -> Result<()> {
            if !pred(self.module.ty(from_ty)) {
                return Err(self.err(format!(
                    "'{}' operand must be {}, got '{}'",
                    mnemonic,
                    what,
                    self.ty_name(from_ty)
                )));
            }
            Ok(())
        };

        match op {
            ConvOp::Sext | ConvOp::Zext => {
                into_is(Type::is_int, "integral")?;
                from_is(Type::is_int, "an integer")?;

                let widens = self.module.ty(from_ty).int_width()
                    < self.module.ty(into).int_width();
                if !widens {
                    return Err(self.err(format!(
                        "'{mnemonic}' must increase width, cannot shrink or leave the same"
                    )));
                }
            }
            ConvOp::Trunc => {
                into_is(Type::is_int, "integral")?;
                from_is(Type::is_int, "an integer")?;
            }
            ConvOp::IToB => {
                into_is(Type::is_bool, "'bool'")?;
                from_is(Type::is_int, "an integer")?;
            }
            ConvOp::BToI => {
                into_is(Type::is_int, "an integer")?;
                from_is(Type::is_bool, "a boolean")?;
            }
            ConvOp::IToP => {
                into_is(Type::is_ptr, "'ptr'")?;
                from_is(Type::is_int, "an integer")?;
            }
            ConvOp::PToI => {
                into_is(Type::is_int, "integral")?;
                from_is(Type::is_ptr, "a pointer")?;
            }
            ConvOp::SIToF | ConvOp::UIToF => {
                into_is(Type::is_float, "a floating-point type")?;
                from_is(Type::is_int, "an integer")?;
            }
            ConvOp::FToSI | ConvOp::FToUI => {
                into_is(Type::is_int, "an integer")?;
                from_is(Type::is_float, "a float")?;
            }
        }

        self.inst(|b| match op {
            ConvOp::Sext => b.sext(into, value),
            ConvOp::Zext => b.zext(into, value),
            ConvOp::Trunc => b.trunc(into, value),
            ConvOp::IToB => b.itob(value),
            ConvOp::BToI => b.btoi(into, value),
            ConvOp::IToP => b.itop(value),
            ConvOp::PToI => b.ptoi(into, value),
            ConvOp::SIToF => b.sitof(into, value),
            ConvOp::UIToF => b.uitof(into, value),
            ConvOp::FToSI => b.ftosi(into, value),
            ConvOp::FToUI => b.ftoui(into, value),
        })
    }
}

// the C hex-float form: [-]0x<hex>.<hex>p<exp>, with a base-2 exponent
fn parse_hex_float(raw: &str) -> Option<f64> {
    let (negative, body) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    let body = body.strip_prefix("0x")?;
    let (mantissa, exponent) = body.split_once('p')?;
    let exponent: i32 = exponent.parse().ok()?;

    let (int_part, frac_part) = mantissa.split_once('.')?;
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut value = 0.0f64;

    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }

    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }

    let value = value * 2f64.powi(exponent);
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_tokens() {
        use super::Tok::*;

        macro_rules! tokenizes {
            ( $( $source:expr => [ $($kind:expr),* $(,)? ]; )* ) => {
                $({
                    eprintln!("=== Lexing {:?} ===", $source);
                    let mut lexer = Lexer::new($source);
                    $(
                        let expected = $kind;
                        let actual = lexer.next()
                            .expect("should not have an error during lexing")
                            .expect("should not hit EOF");
                        eprintln!("Expect: {:?}", expected);
                        eprintln!("Actual: {:?}", actual);
                        assert_eq!(expected, actual.kind);
                    )*
                    assert!(lexer.next().unwrap().is_none());
                })*
            }
        }

        tokenizes! {
            "func decl i8 i16 i32 i64 f32 f64 bool ptr void" => [
                KwFunc, KwDecl, KwI8, KwI16, KwI32, KwI64, KwF32, KwF64,
                KwBool, KwPtr, KwVoid,
            ];
            "$0 $foo %entry %if.true @main" => [
                ValLabel, ValLabel, BlockLabel, BlockLabel, GlobalName,
            ];
            "( ) { } , : =" => [
                ParenOpen, ParenClose, BraceOpen, BraceClose, Comma, Colon, Eq,
            ];
            "[i8; 4]" => [BracketOpen, KwI8, Semi, LitDecimal, BracketClose];
            "42 -42 0b101 0o17 0xff" => [
                LitDecimal, LitDecimal, LitBinary, LitOctal, LitHex,
            ];
            "1.5 1.5e+3 0x1.8p3 0xfp3fc00000" => [
                LitFloatDecimal, LitFloatScientific, LitFloatCHex, LitFloatByteHex,
            ];
            "iadd fneg sext ptoi icmp eq sle uno" => [
                Opcode, Opcode, Opcode, Opcode, KwICmp, CmpOrder, CmpOrder, CmpOrder,
            ];
            "\"hello world\" \"esc \\\" aped\"" => [LitString, LitString];
            "ret i32 ; trailing comment\nret void" => [
                KwRet, KwI32, KwRet, KwVoid,
            ];
        }
    }

    #[test]
    fn test_lexer_lines() {
        let mut lexer = Lexer::new("a\n\nb ; c\nd");

        assert!(lexer.next().is_err()); // 'a' is not a token, but it has a line
        assert_eq!(lexer.line(), 1);

        let mut lexer = Lexer::new("func\n\nfunc ; comment\nfunc");
        while let Ok(Some(_)) = lexer.next() {}
        assert_eq!(lexer.line(), 4);
    }

    #[test]
    fn unknown_token_errors() {
        let err = parse("wat").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unexpected token 'wat'"), "{err}");
    }

    #[test]
    fn empty_source_is_an_empty_module() {
        let module = parse("").unwrap();
        assert_eq!(module.funcs().count(), 0);

        let module = parse("; nothing but comments\n").unwrap();
        assert_eq!(module.funcs().count(), 0);
    }

    #[test]
    fn decls_parse() {
        let module = parse("decl i32 @puts(ptr $0)").unwrap();

        let f = module.find_func("puts").expect("puts should exist");
        assert!(module.func(f).is_opaque());
        assert_eq!(module.func(f).return_ty(), module.i32_ty());
        assert_eq!(module.func(f).args().len(), 1);
    }

    #[test]
    fn numeric_labels_must_be_contiguous() {
        let err = parse("func i32 @f(i32 $0) {\n%entry:\n    $3 = iadd i32 $0, 1\n    ret i32 $3\n}")
            .unwrap_err();

        assert_eq!(err.line, 3);
        assert!(
            err.message.contains("expected next numbered value to be named '$1'"),
            "{err}"
        );
    }

    #[test]
    fn named_labels_are_unconstrained() {
        let source = "\
func i32 @f(i32 $x) {
%entry:
    $sum = iadd i32 $x, 1
    ret i32 $sum
}";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn operand_type_mismatches_are_parse_errors() {
        let err = parse("func i32 @f(i64 $0) {\n%entry:\n    $1 = iadd i32 $0, 1\n    ret i32 $1\n}")
            .unwrap_err();

        assert_eq!(err.line, 3);
        assert!(err.message.contains("expected to be of type 'i32'"), "{err}");
    }

    #[test]
    fn ret_type_must_match_the_signature() {
        let err = parse("func i32 @f() {\n%entry:\n    ret i64 3\n}").unwrap_err();
        assert!(err.message.contains("return type"), "{err}");
    }

    #[test]
    fn calls_check_their_signature() {
        let err = parse(
            "decl i32 @g(i32 $0)\n\nfunc void @f() {\n%entry:\n    call i32 @g(i64 5)\n    ret void\n}",
        )
        .unwrap_err();

        assert_eq!(err.line, 5);
        assert!(err.message.contains("arguments of the wrong type"), "{err}");
    }

    #[test]
    fn unresolved_phi_value_names_the_line() {
        let source = "\
func i32 @f(i32 $0) {
%entry:
    br %next
%next:
    $1 = phi i32 [ $9, %entry ]
    ret i32 $1
}";
        let err = parse(source).unwrap_err();
        assert_eq!(err.line, 5);
        assert!(err.message.contains("value '$9' not found"), "{err}");
    }

    #[test]
    fn unresolved_phi_block_names_the_line() {
        let source = "\
func i32 @f(i32 $0) {
%entry:
    $1 = phi i32 [ $0, %nowhere ]
    ret i32 $1
}";
        let err = parse(source).unwrap_err();
        assert!(err.message.contains("basic block '%nowhere' not found"), "{err}");
    }

    #[test]
    fn phis_may_forward_reference() {
        let source = "\
func i32 @f(i32 $0) {
%entry:
    br %header
%header:
    $1 = phi i32 [ $0, %entry ],
                 [ $2, %latch ]
    $2 = iadd i32 $1, 1
    cbr bool true, if %exit, else %latch
%latch:
    br %header
%exit:
    ret i32 $1
}";
        let module = parse(source).unwrap();
        let f = module.find_func("f").unwrap();
        let entry = module.func(f).entry().unwrap();
        assert!(!module.block(entry).is_empty());
    }

    #[test]
    fn non_phi_forward_references_are_errors() {
        let err = parse("func i32 @f() {\n%entry:\n    $0 = iadd i32 $1, 1\n    ret i32 $0\n}")
            .unwrap_err();
        assert!(err.message.contains("expected a constant"), "{err}");
    }

    #[test]
    fn unlabeled_result_instructions_are_errors() {
        let err =
            parse("func i32 @f(i32 $0) {\n%entry:\n    iadd i32 $0, 1\n    ret i32 $0\n}").unwrap_err();
        assert!(err.message.contains("expected instruction to be labeled"), "{err}");
    }

    #[test]
    fn struct_indices_must_be_constant() {
        let source = "\
func i32 @f(i64 $0) {
%entry:
    $1 = extract { i32 i32 } { 1, 2 }, i64 $0
    ret i32 $1
}";
        let err = parse(source).unwrap_err();
        assert!(err.message.contains("constant integer"), "{err}");
    }

    #[test]
    fn string_literals_unescape() {
        let source = "\
func void @f() {
%entry:
    store [i8; 3] \"a\\n\\x7f\", ptr null
    ret void
}";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn integer_literal_bases() {
        let source = "\
func void @f() {
%entry:
    $0 = iadd i32 0b101, 0o17
    $1 = iadd i32 0xff, -1
    ret void
}";
        let module = parse(source).unwrap();
        assert!(module.find_func("f").is_some());
    }

    #[test]
    fn hex_float_parses() {
        assert_eq!(parse_hex_float("0x1.8p1"), Some(3.0));
        assert_eq!(parse_hex_float("-0x1.0p-1"), Some(-0.5));
        assert_eq!(parse_hex_float("0x0.8p0"), Some(0.5));
        assert_eq!(parse_hex_float("0x1.gp1"), None);
    }

    #[test]
    fn sext_must_widen() {
        let err = parse("func i32 @f(i32 $0) {\n%entry:\n    $1 = sext i32, i32 $0\n    ret i32 $1\n}")
            .unwrap_err();
        assert!(err.message.contains("must increase width"), "{err}");
    }
}
