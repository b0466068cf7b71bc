//! Function bytecode representation

use serde::Serialize;

use crate::atom::{Atom, AtomTable};
use crate::error::{BytecodeError, Result};
use crate::primitive::{Reader, Writer};
use crate::value::Value;

/// Packed function flags
///
/// Kept as the raw wire integer so re-encoding reproduces every bit,
/// including ones this crate does not interpret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[repr(transparent)]
pub struct FunctionFlags(pub u16);

impl FunctionFlags {
    /// Bit marking a trailing debug record
    pub const HAS_DEBUG: u16 = 1 << 10;

    /// Create flags from raw bits
    #[inline]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Get raw bits
    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    const fn bit(self, n: u16) -> bool {
        (self.0 >> n) & 1 == 1
    }

    /// Function has a `prototype` property
    pub const fn has_prototype(self) -> bool {
        self.bit(0)
    }

    /// Parameters are plain identifiers without defaults or destructuring
    pub const fn has_simple_parameter_list(self) -> bool {
        self.bit(1)
    }

    /// Constructor of a class with `extends`
    pub const fn is_derived_class_constructor(self) -> bool {
        self.bit(2)
    }

    /// Method needs a home object for `super`
    pub const fn need_home_object(self) -> bool {
        self.bit(3)
    }

    /// Generator/async kind (bits 4-5)
    pub const fn func_kind(self) -> FuncKind {
        FuncKind::from_bits(((self.0 >> 4) & 0x3) as u8)
    }

    /// `new.target` is allowed
    pub const fn new_target_allowed(self) -> bool {
        self.bit(6)
    }

    /// `super()` is allowed
    pub const fn super_call_allowed(self) -> bool {
        self.bit(7)
    }

    /// `super.x` is allowed
    pub const fn super_allowed(self) -> bool {
        self.bit(8)
    }

    /// `arguments` is allowed
    pub const fn arguments_allowed(self) -> bool {
        self.bit(9)
    }

    /// A debug record follows the bytecode
    pub const fn has_debug(self) -> bool {
        self.bit(10)
    }

    /// Stack traces stop at this function
    pub const fn backtrace_barrier(self) -> bool {
        self.bit(11)
    }

    /// Copy with the debug bit set or cleared
    pub const fn with_debug(self, has_debug: bool) -> Self {
        if has_debug {
            Self(self.0 | Self::HAS_DEBUG)
        } else {
            Self(self.0 & !Self::HAS_DEBUG)
        }
    }
}

/// Function kind from flags bits 4-5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum FuncKind {
    /// Plain function
    Normal = 0,
    /// `function*`
    Generator = 1,
    /// `async function`
    Async = 2,
    /// `async function*`
    AsyncGenerator = 3,
}

impl FuncKind {
    /// Decode from the low two bits
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Normal,
            1 => Self::Generator,
            2 => Self::Async,
            _ => Self::AsyncGenerator,
        }
    }
}

/// Variable kind (4 bits)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum VarKind {
    /// Ordinary binding
    #[default]
    Normal,
    /// Hoisted function declaration
    FunctionDecl,
    /// Function declaration in a block, Annex B semantics
    NewFunctionDecl,
    /// `catch` parameter
    Catch,
    /// Name binding of a named function expression
    FunctionName,
    /// `#field`
    PrivateField,
    /// `#method()`
    PrivateMethod,
    /// `get #x()`
    PrivateGetter,
    /// `set #x()`
    PrivateSetter,
    /// Paired private getter and setter
    PrivateGetterSetter,
    /// Value with no assigned meaning, kept for re-encoding
    Reserved(u8),
}

impl VarKind {
    /// Decode the low four bits
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x0f {
            0 => Self::Normal,
            1 => Self::FunctionDecl,
            2 => Self::NewFunctionDecl,
            3 => Self::Catch,
            4 => Self::FunctionName,
            5 => Self::PrivateField,
            6 => Self::PrivateMethod,
            7 => Self::PrivateGetter,
            8 => Self::PrivateSetter,
            9 => Self::PrivateGetterSetter,
            other => Self::Reserved(other),
        }
    }

    /// Encode as four bits
    pub const fn to_bits(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::FunctionDecl => 1,
            Self::NewFunctionDecl => 2,
            Self::Catch => 3,
            Self::FunctionName => 4,
            Self::PrivateField => 5,
            Self::PrivateMethod => 6,
            Self::PrivateGetter => 7,
            Self::PrivateSetter => 8,
            Self::PrivateGetterSetter => 9,
            Self::Reserved(bits) => bits & 0x0f,
        }
    }
}

/// Local variable or argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarDef {
    /// Variable name
    pub var_name: Atom,
    /// Scope the variable is declared in
    pub scope_level: u32,
    /// Next variable in the same scope chain; `None` is the wire's -1
    pub scope_next: Option<u32>,
    /// Binding kind
    pub var_kind: VarKind,
    /// `const` binding
    pub is_const: bool,
    /// `let`/`const`/class binding
    pub is_lexical: bool,
    /// Captured by a closure
    pub is_captured: bool,
}

impl VarDef {
    const RESERVED: u8 = 0x80;

    /// Create a plain variable with no scope successor
    pub fn new(var_name: Atom) -> Self {
        Self {
            var_name,
            scope_level: 0,
            scope_next: None,
            var_kind: VarKind::Normal,
            is_const: false,
            is_lexical: false,
            is_captured: false,
        }
    }

    fn flags(&self) -> u8 {
        self.var_kind.to_bits()
            | (u8::from(self.is_const) << 4)
            | (u8::from(self.is_lexical) << 5)
            | (u8::from(self.is_captured) << 6)
    }

    /// Read a var def record
    pub fn read(reader: &mut Reader<'_>, atoms: &AtomTable) -> Result<Self> {
        let var_name = atoms.read_atom(reader)?;
        let scope_level = reader.read_leb128()?;
        let scope_next = reader.read_leb128()?.checked_sub(1);
        let offset = reader.position();
        let flags = reader.read_u8()?;
        if flags & Self::RESERVED != 0 && reader.options().strict {
            return Err(BytecodeError::ReservedBits {
                offset,
                what: "var def",
            });
        }
        Ok(Self {
            var_name,
            scope_level,
            scope_next,
            var_kind: VarKind::from_bits(flags),
            is_const: flags & (1 << 4) != 0,
            is_lexical: flags & (1 << 5) != 0,
            is_captured: flags & (1 << 6) != 0,
        })
    }

    /// Write a var def record
    pub fn write(&self, writer: &mut Writer, atoms: &AtomTable) -> Result<()> {
        atoms.write_atom(writer, &self.var_name)?;
        writer.write_leb128(self.scope_level);
        let scope_next = match self.scope_next {
            None => 0,
            Some(next) => next.checked_add(1).ok_or(BytecodeError::LengthOverflow {
                what: "scope next",
                len: next as usize,
            })?,
        };
        writer.write_leb128(scope_next);
        writer.write_u8(self.flags());
        Ok(())
    }
}

/// Variable captured from an enclosing function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosureVar {
    /// Variable name
    pub var_name: Atom,
    /// Index into the parent's locals or closure vars
    pub var_index: u32,
    /// Captured from the parent's locals (else from its closure vars)
    pub is_local: bool,
    /// Captured variable is an argument
    pub is_arg: bool,
    /// `const` binding
    pub is_const: bool,
    /// `let`/`const`/class binding
    pub is_lexical: bool,
    /// Binding kind
    pub var_kind: VarKind,
}

impl ClosureVar {
    fn flags(&self) -> u8 {
        u8::from(self.is_local)
            | (u8::from(self.is_arg) << 1)
            | (u8::from(self.is_const) << 2)
            | (u8::from(self.is_lexical) << 3)
            | (self.var_kind.to_bits() << 4)
    }

    /// Read a closure var record
    pub fn read(reader: &mut Reader<'_>, atoms: &AtomTable) -> Result<Self> {
        let var_name = atoms.read_atom(reader)?;
        let var_index = reader.read_leb128()?;
        let flags = reader.read_u8()?;
        Ok(Self {
            var_name,
            var_index,
            is_local: flags & 1 != 0,
            is_arg: flags & (1 << 1) != 0,
            is_const: flags & (1 << 2) != 0,
            is_lexical: flags & (1 << 3) != 0,
            var_kind: VarKind::from_bits(flags >> 4),
        })
    }

    /// Write a closure var record
    pub fn write(&self, writer: &mut Writer, atoms: &AtomTable) -> Result<()> {
        atoms.write_atom(writer, &self.var_name)?;
        writer.write_leb128(self.var_index);
        writer.write_u8(self.flags());
        Ok(())
    }
}

/// Source location info
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    /// Source file name
    pub file_name: Atom,
    /// Line the function starts on
    pub line_number: u32,
    /// Compressed pc-to-line table, passed through unchanged
    pub pc2line: Vec<u8>,
}

impl DebugInfo {
    /// Read a debug record
    pub fn read(reader: &mut Reader<'_>, atoms: &AtomTable) -> Result<Self> {
        let file_name = atoms.read_atom(reader)?;
        let line_number = reader.read_leb128()?;
        let len = reader.read_leb128()? as usize;
        let pc2line = reader.read_bytes(len)?.to_vec();
        Ok(Self {
            file_name,
            line_number,
            pc2line,
        })
    }

    /// Write a debug record
    pub fn write(&self, writer: &mut Writer, atoms: &AtomTable) -> Result<()> {
        atoms.write_atom(writer, &self.file_name)?;
        writer.write_leb128(self.line_number);
        writer.write_len("pc2line", self.pc2line.len())?;
        writer.write_bytes(&self.pc2line);
        Ok(())
    }
}

/// A compiled function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionBytecode {
    /// Packed flags
    pub flags: FunctionFlags,
    /// Strict-mode and related bits
    pub js_mode: u8,
    /// Function name
    pub func_name: Atom,
    /// Declared parameter count
    pub arg_count: u32,
    /// Non-argument local count
    pub var_count: u32,
    /// Parameters before the first default or rest parameter
    pub defined_arg_count: u32,
    /// Maximum operand stack depth
    pub stack_size: u32,
    /// Arguments then variables
    pub locals: Vec<VarDef>,
    /// Captured variables
    pub closure_vars: Vec<ClosureVar>,
    /// Opaque instruction bytes
    pub bytecode: Vec<u8>,
    /// Values referenced by the bytecode, possibly nested functions
    pub constant_pool: Vec<Value>,
    /// Present iff `flags.has_debug()`
    pub debug: Option<DebugInfo>,
}

impl FunctionBytecode {
    /// Create an empty function with the given name
    pub fn new(func_name: Atom) -> Self {
        Self {
            flags: FunctionFlags::default(),
            js_mode: 0,
            func_name,
            arg_count: 0,
            var_count: 0,
            defined_arg_count: 0,
            stack_size: 0,
            locals: Vec::new(),
            closure_vars: Vec::new(),
            bytecode: Vec::new(),
            constant_pool: Vec::new(),
            debug: None,
        }
    }

    /// Function name text, if it is a string atom
    pub fn name_str(&self) -> Option<&str> {
        self.func_name.as_str()
    }

    /// Attach debug info, setting the debug flag to match
    pub fn set_debug(&mut self, debug: Option<DebugInfo>) {
        self.flags = self.flags.with_debug(debug.is_some());
        self.debug = debug;
    }

    /// Read a function body (after its tag byte). Constant pool entries are
    /// decoded last, through `read_value`.
    pub fn read<F>(reader: &mut Reader<'_>, atoms: &AtomTable, mut read_value: F) -> Result<Self>
    where
        F: FnMut(&mut Reader<'_>) -> Result<Value>,
    {
        let flags = FunctionFlags(reader.read_u16()?);
        let js_mode = reader.read_u8()?;
        let func_name = atoms.read_atom(reader)?;
        let arg_count = reader.read_leb128()?;
        let var_count = reader.read_leb128()?;
        let defined_arg_count = reader.read_leb128()?;
        let stack_size = reader.read_leb128()?;
        let closure_var_count = reader.read_leb128()? as usize;
        let constant_pool_count = reader.read_leb128()? as usize;
        let bytecode_len = reader.read_leb128()? as usize;
        let local_count = reader.read_leb128()? as usize;

        let mut locals = Vec::with_capacity(local_count.min(reader.remaining()));
        for _ in 0..local_count {
            locals.push(VarDef::read(reader, atoms)?);
        }

        let mut closure_vars = Vec::with_capacity(closure_var_count.min(reader.remaining()));
        for _ in 0..closure_var_count {
            closure_vars.push(ClosureVar::read(reader, atoms)?);
        }

        let bytecode = reader.read_bytes(bytecode_len)?.to_vec();

        let debug = if flags.has_debug() {
            Some(DebugInfo::read(reader, atoms)?)
        } else {
            None
        };

        #[cfg(feature = "codec_logging")]
        tracing::trace!(
            target: "otter::qjs_bytecode",
            name = %func_name,
            bytecode_len,
            locals = local_count,
            constants = constant_pool_count,
            "Read function header"
        );

        let mut constant_pool = Vec::with_capacity(constant_pool_count.min(reader.remaining()));
        for _ in 0..constant_pool_count {
            constant_pool.push(read_value(reader)?);
        }

        Ok(Self {
            flags,
            js_mode,
            func_name,
            arg_count,
            var_count,
            defined_arg_count,
            stack_size,
            locals,
            closure_vars,
            bytecode,
            constant_pool,
            debug,
        })
    }

    /// Write a function body (after its tag byte), field for field in read
    /// order. Constant pool entries are written through `write_value`.
    pub fn write<F>(&self, writer: &mut Writer, atoms: &AtomTable, mut write_value: F) -> Result<()>
    where
        F: FnMut(&mut Writer, &Value) -> Result<()>,
    {
        if self.flags.has_debug() != self.debug.is_some() {
            return Err(BytecodeError::DebugFlagMismatch);
        }

        writer.write_u16(self.flags.bits());
        writer.write_u8(self.js_mode);
        atoms.write_atom(writer, &self.func_name)?;
        writer.write_leb128(self.arg_count);
        writer.write_leb128(self.var_count);
        writer.write_leb128(self.defined_arg_count);
        writer.write_leb128(self.stack_size);
        writer.write_len("closure vars", self.closure_vars.len())?;
        writer.write_len("constant pool", self.constant_pool.len())?;
        writer.write_len("bytecode", self.bytecode.len())?;
        writer.write_len("locals", self.locals.len())?;

        for local in &self.locals {
            local.write(writer, atoms)?;
        }
        for closure_var in &self.closure_vars {
            closure_var.write(writer, atoms)?;
        }
        writer.write_bytes(&self.bytecode);
        if let Some(debug) = &self.debug {
            debug.write(writer, atoms)?;
        }
        for value in &self.constant_pool {
            write_value(writer, value)?;
        }
        Ok(())
    }
}
