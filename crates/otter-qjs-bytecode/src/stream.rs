//! Stream entry points and tag dispatch

use serde::Serialize;

use crate::atom::AtomTable;
use crate::error::{BytecodeError, Result};
use crate::function::FunctionBytecode;
use crate::options::CodecOptions;
use crate::primitive::{Reader, Writer};
use crate::value::{Tag, Value};

/// Recursive value reader/writer bound to one atom table
struct ValueCodec<'t> {
    atoms: &'t AtomTable,
    options: CodecOptions,
}

impl ValueCodec<'_> {
    fn enter_function(&self, depth: usize) -> Result<()> {
        if !self.options.allow_bytecode {
            return Err(BytecodeError::BytecodeNotAllowed);
        }
        if depth >= self.options.max_depth {
            return Err(BytecodeError::DepthLimitExceeded {
                limit: self.options.max_depth,
            });
        }
        Ok(())
    }

    /// `depth` counts the functions enclosing this value
    fn read_value(&self, reader: &mut Reader<'_>, depth: usize) -> Result<Value> {
        let offset = reader.position();
        let byte = reader.read_u8()?;
        let tag = Tag::from_byte(byte).ok_or(BytecodeError::InvalidTag { offset, byte })?;

        match tag {
            Tag::Null => Ok(Value::Null),
            Tag::Undefined => Ok(Value::Undefined),
            Tag::BoolFalse => Ok(Value::Bool(false)),
            Tag::BoolTrue => Ok(Value::Bool(true)),
            Tag::Int32 => Ok(Value::Int32(reader.read_sleb128()?)),
            Tag::Float64 => Ok(Value::Float64(reader.read_f64()?)),
            Tag::String => Ok(Value::String(reader.read_js_string()?)),
            Tag::FunctionBytecode => {
                self.enter_function(depth)?;
                let function = FunctionBytecode::read(reader, self.atoms, |reader| {
                    self.read_value(reader, depth + 1)
                })?;
                Ok(Value::FunctionBytecode(Box::new(function)))
            }
            Tag::Object
            | Tag::Array
            | Tag::BigInt
            | Tag::BigFloat
            | Tag::BigDecimal
            | Tag::TemplateObject
            | Tag::Module
            | Tag::TypedArray
            | Tag::ArrayBuffer
            | Tag::SharedArrayBuffer
            | Tag::Date
            | Tag::ObjectValue
            | Tag::ObjectReference => Err(BytecodeError::UnsupportedTag(tag)),
        }
    }

    fn write_value(&self, writer: &mut Writer, value: &Value, depth: usize) -> Result<()> {
        if let Value::FunctionBytecode(_) = value {
            self.enter_function(depth)?;
        }
        writer.write_u8(value.tag().to_byte());
        match value {
            Value::Null | Value::Undefined | Value::Bool(_) => {}
            Value::Int32(n) => writer.write_sleb128(*n),
            Value::Float64(n) => writer.write_f64(*n),
            Value::String(s) => writer.write_js_string(s)?,
            Value::FunctionBytecode(function) => {
                function.write(writer, self.atoms, |writer, value| {
                    self.write_value(writer, value, depth + 1)
                })?;
            }
        }
        Ok(())
    }
}

/// Single-use decoding session over one buffer
///
/// [`Decoder::decode`] consumes the session, so a buffer and its atom table
/// are read exactly once.
#[derive(Debug)]
pub struct Decoder<'a> {
    reader: Reader<'a>,
}

impl<'a> Decoder<'a> {
    /// Create a decoder with default options
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_options(bytes, CodecOptions::default())
    }

    /// Create a decoder with the given options
    pub fn with_options(bytes: &'a [u8], options: CodecOptions) -> Self {
        Self {
            reader: Reader::with_options(bytes, options),
        }
    }

    /// Read the atom header and exactly one value
    pub fn decode(mut self) -> Result<ObjectStream> {
        let atoms = AtomTable::read(&mut self.reader)?;
        let options = *self.reader.options();
        let value = ValueCodec {
            atoms: &atoms,
            options,
        }
        .read_value(&mut self.reader, 0)?;

        if options.strict && !self.reader.is_empty() {
            return Err(BytecodeError::TrailingBytes {
                offset: self.reader.position(),
                remaining: self.reader.remaining(),
            });
        }

        #[cfg(feature = "codec_logging")]
        tracing::debug!(
            target: "otter::qjs_bytecode",
            bytes = self.reader.position(),
            root = value.type_name(),
            "Decoded bytecode object"
        );

        Ok(ObjectStream { atoms, value })
    }
}

/// Writes value trees against the atom table that produced them
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'t> {
    atoms: &'t AtomTable,
    options: CodecOptions,
}

impl<'t> Encoder<'t> {
    /// Create an encoder with default options
    pub fn new(atoms: &'t AtomTable) -> Self {
        Self::with_options(atoms, CodecOptions::default())
    }

    /// Create an encoder with the given options
    pub fn with_options(atoms: &'t AtomTable, options: CodecOptions) -> Self {
        Self { atoms, options }
    }

    /// Write the atom header followed by `value`
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut writer = Writer::with_options(&self.options);
        self.atoms.write(&mut writer)?;
        ValueCodec {
            atoms: self.atoms,
            options: self.options,
        }
        .write_value(&mut writer, value, 0)?;

        #[cfg(feature = "codec_logging")]
        tracing::debug!(
            target: "otter::qjs_bytecode",
            bytes = writer.len(),
            root = value.type_name(),
            "Encoded bytecode object"
        );

        Ok(writer.into_bytes())
    }
}

/// A decoded stream: its atom table and top-level value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStream {
    /// Atoms declared by the stream header
    pub atoms: AtomTable,
    /// Top-level value
    pub value: Value,
}

impl ObjectStream {
    /// Create a stream from parts
    pub fn new(atoms: AtomTable, value: Value) -> Self {
        Self { atoms, value }
    }

    /// Decode from bytes with default options
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Decoder::new(bytes).decode()
    }

    /// Encode to bytes with default options
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Encoder::new(&self.atoms).encode(&self.value)
    }

    /// Split into atom table and value
    pub fn into_parts(self) -> (AtomTable, Value) {
        (self.atoms, self.value)
    }

    /// Pretty JSON dump of the tree for inspection. Non-finite doubles
    /// come out as `null`.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
