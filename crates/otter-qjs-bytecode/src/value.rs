//! Tagged values of a bytecode object stream

use std::borrow::Cow;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::function::FunctionBytecode;

/// Object tags
///
/// One byte precedes every value in the stream. Only the primitive tags and
/// [`Tag::FunctionBytecode`] are implemented; the rest are recognized so they
/// can be reported instead of misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Tag {
    /// `null`
    Null = 1,
    /// `undefined`
    Undefined = 2,
    /// `false`
    BoolFalse = 3,
    /// `true`
    BoolTrue = 4,
    /// Signed varint payload
    Int32 = 5,
    /// 8-byte double payload
    Float64 = 6,
    /// Length-prefixed string payload
    String = 7,
    /// Plain object
    Object = 8,
    /// Array
    Array = 9,
    /// BigInt
    BigInt = 10,
    /// BigFloat
    BigFloat = 11,
    /// BigDecimal
    BigDecimal = 12,
    /// Template object
    TemplateObject = 13,
    /// Compiled function
    FunctionBytecode = 14,
    /// ES module
    Module = 15,
    /// Typed array
    TypedArray = 16,
    /// ArrayBuffer
    ArrayBuffer = 17,
    /// SharedArrayBuffer
    SharedArrayBuffer = 18,
    /// Date
    Date = 19,
    /// Boxed primitive
    ObjectValue = 20,
    /// Back-reference to an earlier object
    ObjectReference = 21,
}

impl Tag {
    /// Decode a tag byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Null),
            2 => Some(Self::Undefined),
            3 => Some(Self::BoolFalse),
            4 => Some(Self::BoolTrue),
            5 => Some(Self::Int32),
            6 => Some(Self::Float64),
            7 => Some(Self::String),
            8 => Some(Self::Object),
            9 => Some(Self::Array),
            10 => Some(Self::BigInt),
            11 => Some(Self::BigFloat),
            12 => Some(Self::BigDecimal),
            13 => Some(Self::TemplateObject),
            14 => Some(Self::FunctionBytecode),
            15 => Some(Self::Module),
            16 => Some(Self::TypedArray),
            17 => Some(Self::ArrayBuffer),
            18 => Some(Self::SharedArrayBuffer),
            19 => Some(Self::Date),
            20 => Some(Self::ObjectValue),
            21 => Some(Self::ObjectReference),
            _ => None,
        }
    }

    /// Get the tag byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Get the name of this tag
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Undefined => "Undefined",
            Self::BoolFalse => "BoolFalse",
            Self::BoolTrue => "BoolTrue",
            Self::Int32 => "Int32",
            Self::Float64 => "Float64",
            Self::String => "String",
            Self::Object => "Object",
            Self::Array => "Array",
            Self::BigInt => "BigInt",
            Self::BigFloat => "BigFloat",
            Self::BigDecimal => "BigDecimal",
            Self::TemplateObject => "TemplateObject",
            Self::FunctionBytecode => "FunctionBytecode",
            Self::Module => "Module",
            Self::TypedArray => "TypedArray",
            Self::ArrayBuffer => "ArrayBuffer",
            Self::SharedArrayBuffer => "SharedArrayBuffer",
            Self::Date => "Date",
            Self::ObjectValue => "ObjectValue",
            Self::ObjectReference => "ObjectReference",
        }
    }

    /// Check if this codec reads and writes values with this tag
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::Undefined
                | Self::BoolFalse
                | Self::BoolTrue
                | Self::Int32
                | Self::Float64
                | Self::String
                | Self::FunctionBytecode
        )
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// String as stored on the wire
///
/// The payload bytes are kept verbatim alongside the wide-char bit. They are
/// normally UTF-8, but nothing guarantees it when `wide` is set, so text
/// access is fallible.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsString {
    wide: bool,
    bytes: Vec<u8>,
}

impl JsString {
    /// Create a narrow string from UTF-8 text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            wide: false,
            bytes: text.into().into_bytes(),
        }
    }

    /// Create a string from its wire parts
    pub fn from_raw(wide: bool, bytes: Vec<u8>) -> Self {
        Self { wide, bytes }
    }

    /// The wide-char bit
    #[inline]
    pub fn is_wide(&self) -> bool {
        self.wide
    }

    /// Raw payload bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Payload as text, replacing invalid sequences
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl From<&str> for JsString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl Serialize for JsString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

/// A decoded value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int32(i32),
    /// Double
    Float64(f64),
    /// String
    String(JsString),
    /// Compiled function
    FunctionBytecode(Box<FunctionBytecode>),
}

impl Value {
    /// Tag this value is written with
    pub fn tag(&self) -> Tag {
        match self {
            Self::Null => Tag::Null,
            Self::Undefined => Tag::Undefined,
            Self::Bool(false) => Tag::BoolFalse,
            Self::Bool(true) => Tag::BoolTrue,
            Self::Int32(_) => Tag::Int32,
            Self::Float64(_) => Tag::Float64,
            Self::String(_) => Tag::String,
            Self::FunctionBytecode(_) => Tag::FunctionBytecode,
        }
    }

    /// JavaScript-style type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Int32(_) | Self::Float64(_) => "number",
            Self::String(_) => "string",
            Self::FunctionBytecode(_) => "function",
        }
    }

    /// Get as function if this is function bytecode
    pub fn as_function(&self) -> Option<&FunctionBytecode> {
        match self {
            Self::FunctionBytecode(function) => Some(function),
            _ => None,
        }
    }

    /// Get as string if this is a string
    pub fn as_string(&self) -> Option<&JsString> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<FunctionBytecode> for Value {
    fn from(function: FunctionBytecode) -> Self {
        Self::FunctionBytecode(Box::new(function))
    }
}
