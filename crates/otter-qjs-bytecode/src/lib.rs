//! # Otter QuickJS Bytecode
//!
//! Reader and writer for the QuickJS "bytecode object" serialization format,
//! the stream `JS_WriteObject` produces for compiled functions and primitive
//! values.
//!
//! ## Design Principles
//!
//! - **Byte-exact**: decoding a stream and encoding the tree with the same
//!   [`AtomTable`] reproduces the input bytes
//! - **Opaque bytecode**: instruction bytes are carried through untouched
//! - **Fail fast**: declared lengths are checked before any bulk read, and
//!   out-of-scope tags are reported instead of skipped
//!
//! A stream is `version atoms value`: a version byte, the stream's dynamic
//! atom table, then one tagged value (usually a [`FunctionBytecode`] whose
//! constant pool nests further values).

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod atom;
pub mod builtin_atoms;
pub mod error;
pub mod function;
pub mod options;
pub mod primitive;
pub mod stream;
pub mod value;

pub use atom::{Atom, AtomTable};
pub use error::{BytecodeError, ErrorKind, Result};
pub use function::{
    ClosureVar, DebugInfo, FuncKind, FunctionBytecode, FunctionFlags, VarDef, VarKind,
};
pub use options::CodecOptions;
pub use primitive::{Reader, Writer};
pub use stream::{Decoder, Encoder, ObjectStream};
pub use value::{JsString, Tag, Value};

/// Bytecode object format version. Streams with any other version byte are
/// rejected.
pub const BC_VERSION: u8 = 1;
