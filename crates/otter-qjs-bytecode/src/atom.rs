//! Atoms and the per-stream atom table

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::BC_VERSION;
use crate::builtin_atoms::{BUILTIN_ATOM_COUNT, BUILTIN_ATOMS};
use crate::error::{BytecodeError, Result};
use crate::primitive::{Reader, Writer};
use crate::value::JsString;

/// Largest value an inline integer atom can carry next to its type bit
pub const MAX_INLINE_ATOM: u32 = u32::MAX >> 1;

/// Atom reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Atom {
    /// Small integer carried inline, never looked up
    Int(u32),
    /// Interned string, by id into builtin ∪ dynamic atoms
    String {
        /// Atom id
        index: u32,
        /// Resolved text
        value: String,
    },
}

impl Atom {
    /// Text of a string atom
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String { value, .. } => Some(value),
            Self::Int(_) => None,
        }
    }

    /// Id of a string atom
    pub fn index(&self) -> Option<u32> {
        match self {
            Self::String { index, .. } => Some(*index),
            Self::Int(_) => None,
        }
    }

    /// Check if this is an inline integer
    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::String { value, .. } => f.write_str(value),
        }
    }
}

fn builtin_index() -> &'static FxHashMap<&'static str, u32> {
    static INDEX: OnceLock<FxHashMap<&'static str, u32>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index = FxHashMap::default();
        for (id, name) in BUILTIN_ATOMS.iter().enumerate() {
            index.entry(*name).or_insert(id as u32);
        }
        index
    })
}

/// Atom table of one stream
///
/// Ids below [`BUILTIN_ATOM_COUNT`] name builtin atoms; the rest index the
/// dynamic atoms listed in the stream header. Built once per stream and only
/// read afterwards. An encoder must be handed the table that decoded the
/// tree it writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AtomTable {
    dynamic: Vec<JsString>,
    #[serde(skip)]
    lookup: FxHashMap<String, u32>,
}

impl AtomTable {
    /// Create a table from dynamic atoms in declaration order
    pub fn new(dynamic: Vec<JsString>) -> Self {
        let mut lookup = FxHashMap::default();
        for (offset, atom) in dynamic.iter().enumerate() {
            if let Some(text) = atom.as_str() {
                lookup
                    .entry(text.to_owned())
                    .or_insert((BUILTIN_ATOM_COUNT + offset) as u32);
            }
        }
        Self { dynamic, lookup }
    }

    /// Create a table from narrow UTF-8 atoms
    pub fn from_strings<I, S>(atoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(atoms.into_iter().map(JsString::new).collect())
    }

    /// Read the stream header: version byte, atom count, atom strings
    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let version = reader.read_u8()?;
        if version != BC_VERSION {
            return Err(BytecodeError::UnsupportedVersion {
                found: version,
                expected: BC_VERSION,
            });
        }

        let count = reader.read_leb128()? as usize;
        if count > MAX_INLINE_ATOM as usize - BUILTIN_ATOM_COUNT {
            return Err(BytecodeError::LengthOverflow {
                what: "atom table",
                len: count,
            });
        }
        // Every atom takes at least one byte
        let mut dynamic = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            dynamic.push(reader.read_js_string()?);
        }

        #[cfg(feature = "codec_logging")]
        tracing::debug!(
            target: "otter::qjs_bytecode",
            version,
            atoms = count,
            header_bytes = reader.position(),
            "Read atom table"
        );

        Ok(Self::new(dynamic))
    }

    /// Write the stream header
    pub fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u8(BC_VERSION);
        writer.write_len("atom table", self.dynamic.len())?;
        for atom in &self.dynamic {
            writer.write_js_string(atom)?;
        }
        Ok(())
    }

    /// Number of builtin atoms
    #[inline]
    pub fn builtin_count(&self) -> usize {
        BUILTIN_ATOM_COUNT
    }

    /// Builtin plus dynamic atom count
    #[inline]
    pub fn atom_count(&self) -> usize {
        BUILTIN_ATOM_COUNT + self.dynamic.len()
    }

    /// Dynamic atoms in declaration order
    #[inline]
    pub fn dynamic(&self) -> &[JsString] {
        &self.dynamic
    }

    /// Resolve an atom id to its text
    pub fn resolve(&self, index: u32) -> Result<Cow<'_, str>> {
        let id = index as usize;
        if id < BUILTIN_ATOM_COUNT {
            return Ok(Cow::Borrowed(BUILTIN_ATOMS[id]));
        }
        self.dynamic
            .get(id - BUILTIN_ATOM_COUNT)
            .map(JsString::to_string_lossy)
            .ok_or_else(|| BytecodeError::AtomOutOfRange {
                index,
                len: self.atom_count(),
            })
    }

    /// Find the id for some text, preferring builtins
    pub fn index_of(&self, text: &str) -> Option<u32> {
        builtin_index()
            .get(text)
            .or_else(|| self.lookup.get(text))
            .copied()
    }

    /// Build an atom handle for some text already in the table
    pub fn atom(&self, text: &str) -> Option<Atom> {
        self.index_of(text).map(|index| Atom::String {
            index,
            value: text.to_owned(),
        })
    }

    /// Read an atom reference: bit 0 set means inline integer
    pub fn read_atom(&self, reader: &mut Reader<'_>) -> Result<Atom> {
        let value_and_type = reader.read_leb128()?;
        let value = value_and_type >> 1;
        if value_and_type & 1 == 1 {
            return Ok(Atom::Int(value));
        }
        Ok(Atom::String {
            index: value,
            value: self.resolve(value)?.into_owned(),
        })
    }

    /// Write an atom reference. String atoms must name an entry of this table
    /// with the same text.
    pub fn write_atom(&self, writer: &mut Writer, atom: &Atom) -> Result<()> {
        match atom {
            Atom::Int(value) => {
                if *value > MAX_INLINE_ATOM {
                    return Err(BytecodeError::AtomMismatch { index: *value });
                }
                writer.write_leb128((value << 1) | 1);
            }
            Atom::String { index, value } => {
                let mismatch = BytecodeError::AtomMismatch { index: *index };
                let resolved = self.resolve(*index).map_err(|_| mismatch.clone())?;
                if resolved != value.as_str() {
                    return Err(mismatch);
                }
                writer.write_leb128(index << 1);
            }
        }
        Ok(())
    }
}
