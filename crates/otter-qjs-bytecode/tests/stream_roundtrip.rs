//! Stream decode/encode tests
//!
//! Streams are assembled by hand so the expected bytes do not depend on the
//! crate's own writer.

use otter_qjs_bytecode::builtin_atoms::BUILTIN_ATOM_COUNT;
use otter_qjs_bytecode::{
    Atom, AtomTable, BC_VERSION, BytecodeError, ClosureVar, CodecOptions, Decoder, Encoder,
    ErrorKind, FunctionBytecode, FunctionFlags, JsString, ObjectStream, Tag, Value, VarDef,
    VarKind,
};

const TAG_INT32: u8 = 5;
const TAG_FLOAT64: u8 = 6;
const TAG_STRING: u8 = 7;
const TAG_ARRAY: u8 = 9;
const TAG_FUNCTION: u8 = 14;

const ATOM_NAME: u32 = 54;
const ATOM_EVAL: u32 = 80;
const HAS_DEBUG: u16 = 1 << 10;

fn leb(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn header(atoms: &[&str]) -> Vec<u8> {
    let mut out = vec![BC_VERSION];
    leb(&mut out, atoms.len() as u32);
    for atom in atoms {
        leb(&mut out, (atom.len() as u32) << 1);
        out.extend_from_slice(atom.as_bytes());
    }
    out
}

fn dynamic(offset: u32) -> u32 {
    BUILTIN_ATOM_COUNT as u32 + offset
}

/// Hand-assembled function body, minus the tag byte
struct FunctionFixture {
    flags: u16,
    name: u32,
    arg_count: u32,
    stack_size: u32,
    /// (name atom id, scope level, scope next + 1, flags)
    locals: Vec<(u32, u32, u32, u8)>,
    bytecode: Vec<u8>,
    /// (file atom id, line, pc2line)
    debug: Option<(u32, u32, Vec<u8>)>,
    /// Encoded child values, tag included
    constants: Vec<Vec<u8>>,
}

impl FunctionFixture {
    fn new(name: u32) -> Self {
        Self {
            flags: 0,
            name,
            arg_count: 0,
            stack_size: 0,
            locals: Vec::new(),
            bytecode: Vec::new(),
            debug: None,
            constants: Vec::new(),
        }
    }

    fn value(&self, flag_bytes: impl Fn(u16) -> [u8; 2]) -> Vec<u8> {
        let mut out = vec![TAG_FUNCTION];
        out.extend_from_slice(&flag_bytes(self.flags));
        out.push(0); // js_mode
        leb(&mut out, self.name << 1);
        leb(&mut out, self.arg_count);
        leb(&mut out, self.locals.len() as u32 - self.arg_count.min(self.locals.len() as u32));
        leb(&mut out, self.arg_count);
        leb(&mut out, self.stack_size);
        leb(&mut out, 0); // closure vars
        leb(&mut out, self.constants.len() as u32);
        leb(&mut out, self.bytecode.len() as u32);
        leb(&mut out, self.locals.len() as u32);
        for (name, level, next, flags) in &self.locals {
            leb(&mut out, name << 1);
            leb(&mut out, *level);
            leb(&mut out, *next);
            out.push(*flags);
        }
        out.extend_from_slice(&self.bytecode);
        if let Some((file, line, pc2line)) = &self.debug {
            leb(&mut out, file << 1);
            leb(&mut out, *line);
            leb(&mut out, pc2line.len() as u32);
            out.extend_from_slice(pc2line);
        }
        for constant in &self.constants {
            out.extend_from_slice(constant);
        }
        out
    }

    fn native(&self) -> Vec<u8> {
        self.value(u16::to_ne_bytes)
    }
}

/// `function greet(name) { return "hello, " + name; }` compiled as a script
fn greet_stream() -> Vec<u8> {
    let mut greet = FunctionFixture::new(dynamic(0));
    greet.flags = HAS_DEBUG | 0x0243;
    greet.arg_count = 1;
    greet.stack_size = 2;
    greet.locals.push((ATOM_NAME, 0, 0, 0));
    greet.bytecode = vec![0x04, 0x00, 0x00, 0x00, 0x00, 0xd1, 0x9d, 0x28];
    greet.debug = Some((dynamic(1), 1, vec![0x0d, 0x0e, 0x0c]));

    let mut eval = FunctionFixture::new(ATOM_EVAL);
    eval.flags = HAS_DEBUG | 0x0240;
    eval.stack_size = 2;
    eval.bytecode = vec![0xbe, 0x00, 0x40, 0x3f, 0xe1, 0x00, 0x00, 0x00, 0x29];
    eval.debug = Some((dynamic(1), 1, vec![0x00, 0x06, 0x00]));
    eval.constants.push(greet.native());

    let mut bytes = header(&["greet", "hello.js"]);
    bytes.extend_from_slice(&eval.native());
    bytes
}

#[test]
fn test_decode_and_encode_greet() {
    let bytes = greet_stream();
    let decoded = ObjectStream::from_bytes(&bytes).unwrap();

    let eval = decoded.value.as_function().unwrap();
    assert_eq!(eval.name_str(), Some("<eval>"));
    let debug = eval.debug.as_ref().unwrap();
    assert_eq!(debug.file_name.as_str(), Some("hello.js"));
    assert_eq!(debug.line_number, 1);
    assert_eq!(eval.constant_pool.len(), 1);

    let greet = eval.constant_pool[0].as_function().unwrap();
    assert_eq!(greet.name_str(), Some("greet"));
    assert_eq!(greet.arg_count, 1);
    assert_eq!(greet.locals.len(), 1);
    assert_eq!(greet.locals[0].var_name.as_str(), Some("name"));
    assert_eq!(greet.locals[0].scope_next, None);
    assert_eq!(greet.debug.as_ref().unwrap().file_name.as_str(), Some("hello.js"));
    assert_eq!(greet.debug.as_ref().unwrap().line_number, 1);
    assert_eq!(greet.bytecode.len(), 8);
    assert!(greet.flags.has_prototype());
    assert!(greet.flags.has_simple_parameter_list());
    assert!(greet.flags.arguments_allowed());
    assert!(!greet.flags.backtrace_barrier());

    // Byte-for-byte equality needs the decoder's atom table
    let encoded = Encoder::new(&decoded.atoms).encode(&decoded.value).unwrap();
    assert_eq!(encoded, bytes);
}

#[test]
fn test_debug_flag_clear_reads_no_debug_record() {
    let mut function = FunctionFixture::new(ATOM_EVAL);
    function.bytecode = vec![0x29];
    // Would be misread as a debug record if the flag were ignored
    function.constants.push(vec![TAG_INT32, 0x54]);

    let mut bytes = header(&[]);
    bytes.extend_from_slice(&function.native());

    let decoded = ObjectStream::from_bytes(&bytes).unwrap();
    let function = decoded.value.as_function().unwrap();
    assert!(!function.flags.has_debug());
    assert!(function.debug.is_none());
    assert_eq!(function.constant_pool, vec![Value::Int32(42)]);
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn test_unsupported_tag_in_constant_pool() {
    let mut function = FunctionFixture::new(ATOM_EVAL);
    function.constants.push(vec![TAG_INT32, 0x02]);
    function.constants.push(vec![TAG_ARRAY, 0x00]);

    let mut bytes = header(&[]);
    bytes.extend_from_slice(&function.native());

    let err = ObjectStream::from_bytes(&bytes).unwrap_err();
    assert_eq!(err, BytecodeError::UnsupportedTag(Tag::Array));
    assert_eq!(err.kind(), ErrorKind::UnsupportedTag);
    assert_eq!(err.to_string(), "Unsupported tag: Array");
}

#[test]
fn test_top_level_unsupported_tags() {
    for (byte, tag) in [(8, Tag::Object), (9, Tag::Array), (10, Tag::BigInt)] {
        let mut bytes = header(&[]);
        bytes.push(byte);
        let err = ObjectStream::from_bytes(&bytes).unwrap_err();
        assert_eq!(err, BytecodeError::UnsupportedTag(tag));
    }
}

#[test]
fn test_invalid_top_level_tag() {
    let mut bytes = header(&["unused"]);
    let offset = bytes.len();
    bytes.push(0x42);
    let err = ObjectStream::from_bytes(&bytes).unwrap_err();
    assert_eq!(err, BytecodeError::InvalidTag { offset, byte: 0x42 });
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_version_mismatch() {
    let mut bytes = greet_stream();
    bytes[0] = BC_VERSION + 1;
    let err = ObjectStream::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, BytecodeError::UnsupportedVersion { .. }));
}

#[test]
fn test_truncated_stream() {
    let bytes = greet_stream();
    for len in [1, 10, bytes.len() / 2, bytes.len() - 1] {
        let err = ObjectStream::from_bytes(&bytes[..len]).unwrap_err();
        assert!(err.is_format_error(), "len {len}: {err:?}");
    }
}

#[test]
fn test_atom_out_of_range() {
    let function = FunctionFixture::new(dynamic(5));
    let mut bytes = header(&["only"]);
    bytes.extend_from_slice(&function.native());

    let err = ObjectStream::from_bytes(&bytes).unwrap_err();
    assert_eq!(
        err,
        BytecodeError::AtomOutOfRange {
            index: dynamic(5),
            len: BUILTIN_ATOM_COUNT + 1
        }
    );
}

fn nested(depth: usize) -> Vec<u8> {
    let mut value = vec![TAG_INT32, 0x00];
    for _ in 0..depth {
        let mut function = FunctionFixture::new(ATOM_EVAL);
        function.constants.push(value);
        value = function.native();
    }
    let mut bytes = header(&[]);
    bytes.extend_from_slice(&value);
    bytes
}

#[test]
fn test_depth_limit() {
    let bytes = nested(3);
    assert!(ObjectStream::from_bytes(&bytes).is_ok());

    let options = CodecOptions::new().max_depth(3);
    assert!(Decoder::with_options(&bytes, options).decode().is_ok());

    let options = CodecOptions::new().max_depth(2);
    let err = Decoder::with_options(&bytes, options).decode().unwrap_err();
    assert_eq!(err, BytecodeError::DepthLimitExceeded { limit: 2 });
}

#[test]
fn test_depth_limit_on_encode() {
    let decoded = ObjectStream::from_bytes(&nested(2)).unwrap();
    let options = CodecOptions::new().max_depth(1);
    let err = Encoder::with_options(&decoded.atoms, options)
        .encode(&decoded.value)
        .unwrap_err();
    assert_eq!(err, BytecodeError::DepthLimitExceeded { limit: 1 });
}

#[test]
fn test_bytecode_not_allowed() {
    let options = CodecOptions::new().allow_bytecode(false);
    let err = Decoder::with_options(&greet_stream(), options)
        .decode()
        .unwrap_err();
    assert_eq!(err, BytecodeError::BytecodeNotAllowed);

    // Primitive streams are still fine
    let mut bytes = header(&[]);
    bytes.extend_from_slice(&[TAG_INT32, 0x02]);
    let decoded = Decoder::with_options(&bytes, options).decode().unwrap();
    assert_eq!(decoded.value, Value::Int32(1));
}

#[test]
fn test_byte_swapped_stream() {
    let mut function = FunctionFixture::new(ATOM_EVAL);
    function.flags = HAS_DEBUG | 0x0001;
    function.debug = Some((ATOM_NAME, 7, vec![]));
    function.constants.push({
        let mut float = vec![TAG_FLOAT64];
        float.extend_from_slice(&1.5f64.to_bits().swap_bytes().to_ne_bytes());
        float
    });

    let mut bytes = header(&[]);
    bytes.extend_from_slice(&function.value(|flags| flags.swap_bytes().to_ne_bytes()));

    let options = CodecOptions::new().byte_swap(true);
    let decoded = Decoder::with_options(&bytes, options).decode().unwrap();
    let decoded_function = decoded.value.as_function().unwrap();
    assert!(decoded_function.flags.has_debug());
    assert_eq!(decoded_function.debug.as_ref().unwrap().line_number, 7);
    assert_eq!(decoded_function.constant_pool, vec![Value::Float64(1.5)]);

    let encoded = Encoder::with_options(&decoded.atoms, options)
        .encode(&decoded.value)
        .unwrap();
    assert_eq!(encoded, bytes);
}

#[test]
fn test_encode_with_foreign_table() {
    let decoded = ObjectStream::from_bytes(&greet_stream()).unwrap();
    let foreign = AtomTable::from_strings(["hello.js", "greet"]);
    let err = Encoder::new(&foreign).encode(&decoded.value).unwrap_err();
    assert!(matches!(err, BytecodeError::AtomMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Encode);
}

#[test]
fn test_wide_string_bytes_preserved() {
    let mut bytes = header(&[]);
    bytes.push(TAG_STRING);
    // 4 bytes, wide bit set, not valid UTF-8
    bytes.extend_from_slice(&[0x09, 0x3d, 0xd8, 0x00, 0xde]);

    let decoded = ObjectStream::from_bytes(&bytes).unwrap();
    let string = decoded.value.as_string().unwrap();
    assert!(string.is_wide());
    assert_eq!(string.as_str(), None);
    assert_eq!(string.as_bytes(), &[0x3d, 0xd8, 0x00, 0xde]);
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn test_nan_payload_preserved() {
    let bits = 0x7ff8_0000_dead_beefu64;
    let mut bytes = header(&[]);
    bytes.push(TAG_FLOAT64);
    bytes.extend_from_slice(&bits.to_ne_bytes());

    let decoded = ObjectStream::from_bytes(&bytes).unwrap();
    match decoded.value {
        Value::Float64(n) => assert_eq!(n.to_bits(), bits),
        ref other => panic!("expected float, got {other:?}"),
    }
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn test_build_and_encode_tree() {
    let atoms = AtomTable::from_strings(["add", "math.js"]);
    let mut function = FunctionBytecode::new(atoms.atom("add").unwrap());
    function.flags = FunctionFlags::from_bits(0x0003);
    function.arg_count = 2;
    function.defined_arg_count = 2;
    function.stack_size = 2;
    function.locals.push(VarDef::new(Atom::Int(0)));
    function.locals.push(VarDef::new(atoms.atom("name").unwrap()));
    function.bytecode = vec![0xd1, 0xd2, 0x9d, 0x28];
    function.constant_pool.push(Value::String(JsString::new("sum")));
    function.constant_pool.push(Value::Int32(i32::MIN));
    function.set_debug(Some(otter_qjs_bytecode::DebugInfo {
        file_name: atoms.atom("math.js").unwrap(),
        line_number: 3,
        pc2line: vec![0x01, 0x02],
    }));

    let value = Value::from(function);
    let bytes = Encoder::new(&atoms).encode(&value).unwrap();
    let decoded = ObjectStream::from_bytes(&bytes).unwrap();

    assert_eq!(decoded.atoms, atoms);
    assert_eq!(decoded.value, value);
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn test_closure_captures_outer_local() {
    // function outer() { let count = 0; return () => ++count; }
    let atoms = AtomTable::from_strings(["outer", "count"]);

    let mut arrow = FunctionBytecode::new(atoms.atom("").unwrap());
    arrow.flags = FunctionFlags::from_bits(0x0002);
    arrow.stack_size = 1;
    arrow.closure_vars.push(ClosureVar {
        var_name: atoms.atom("count").unwrap(),
        var_index: 0,
        is_local: true,
        is_arg: false,
        is_const: false,
        is_lexical: true,
        var_kind: VarKind::Normal,
    });
    arrow.bytecode = vec![0x5e, 0x00, 0x00, 0x8f, 0x28];

    let mut count = VarDef::new(atoms.atom("count").unwrap());
    count.scope_level = 1;
    count.scope_next = Some(0);
    count.is_lexical = true;
    count.is_captured = true;

    let mut outer = FunctionBytecode::new(atoms.atom("outer").unwrap());
    outer.flags = FunctionFlags::from_bits(0x0243);
    outer.var_count = 1;
    outer.stack_size = 1;
    outer.locals.push(count);
    outer.bytecode = vec![0xb6, 0xc9, 0xc2, 0x00, 0x28];
    outer.constant_pool.push(Value::from(arrow));

    let bytes = Encoder::new(&atoms).encode(&Value::from(outer)).unwrap();
    let decoded = ObjectStream::from_bytes(&bytes).unwrap();

    let outer = decoded.value.as_function().unwrap();
    let local = &outer.locals[0];
    assert_eq!(local.var_name.as_str(), Some("count"));
    assert_eq!(local.scope_next, Some(0));
    assert!(local.is_lexical && local.is_captured && !local.is_const);

    let arrow = outer.constant_pool[0].as_function().unwrap();
    assert_eq!(arrow.name_str(), Some(""));
    assert_eq!(arrow.closure_vars.len(), 1);
    assert!(arrow.closure_vars[0].is_local);
    assert!(arrow.closure_vars[0].is_lexical);
    assert_eq!(arrow.closure_vars[0].var_name.as_str(), Some("count"));
    assert!(arrow.debug.is_none());

    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}
