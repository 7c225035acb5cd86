use std::fmt::Debug;

use std::collections::BTreeMap;
use std::io::ErrorKind;

use proptest::prelude::*;

use streamrpc::xdr::rpc::{CallEnvelope, RpcClass};
use streamrpc::xdr::{deserialize, Deserialize, Serialize};
use streamrpc::{DeserializeStruct, SerializeStruct, StrError, Value};

#[derive(Default)]
struct Context {
    buf: Vec<u8>,
}

trait TestValue: Deserialize + Serialize + Eq + Default + Debug + Clone {}
impl<T: Deserialize + Serialize + Eq + Default + Debug + Clone> TestValue for T {}

impl Context {
    fn check<T: TestValue>(&mut self, src_value: &T) {
        for capacity in 0..32 {
            for exsist in 0..capacity {
                self.buf = Vec::with_capacity(capacity);
                self.buf.resize(exsist, Default::default());

                src_value.serialize(&mut self.buf).expect("cannot serialize");
                assert_eq!((self.buf.len() - exsist) % 4, 0);

                let result_value =
                    deserialize::<T>(&mut &self.buf[exsist..]).expect("cannot deserialize");

                assert_eq!(src_value, &result_value);
            }
        }
    }

    fn check_multi<T: TestValue>(&mut self, src_values: &[T]) {
        src_values.iter().for_each(|i| self.check(i));
    }
}

#[derive(Default, PartialEq, Eq, Debug, Clone)]
struct TestForVecU8(Vec<u8>);

impl Serialize for TestForVecU8 {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}

impl Deserialize for TestForVecU8 {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.deserialize(src)
    }
}

#[derive(Default, PartialEq, Eq, Debug, Clone)]
struct TestForVec<T>(Vec<T>);

impl<T: TestValue> Serialize for TestForVec<T> {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}

impl<T: TestValue> Deserialize for TestForVec<T> {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.deserialize(src)
    }
}

#[derive(Default, PartialEq, Eq, Debug, Clone)]
struct TestForString(String);

impl Serialize for TestForString {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}

impl Deserialize for TestForString {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.deserialize(src)
    }
}

#[test]
fn test_scalar_bijection() {
    let mut ctx = Context::default();

    ctx.check_multi(&[true, false]);

    ctx.check_multi(&[i32::MIN, -1i32, 0i32, 1i32, i32::MAX]);
    ctx.check_multi(&[i64::MIN, -1i64, 0i64, 1i64, i64::MAX]);

    ctx.check_multi(&[u32::MIN, 0u32, 1u32, 2u32, u32::MAX]);
    ctx.check_multi(&[u64::MIN, 0u64, 1u64, 2u64, u64::MAX]);

    ctx.check_multi(&[RpcClass::Normal, RpcClass::ReadStream, RpcClass::WriteStream]);
}

#[test]
fn test_str_bijection() {
    let mut ctx = Context::default();

    ctx.check_multi(&[
        TestForString(String::from("")),
        TestForString(String::from("abc1234+-")),
        TestForString(String::from("abc")),
    ]);
}

#[test]
fn test_vec_bijection() {
    let mut ctx = Context::default();

    ctx.check_multi(&[
        TestForVecU8(vec![]),
        TestForVecU8(vec![1u8]),
        TestForVecU8(vec![1u8, 2u8, 3u8]),
        TestForVecU8(vec![1u8, 2u8, 3u8, 4u8]),
    ]);
    ctx.check_multi(&[
        TestForVec(vec![]),
        TestForVec(vec![1u32]),
        TestForVec(vec![1u32, 2u32, 3u32]),
        TestForVec(vec![1u32, 2u32, 3u32, 4u32]),
    ]);
    ctx.check_multi(&[
        TestForVec(vec![]),
        TestForVec(vec![1u64]),
        TestForVec(vec![1u64, 2u64, 3u64]),
        TestForVec(vec![1u64, 2u64, 3u64, 4u64]),
    ]);
}

#[test]
fn test_option_and_map_bijection() {
    let mut ctx = Context::default();

    ctx.check_multi(&[None, Some(0u32), Some(u32::MAX)]);
    ctx.check_multi(&[StrError::nil(), StrError::new(""), StrError::new("boom")]);

    let mut capabilities = BTreeMap::new();
    ctx.check(&capabilities);
    capabilities.insert("Demo.Add".to_string(), RpcClass::Normal);
    capabilities.insert("Demo.Get".to_string(), RpcClass::ReadStream);
    ctx.check(&capabilities);
}

#[derive(Default, PartialEq, Eq, Debug, Clone)]
struct FileStat {
    name: String,
    size: u64,
    modified: Option<i64>,
}
SerializeStruct!(FileStat, name, size, modified);
DeserializeStruct!(FileStat, name, size, modified);

#[test]
fn test_struct_bijection() {
    let mut ctx = Context::default();

    ctx.check_multi(&[
        FileStat::default(),
        FileStat { name: "notes.txt".into(), size: 12, modified: Some(1_700_000_000) },
    ]);
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.serialize(&mut buf).expect("cannot serialize");
    buf
}

#[test]
fn value_layout_is_discriminant_then_payload() {
    assert_eq!(encode(&Value::Nil), [0, 0, 0, 0]);
    assert_eq!(encode(&Value::Bool(true)), [0, 0, 0, 1, 0, 0, 0, 1]);
    assert_eq!(encode(&Value::Int(-1)), [0, 0, 0, 2, 255, 255, 255, 255, 255, 255, 255, 255]);
    assert_eq!(encode(&Value::Str("ab".into())), [0, 0, 0, 5, 0, 0, 0, 2, b'a', b'b', 0, 0]);
    assert_eq!(encode(&Value::Error(StrError::nil())), [0, 0, 0, 10, 0, 0, 0, 0]);
}

#[test]
fn nested_value_round_trips() {
    let value = Value::record([
        ("name", Value::from("report.txt")),
        ("size", Value::from(1024u64)),
        ("tags", Value::list(["a", "b"])),
        ("owner", Value::Map(vec![(Value::Int(1), Value::Bytes(vec![1, 2, 3]))])),
        ("error", Value::Error(StrError::new("stale"))),
        ("missing", Value::Nil),
    ]);

    let decoded: Value = deserialize(&mut encode(&value).as_slice()).expect("cannot deserialize");
    assert_eq!(decoded, value);
    assert_eq!(decoded.field("size"), Some(&Value::Uint(1024)));
}

#[test]
fn call_envelope_parts_are_independent_records() {
    let envelope = CallEnvelope::new("Demo.Add", vec![Value::Int(3), Value::Int(4)]);
    let mut buf = encode(envelope.method.as_str());
    buf.extend(encode(envelope.args.as_slice()));

    let mut src = buf.as_slice();
    let method: String = deserialize(&mut src).expect("method");
    let args: Vec<Value> = deserialize(&mut src).expect("args");
    assert!(src.is_empty());
    assert_eq!(CallEnvelope::new(method, args), envelope);
}

#[test]
fn unknown_discriminant_is_rejected() {
    let buf = [0u8, 0, 0, 99];
    let err = deserialize::<Value>(&mut buf.as_slice()).expect_err("unknown kind");
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn non_zero_padding_is_rejected() {
    let buf = [0u8, 0, 0, 5, 0, 0, 0, 1, b'a', 0, 7, 0];
    let err = deserialize::<Value>(&mut buf.as_slice()).expect_err("bad padding");
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn invalid_utf8_is_rejected() {
    let buf = [0u8, 0, 0, 2, 0xff, 0xfe, 0, 0];
    let err = deserialize::<String>(&mut buf.as_slice()).expect_err("bad utf-8");
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn truncated_value_is_an_error() {
    let buf = encode(&Value::Str("truncated".into()));
    assert!(deserialize::<Value>(&mut &buf[..buf.len() - 4]).is_err());
}

#[test]
fn deep_nesting_is_rejected() {
    let mut value = Value::Nil;
    for _ in 0..100 {
        value = Value::List(vec![value]);
    }
    let err = deserialize::<Value>(&mut encode(&value).as_slice()).expect_err("too deep");
    assert_eq!(err.kind(), ErrorKind::InvalidData);

    let mut value = Value::Nil;
    for _ in 0..32 {
        value = Value::List(vec![value]);
    }
    let decoded: Value = deserialize(&mut encode(&value).as_slice()).expect("shallow enough");
    assert_eq!(decoded, value);
}

#[test]
fn huge_declared_length_does_not_preallocate() {
    // A list claiming u32::MAX items, followed by nothing.
    let buf = [0u8, 0, 0, 7, 255, 255, 255, 255];
    let err = deserialize::<Value>(&mut buf.as_slice()).expect_err("truncated list");
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::Uint),
        proptest::num::f64::NORMAL.prop_map(Value::Float),
        ".{0,16}".prop_map(Value::Str),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        proptest::option::of(".{0,16}")
            .prop_map(|m| Value::Error(m.map(StrError::new).unwrap_or_default())),
    ];
    leaf.prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            proptest::collection::vec((inner.clone(), inner.clone()), 0..4).prop_map(Value::Map),
            proptest::collection::vec(("[a-z]{1,8}", inner), 0..4).prop_map(Value::Struct),
        ]
    })
}

proptest! {
    /// Any value survives encoding and occupies a multiple of four bytes.
    #[test]
    fn value_round_trip(value in arb_value()) {
        let buf = encode(&value);
        prop_assert_eq!(buf.len() % 4, 0);
        let decoded: Value = deserialize(&mut buf.as_slice()).expect("cannot deserialize");
        prop_assert_eq!(decoded, value);
    }

    /// Arbitrary input never panics the decoder.
    #[test]
    fn value_decoder_tolerates_garbage(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = deserialize::<Value>(&mut bytes.as_slice());
    }
}
