//! Local content addressing: canonical DAG-CBOR encoding of JSON values and
//! CIDv1 computation over sha2-256.
//!
//! Used by the in-memory store so that identifiers are computed the same way
//! an IPFS node would compute them for the same block.

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::models::outcome::ContentId;

/// Multicodec for raw bytes.
pub const RAW_CODEC: u64 = 0x55;
/// Multicodec for DAG-CBOR.
pub const DAG_CBOR_CODEC: u64 = 0x71;

const CID_VERSION: u64 = 1;
const SHA2_256: u64 = 0x12;
/// Multibase prefix for lowercase base16.
const BASE16_PREFIX: char = 'f';

/// CIDv1 over the sha2-256 digest of `block`, tagged with `codec`.
pub fn cid_v1(codec: u64, block: &[u8]) -> ContentId {
    let digest = Sha256::digest(block);

    let mut bytes = Vec::with_capacity(4 + digest.len());
    put_uvarint(&mut bytes, CID_VERSION);
    put_uvarint(&mut bytes, codec);
    put_uvarint(&mut bytes, SHA2_256);
    put_uvarint(&mut bytes, digest.len() as u64);
    bytes.extend_from_slice(&digest);

    ContentId::new(format!("{}{}", BASE16_PREFIX, hex::encode(bytes)))
}

fn put_uvarint(out: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        out.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

/// Encode a JSON value as canonical DAG-CBOR.
///
/// Integers use the shortest head, non-integral numbers are always 64-bit
/// floats, and map keys are ordered by encoded length, then bytewise.
pub fn encode_dag_cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_value(&mut out, value);
    out
}

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(0xf6),
        Value::Bool(false) => out.push(0xf4),
        Value::Bool(true) => out.push(0xf5),
        Value::Number(n) => encode_number(out, n),
        Value::String(s) => encode_text(out, s),
        Value::Array(items) => {
            put_head(out, MAJOR_ARRAY, items.len() as u64);
            for item in items {
                encode_value(out, item);
            }
        }
        Value::Object(map) => encode_map(out, map),
    }
}

fn encode_number(out: &mut Vec<u8>, n: &Number) {
    if let Some(u) = n.as_u64() {
        put_head(out, MAJOR_UNSIGNED, u);
    } else if let Some(i) = n.as_i64() {
        // as_u64 failed, so i is negative
        put_head(out, MAJOR_NEGATIVE, (-1 - i) as u64);
    } else {
        // JSON cannot carry NaN or infinities, so every float here is finite.
        let f = n.as_f64().unwrap_or_default();
        out.push(0xfb);
        out.extend_from_slice(&f.to_bits().to_be_bytes());
    }
}

fn encode_text(out: &mut Vec<u8>, s: &str) {
    put_head(out, MAJOR_TEXT, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn encode_map(out: &mut Vec<u8>, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| {
        a.len()
            .cmp(&b.len())
            .then_with(|| a.as_bytes().cmp(b.as_bytes()))
    });

    put_head(out, MAJOR_MAP, entries.len() as u64);
    for (key, value) in entries {
        encode_text(out, key);
        encode_value(out, value);
    }
}

fn put_head(out: &mut Vec<u8>, major: u8, n: u64) {
    let major = major << 5;
    if n < 24 {
        out.push(major | n as u8);
    } else if n <= u8::MAX as u64 {
        out.push(major | 24);
        out.push(n as u8);
    } else if n <= u16::MAX as u64 {
        out.push(major | 25);
        out.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= u32::MAX as u64 {
        out.push(major | 26);
        out.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_scalars_minimally() {
        assert_eq!(encode_dag_cbor(&json!(0)), [0x00]);
        assert_eq!(encode_dag_cbor(&json!(23)), [0x17]);
        assert_eq!(encode_dag_cbor(&json!(24)), [0x18, 0x18]);
        assert_eq!(encode_dag_cbor(&json!(1000)), [0x19, 0x03, 0xe8]);
        assert_eq!(encode_dag_cbor(&json!(-1)), [0x20]);
        assert_eq!(encode_dag_cbor(&json!(-500)), [0x39, 0x01, 0xf3]);
        assert_eq!(encode_dag_cbor(&json!(null)), [0xf6]);
        assert_eq!(encode_dag_cbor(&json!(true)), [0xf5]);
        assert_eq!(
            encode_dag_cbor(&json!(1.5)),
            [0xfb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn encodes_title_document() {
        // {"title": "x"}
        assert_eq!(
            encode_dag_cbor(&json!({"title": "x"})),
            [0xa1, 0x65, b't', b'i', b't', b'l', b'e', 0x61, b'x']
        );
    }

    #[test]
    fn map_keys_sort_by_length_then_bytes() {
        let encoded = encode_dag_cbor(&json!({"bb": 1, "a": 2, "c": 3}));
        assert_eq!(
            encoded,
            [0xa3, 0x61, b'a', 0x02, 0x61, b'c', 0x03, 0x62, b'b', b'b', 0x01]
        );
    }

    #[test]
    fn raw_cid_of_empty_block_matches_ipfs() {
        // `ipfs add --cid-version 1 --raw-leaves` of an empty file, in base16.
        assert_eq!(
            cid_v1(RAW_CODEC, b"").as_str(),
            "f01551220e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn codec_is_part_of_the_identifier() {
        let block = encode_dag_cbor(&json!({"title": "x"}));
        assert_ne!(cid_v1(RAW_CODEC, &block), cid_v1(DAG_CBOR_CODEC, &block));
        assert!(cid_v1(DAG_CBOR_CODEC, &block).as_str().starts_with("f01711220"));
    }
}
