//! Fuzz target for message envelope decoding.
//!
//! Feeds arbitrary codes and payloads through a message set's static
//! decoder registry.
//!
//! # Invariants
//!
//! - NEVER panic on malformed CBOR
//! - Codes outside the set fail with `UnknownCode`
//! - A decoded value re-encodes under its own code and decodes back equal

#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use simnet_proto::{MessageSet, Msg, ProtoError, decode_payload, encode_payload};

#[derive(Debug, Clone, PartialEq)]
enum FuzzMsg {
    Text(String),
    Height(u64),
    Blob(Vec<u8>),
}

impl MessageSet for FuzzMsg {
    fn code(&self) -> u64 {
        match self {
            Self::Text(_) => 0,
            Self::Height(_) => 1,
            Self::Blob(_) => 2,
        }
    }

    fn encode(&self) -> Result<Bytes, ProtoError> {
        match self {
            Self::Text(t) => encode_payload(t),
            Self::Height(h) => encode_payload(h),
            Self::Blob(b) => encode_payload(b),
        }
    }

    fn decode(code: u64, payload: &[u8]) -> Result<Self, ProtoError> {
        match code {
            0 => decode_payload(code, payload).map(Self::Text),
            1 => decode_payload(code, payload).map(Self::Height),
            2 => decode_payload(code, payload).map(Self::Blob),
            _ => Err(ProtoError::UnknownCode { code }),
        }
    }
}

#[derive(Debug, Arbitrary)]
struct Input {
    code: u8,
    payload: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let code = u64::from(input.code % 4);
    let msg = Msg::new(code, input.payload);

    match FuzzMsg::from_msg(&msg) {
        Ok(value) => {
            let again = value.to_msg().expect("decoded values re-encode");
            assert_eq!(again.code, code);
            assert_eq!(FuzzMsg::from_msg(&again).ok(), Some(value));
        },
        Err(ProtoError::UnknownCode { code: got }) => assert_eq!(got, 3),
        Err(ProtoError::Decode { code: got, .. }) => assert_eq!(got, code),
        Err(other) => panic!("unexpected decode error: {other}"),
    }
});
