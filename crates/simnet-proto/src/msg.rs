//! Message envelope and the static code → decoder registry.

use std::fmt;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::ProtoError;

/// Wire envelope: a message code and its CBOR payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    /// Message code.
    pub code: u64,
    /// Encoded payload.
    pub payload: Bytes,
}

impl Msg {
    /// Create an envelope from an already-encoded payload.
    pub fn new(code: u64, payload: impl Into<Bytes>) -> Self {
        Self { code, payload: payload.into() }
    }

    /// Encode `value` as the payload of a message with the given code.
    pub fn encode<T: Serialize>(code: u64, value: &T) -> Result<Self, ProtoError> {
        Ok(Self { code, payload: encode_payload(value)? })
    }

    /// Decode the payload as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        decode_payload(self.code, &self.payload)
    }
}

/// Serialize a payload as CBOR.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Bytes, ProtoError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| ProtoError::Encode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Deserialize a CBOR payload carried under `code`.
pub fn decode_payload<T: DeserializeOwned>(code: u64, payload: &[u8]) -> Result<T, ProtoError> {
    ciborium::de::from_reader(payload)
        .map_err(|e| ProtoError::Decode { code, reason: e.to_string() })
}

/// A protocol's closed set of messages.
///
/// Implementors are sum types whose variants each own one message code.
/// [`MessageSet::decode`] is the registry: a `match` from code to the
/// variant's payload decoder. Unknown codes fail with
/// [`ProtoError::UnknownCode`].
///
/// The envelope code is always supplied by the sender, so a value can be
/// sent under a code other than [`MessageSet::code`]. The receiver then
/// decodes according to the envelope, not the sender's intent.
pub trait MessageSet: Sized + Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Code this value is registered under.
    fn code(&self) -> u64;

    /// Encode this value's payload (without the code).
    fn encode(&self) -> Result<Bytes, ProtoError>;

    /// Decode a payload received under `code`.
    fn decode(code: u64, payload: &[u8]) -> Result<Self, ProtoError>;

    /// Wrap this value in an envelope under its own code.
    fn to_msg(&self) -> Result<Msg, ProtoError> {
        Ok(Msg::new(self.code(), self.encode()?))
    }

    /// Decode an envelope.
    fn from_msg(msg: &Msg) -> Result<Self, ProtoError> {
        Self::decode(msg.code, &msg.payload)
    }
}

/// Protocol capability advertised by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cap {
    /// Protocol name.
    pub name: String,
    /// Protocol version.
    pub version: u32,
}

impl Cap {
    /// Create a capability.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self { name: name.into(), version }
    }
}

impl fmt::Display for Cap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hello {
        version: u8,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestMsg {
        Hello(Hello),
        Text(String),
    }

    impl MessageSet for TestMsg {
        fn code(&self) -> u64 {
            match self {
                Self::Hello(_) => 0,
                Self::Text(_) => 1,
            }
        }

        fn encode(&self) -> Result<Bytes, ProtoError> {
            match self {
                Self::Hello(h) => encode_payload(h),
                Self::Text(t) => encode_payload(t),
            }
        }

        fn decode(code: u64, payload: &[u8]) -> Result<Self, ProtoError> {
            match code {
                0 => decode_payload(code, payload).map(Self::Hello),
                1 => decode_payload(code, payload).map(Self::Text),
                _ => Err(ProtoError::UnknownCode { code }),
            }
        }
    }

    #[test]
    fn envelope_dispatches_on_code() {
        let msg = TestMsg::Text("ping".to_string()).to_msg().expect("encode");
        assert_eq!(msg.code, 1);
        assert_eq!(TestMsg::from_msg(&msg), Ok(TestMsg::Text("ping".to_string())));
    }

    #[test]
    fn unknown_code_is_rejected() {
        let msg = Msg::encode(7, &"x").expect("encode");
        assert_eq!(TestMsg::from_msg(&msg), Err(ProtoError::UnknownCode { code: 7 }));
    }

    #[test]
    fn payload_under_wrong_code_fails_to_decode() {
        let payload = encode_payload(&"not a hello").expect("encode");
        let err = TestMsg::decode(0, &payload).unwrap_err();
        assert!(matches!(err, ProtoError::Decode { code: 0, .. }));
    }

    #[test]
    fn cap_display() {
        assert_eq!(Cap::new("bzz", 2).to_string(), "bzz/2");
    }
}
