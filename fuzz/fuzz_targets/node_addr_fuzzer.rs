//! Fuzz target for node address and identity parsing.
//!
//! # Invariants
//!
//! - NEVER panic on arbitrary input
//! - A parsed address re-renders to a string that parses to the same address
//! - Only 64-byte inputs parse as raw identities

#![no_main]

use libfuzzer_sys::fuzz_target;
use simnet_proto::{NODE_ID_LEN, NodeAddr, NodeId};

fuzz_target!(|data: &[u8]| {
    if let Ok(addr) = NodeAddr::parse_bytes(data) {
        let rendered = addr.to_string();
        let reparsed = NodeAddr::parse_bytes(rendered.as_bytes());
        assert_eq!(reparsed.ok(), Some(addr), "canonical form must reparse: {rendered}");
    }

    match NodeId::from_slice(data) {
        Ok(id) => assert_eq!(id.as_bytes().as_slice(), data),
        Err(_) => assert_ne!(data.len(), NODE_ID_LEN),
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = NodeId::from_hex(text);
    }
});
