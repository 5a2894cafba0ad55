//! Fuzz target for hostile CBOR against the envelope and response decoders
//!
//! # Strategy
//!
//! - Deeply nested: arrays/maps nested to arbitrary depth
//! - Huge lengths: CBOR claiming massive string/array lengths
//! - Family confusion: both command families in one envelope
//! - Duplicate keys: maps repeating a field name
//!
//! # Invariants
//!
//! - Huge claimed lengths do not allocate
//! - An envelope mixing command families never decodes
//! - NEVER panic on malformed CBOR

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_proto::{Envelope, Response};

#[derive(Debug, Clone, Arbitrary)]
enum CborAttack {
    DeeplyNested { depth: u8, map: bool },
    HugeLength { claimed_len_exponent: u8 },
    FamilyConfusion { operation: u8, conversation_id: String, body: String },
    DuplicateKeys { count: u8 },
}

const OPERATIONS: [&str; 7] =
    ["update", "mute", "unmute", "count", "add", "remove", "direct-message"];

fuzz_target!(|attack: CborAttack| {
    match attack {
        CborAttack::DeeplyNested { depth, map } => {
            let bytes = create_nested_cbor(usize::from(depth % 64), map);
            let _ = Envelope::decode(&bytes);
            let _ = Response::decode(&bytes);
        }

        CborAttack::HugeLength { claimed_len_exponent } => {
            let exponent = u32::from(claimed_len_exponent % 33);
            let claimed_length = if exponent < 32 { 1u32 << exponent } else { u32::MAX };

            for bytes in [create_huge_text_string(claimed_length), create_huge_array(claimed_length)] {
                let _ = Envelope::decode(&bytes);
                let _ = Response::decode(&bytes);
            }
        }

        CborAttack::FamilyConfusion { operation, conversation_id, body } => {
            let operation = OPERATIONS[usize::from(operation) % OPERATIONS.len()];
            let bytes = create_mixed_envelope(operation, &conversation_id, &body);
            assert!(Envelope::decode(&bytes).is_err(), "mixed command families must not decode");
        }

        CborAttack::DuplicateKeys { count } => {
            let count = (count % 10).max(2);
            let mut bytes = vec![0xA0 | count];
            for _ in 0..count {
                push_text(&mut bytes, "operation");
                push_text(&mut bytes, "count");
            }
            let _ = Envelope::decode(&bytes);
            let _ = Response::decode(&bytes);
        }
    }
});

fn create_nested_cbor(depth: usize, map: bool) -> Vec<u8> {
    let mut bytes = Vec::new();
    for _ in 0..depth {
        if map {
            bytes.extend_from_slice(&[0xA1, 0x61, b'a']);
        } else {
            bytes.push(0x81);
        }
    }
    bytes.push(0x01);
    bytes
}

fn create_huge_text_string(claimed_length: u32) -> Vec<u8> {
    let mut bytes = vec![0x7A];
    bytes.extend_from_slice(&claimed_length.to_be_bytes());
    bytes.extend(vec![b'x'; (claimed_length as usize).min(10)]);
    bytes
}

fn create_huge_array(claimed_length: u32) -> Vec<u8> {
    let mut bytes = vec![0x9A];
    bytes.extend_from_slice(&claimed_length.to_be_bytes());
    for _ in 0..(claimed_length as usize).min(5) {
        bytes.push(0x01);
    }
    bytes
}

/// Envelope map carrying both `conversationCommand` and `directMessage`.
fn create_mixed_envelope(operation: &str, conversation_id: &str, body: &str) -> Vec<u8> {
    let mut bytes = vec![0xA3];
    push_text(&mut bytes, "operation");
    push_text(&mut bytes, operation);

    push_text(&mut bytes, "conversationCommand");
    bytes.push(0xA1);
    push_text(&mut bytes, "conversationId");
    push_text(&mut bytes, conversation_id);

    push_text(&mut bytes, "directMessage");
    bytes.push(0xA5);
    push_text(&mut bytes, "body");
    push_text(&mut bytes, body);
    push_text(&mut bytes, "conversationId");
    push_text(&mut bytes, conversation_id);
    push_text(&mut bytes, "needsReceipt");
    bytes.push(0xF4);
    push_text(&mut bytes, "isTransient");
    bytes.push(0xF4);
    push_text(&mut bytes, "dedupToken");
    push_text(&mut bytes, "token");
    bytes
}

fn push_text(bytes: &mut Vec<u8>, text: &str) {
    let len = text.len();
    if len < 24 {
        bytes.push(0x60 | len as u8);
    } else {
        bytes.push(0x7A);
        bytes.extend_from_slice(&(len as u32).to_be_bytes());
    }
    bytes.extend_from_slice(text.as_bytes());
}
