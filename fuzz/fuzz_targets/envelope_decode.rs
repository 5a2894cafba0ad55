//! Fuzz target for Envelope::decode and Response::decode
//!
//! Feeds arbitrary bytes to both decoders.
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - A decoded envelope passed validation, so it re-encodes without error
//! - Re-encoding a decoded envelope and decoding again yields the same value

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::{Envelope, Response};

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = Envelope::decode(data) {
        let mut encoded = Vec::new();
        envelope.encode(&mut encoded).expect("decoded envelope must re-encode");

        let again = Envelope::decode(&encoded).expect("re-encoded envelope must decode");
        assert_eq!(envelope, again, "envelope changed across re-encoding");
    }

    if let Ok(response) = Response::decode(data) {
        let mut encoded = Vec::new();
        response.encode(&mut encoded).expect("decoded response must re-encode");
    }
});
