//! Fuzz target for ServerMessage::decode
//!
//! Every line a target sends goes through this decoder. Arbitrary input must
//! produce a message or an error, never a panic. Decoded fault events must
//! either classify or report a malformed payload.

#![no_main]

use libfuzzer_sys::fuzz_target;
use qmpfault_proto::{ServerMessage, event};

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(ServerMessage::Event(decoded)) = ServerMessage::decode(line) {
        let kind = decoded.kind();
        if decoded.name() != event::FAULT_EVENT {
            assert!(kind.is_ok());
        }
    }
});
