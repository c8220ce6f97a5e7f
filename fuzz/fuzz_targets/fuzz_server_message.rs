#![no_main]

use libfuzzer_sys::fuzz_target;
use quiz_live_client::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Inbound frames are text; invalid UTF-8 never reaches the decoder.
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(msg) = ServerMessage::decode(text) {
            // Anything that decodes must survive a trip back through serde.
            let encoded = serde_json::to_string(&msg).expect("decoded message re-encodes");
            let again = ServerMessage::decode(&encoded).expect("re-encoded message decodes");
            assert_eq!(msg.kind(), again.kind());
        }
    }
});
