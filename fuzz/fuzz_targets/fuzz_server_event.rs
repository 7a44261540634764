#![no_main]

use libfuzzer_sys::fuzz_target;
use wahlplakat_client::protocol::ServerEvent;

fuzz_target!(|data: &[u8]| {
    // Tagged JSON as produced by the Socket.IO decoder.
    let _ = serde_json::from_slice::<ServerEvent>(data);

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = wahlplakat_client::engineio::decode_event(value);
    }
});
