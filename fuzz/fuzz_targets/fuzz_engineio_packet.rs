#![no_main]

use libfuzzer_sys::fuzz_target;
use wahlplakat_client::engineio::{self, Packet, SocketPacket};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // A long-polling body may carry several packets.
    for raw in engineio::split_payload(text) {
        if let Ok(Packet::Message(SocketPacket::Event(tagged))) = engineio::decode(raw) {
            let _ = engineio::decode_event(tagged);
        }
    }
});
