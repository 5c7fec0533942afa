#![no_main]
use libfuzzer_sys::fuzz_target;
use ntsec_proto::AesSivKey;
use ntsec_proto::nts::{DecodeOptions, parse_packet, parse_response, peek_packet};

fuzz_target!(|data: &[u8]| {
    // Unverified walk: must not panic, and must re-encode whatever it accepts.
    if let Ok(packet) = peek_packet(data) {
        let _ = packet.encode();
    }

    let Ok(key) = AesSivKey::new(&[0x42; 32]) else {
        return;
    };
    let opts = DecodeOptions::with_key(&key);
    let _ = parse_packet(data, &opts);
    let _ = parse_response(data, &opts);
});
