#![no_main]
use libfuzzer_sys::fuzz_target;
use ntsec_proto::AeadAlgorithm;
use ntsec_proto::ke::{KeRecordReader, decode_message, process_client_request, process_server_response};

fuzz_target!(|data: &[u8]| {
    if let Ok(records) = decode_message(data) {
        let _ = process_client_request(&records, &AeadAlgorithm::SUPPORTED);
        let _ = process_server_response(&records);
    }

    // Feed the same bytes in small chunks.
    let mut reader = KeRecordReader::new();
    for chunk in data.chunks(7) {
        if reader.push(chunk).is_err() {
            return;
        }
        while let Ok(Some(_)) = reader.next_record() {}
    }
});
