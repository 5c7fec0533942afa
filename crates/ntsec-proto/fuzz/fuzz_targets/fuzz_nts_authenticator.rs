#![no_main]
use libfuzzer_sys::fuzz_target;
use ntsec_proto::AesSivKey;
use ntsec_proto::nts::Authenticator;

fuzz_target!(|data: &[u8]| {
    // Parse the body of an authenticator field, then try to open it.
    if let Ok(auth) = Authenticator::parse(data) {
        if let Ok(key) = AesSivKey::new(&[0x24; 32]) {
            let _ = key.decrypt(&[], &auth.nonce, &auth.ciphertext);
        }
        let _ = auth.to_body();
    }
});
