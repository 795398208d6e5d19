//! Fuzz test for digest hex parsing

#![no_main]

use libfuzzer_sys::fuzz_target;

use endurance_core::Digest;

fuzz_target!(|data: &str| {
    if let Ok(digest) = Digest::from_hex(data) {
        // Only 64 hex digits parse, and they round-trip lowercased
        let trimmed = data.trim();
        assert_eq!(trimmed.len(), 64);
        assert_eq!(digest.to_hex(), trimmed.to_lowercase());
    }

    let _ = Digest::from_hex(&data.to_uppercase());
    let _ = Digest::from_hex(&format!("0x{}", data));
});
