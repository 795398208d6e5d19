//! Fuzz test for size and count parsing
//!
//! Everything a user can type for `--unit-size`, `--units` and `--cycles`.

#![no_main]

use libfuzzer_sys::fuzz_target;

use endurance_core::{format_size, parse_size, CycleCount, UnitCount};

fuzz_target!(|data: &str| {
    // Should never panic, only return Ok/Err
    if let Ok(size) = parse_size(data) {
        let _ = format_size(size);
    }

    for suffix in ["", "B", "K", "KB", "KiB", "M", "MB", "G", "GB", "T", "k", "m", "g"] {
        let test_input = format!("{}{}", data.trim(), suffix);
        let _ = parse_size(&test_input);
    }

    let whitespace_input = format!("  {}  ", data);
    let _ = parse_size(&whitespace_input);

    // Counts round-trip through Display
    if let Ok(units) = data.parse::<UnitCount>() {
        assert_eq!(units.to_string().parse::<UnitCount>().ok(), Some(units));
    }
    if let Ok(cycles) = data.parse::<CycleCount>() {
        assert_eq!(cycles.to_string().parse::<CycleCount>().ok(), Some(cycles));
    }
});
