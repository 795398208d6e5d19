//! Fuzz test for settings TOML parsing
//!
//! Arbitrary configuration files must either load or be rejected, and a
//! loaded `[run]` section must convert to a run configuration without
//! panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

use endurance_core::Settings;

fuzz_target!(|data: &str| {
    let result: Result<Settings, _> = toml::from_str(data);

    if let Ok(settings) = result {
        let _ = toml::to_string(&settings);
        let _ = toml::to_string_pretty(&settings);
        let _ = settings.to_test_config("/tmp");
    }

    // Sections as they appear in a full config
    for section in ["run", "behavior", "report"] {
        let wrapped = format!("[{}]\n{}", section, data);
        if let Ok(settings) = toml::from_str::<Settings>(&wrapped) {
            let _ = settings.to_test_config("/tmp");
        }
    }
});
