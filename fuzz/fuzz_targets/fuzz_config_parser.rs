#![no_main]

use gatewayd_config::parse_config_from_str;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(json) = std::str::from_utf8(data) {
        // Malformed or adversarial config documents must fail cleanly with
        // a ConfigError, never panic.
        let _ = parse_config_from_str(json);
    }
});
