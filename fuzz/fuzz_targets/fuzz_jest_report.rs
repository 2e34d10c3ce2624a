#![no_main]

use covcomment_adapters_jest::parse_jest_report;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_jest_report(text);
    }
});
