#![no_main]

use covcomment_adapters_junit::parse_junit_xml;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Errors are fine; panics and overflow are not.
        if let Ok(summary) = parse_junit_xml(text) {
            assert!(summary.succeeded <= summary.tests);
        }
    }
});
