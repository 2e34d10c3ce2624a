#![no_main]

use covcomment_domain::{locate_stack_frame, strip_ansi};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // A recovered path is never blank.
        if let Some(frame) = locate_stack_frame(text) {
            assert!(!frame.path.trim().is_empty());
        }
        let _ = strip_ansi(text);
    }
});
