#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary change text must parse or fail cleanly, never panic
    if let Ok(request) = trigrep::patch::parse_changes(data) {
        assert!(!request.files.is_empty());
        assert!(request.files.iter().all(|f| !f.hunks.is_empty()));
    }
});
