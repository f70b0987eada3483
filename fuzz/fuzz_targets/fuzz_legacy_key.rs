#![no_main]

use dashfilter_core::LegacyFilterKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if text.len() > 1024 {
        return;
    }

    // Parsing must never panic.
    let Ok(key) = text.parse::<LegacyFilterKey>() else {
        return;
    };

    // Column keeps everything after the first separator.
    assert!(!key.column.is_empty());

    // Display re-parses to the same key.
    let rendered = key.to_string();
    let again: LegacyFilterKey = rendered.parse().expect("rendered key must parse");
    assert_eq!(again, key);
});
