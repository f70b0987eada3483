#![no_main]

use dashfilter_core::Layout;
use dashfilter_layout::LayoutIndex;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 16 * 1024 {
        return;
    }

    // Arbitrary persisted layouts either fail to parse or index cleanly.
    let Ok(layout) = serde_json::from_slice::<Layout>(data) else {
        return;
    };
    let index = LayoutIndex::build(&layout);
    assert!(index.len() <= layout.len());
});
