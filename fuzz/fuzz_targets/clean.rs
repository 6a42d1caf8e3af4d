#![no_main]

use std::path::Path;

use axess_core::{Cleaner, CleanerConfig, NoIncludes, Normalizer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Rewriting delimiters never adds or removes lines.
    let mut normalizer = Normalizer::new();
    let normalized = normalizer.normalize_text(data);
    assert_eq!(normalized.split('\n').count(), data.split('\n').count());

    let config = CleanerConfig {
        max_expansion_passes: 8,
        ..Default::default()
    };
    let _ = Cleaner::new(config).clean(data, None, &mut NoIncludes, Path::new("."));
});
