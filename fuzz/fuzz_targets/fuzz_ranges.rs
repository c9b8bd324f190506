#![no_main]

use depex::versions::{Ecosystem, VersionRange, filter};
use libfuzzer_sys::fuzz_target;
use std::panic::AssertUnwindSafe;

const ECOSYSTEMS: [Ecosystem; 6] = [
    Ecosystem::PyPI,
    Ecosystem::Npm,
    Ecosystem::Maven,
    Ecosystem::Cargo,
    Ecosystem::RubyGems,
    Ecosystem::NuGet,
];

fuzz_target!(|data: &[u8]| {
    let Ok(content) = std::str::from_utf8(data) else {
        return;
    };
    // first line is the range, the rest are version names
    let mut lines = content.lines();
    let range = lines.next().unwrap_or_default();
    let versions: Vec<&str> = lines.collect();

    for ecosystem in ECOSYSTEMS {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let kept = filter(ecosystem, &versions, range);
            assert!(kept.len() <= versions.len(), "filter grew the input");
            if let Ok(parsed) = VersionRange::parse(ecosystem, range) {
                for version in &versions {
                    let _ = parsed.matches(version);
                }
            }
        }));
        assert!(result.is_ok(), "{ecosystem:?} panicked on range {range:?}");
    }
});
