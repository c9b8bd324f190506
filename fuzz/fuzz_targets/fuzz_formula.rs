#![no_main]

use depex::smt::Formula;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // cached text is untrusted: parsing may fail but must not panic,
    // and whatever parses must survive a second round
    if let Ok(formula) = Formula::parse(text, "file_risk_f") {
        let rendered = formula.to_smt2();
        let reparsed = Formula::parse(&rendered, "file_risk_f");
        assert!(reparsed.is_ok(), "rendered formula does not parse: {rendered}");
    }
});
