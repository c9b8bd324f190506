#![no_main]

use std::collections::HashMap;

use depex::smt::{Direction, Value, eval_bool, group_versions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let direction = if data[0] & 1 == 0 {
        Direction::Ascending
    } else {
        Direction::Descending
    };
    let serials: Vec<i64> = data[1..].iter().take(256).map(|b| i64::from(*b)).collect();
    let term = group_versions("x", &serials, direction);

    let lo = serials.iter().min().copied().unwrap_or(0);
    let hi = serials.iter().max().copied().unwrap_or(0);
    for k in lo - 1..=hi + 1 {
        let env = HashMap::from([("x".to_string(), Value::Int(k))]);
        assert_eq!(
            eval_bool(&term, &env),
            Some(serials.contains(&k)),
            "membership of {k} changed"
        );
    }
});
