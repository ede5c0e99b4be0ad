#![no_main]

use deadman_vault::Address;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Address parsing must never panic. Anything that parses must print back
    // to the same address.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(address) = s.parse::<Address>() {
            let reparsed: Address = address.to_string().parse().expect("display output parses");
            assert_eq!(reparsed, address);
        }
    }
});
