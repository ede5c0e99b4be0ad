#![no_main]

use deadman_vault::{Ledger, LedgerConfig, LedgerSnapshot, SystemClock};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    // A snapshot that passes its consistency check must restore into a
    // working ledger.
    let Ok(snapshot) = serde_json::from_slice::<LedgerSnapshot>(data) else {
        return;
    };
    let Ok(ledger) = Ledger::from_snapshot(snapshot, Arc::new(SystemClock), LedgerConfig::default())
    else {
        return;
    };
    let _ = ledger.heartbeat();
    let _ = ledger.snapshot();
});
