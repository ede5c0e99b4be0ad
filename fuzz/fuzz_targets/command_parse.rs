#![no_main]

use deadman_vault::{Command, Ledger, LedgerConfig, ManualClock};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    // Arbitrary command batches must be rejected or executed, never panic.
    let Ok(commands) = serde_json::from_slice::<Vec<Command>>(data) else {
        return;
    };
    let clock = ManualClock::new(1_735_000_000);
    let Ok(ledger) = Ledger::new(Arc::new(clock.clone()), LedgerConfig::default(), Default::default())
    else {
        return;
    };
    for command in &commands {
        let _ = ledger.execute(command);
        clock.advance(86_400);
    }
    let _ = ledger.heartbeat();
});
