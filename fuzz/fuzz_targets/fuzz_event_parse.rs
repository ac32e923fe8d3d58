#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(event) = serde_json::from_slice::<raidguard::GuardEvent>(data) {
        let _ = event.tenant_id();
    }
});
