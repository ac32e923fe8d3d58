#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<raidguard::Config>(s) {
            let _ = config.validate();
        }
        if let Ok(config) = serde_json::from_str::<raidguard::Config>(s) {
            let _ = config.validate();
        }
    }
});
