#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<hubctl_config::Config>(data)
        && cfg.validate().is_ok()
    {
        let _ = hubctl_core::RuntimeCfg::from(&cfg);
    }
});
