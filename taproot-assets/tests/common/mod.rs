#![allow(dead_code)]

use std::sync::Once;

use taproot_assets::core::mock;
use taproot_assets::types::asset::SerializedKey;
use taproot_assets::verify::BitcoinTaprootOps;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init()
            .ok();
    });
}

pub fn key(ops: &BitcoinTaprootOps, seed: &str) -> SerializedKey {
    mock::mock_key(ops, seed).expect("mock key")
}
