// Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use otp_dashboard::config::{Collections, Config, DashboardDefaults, SettingsDefaults, StoreConfig};
use otp_dashboard::database::{DbHandle, MemoryStore, MEMORY_URI};
use otp_dashboard::AppState;

pub fn test_config() -> Config {
    Config {
        port: 0,
        request_timeout: Duration::from_secs(5),
        store: StoreConfig {
            uri: MEMORY_URI.to_string(),
            database: "otp_bot_test".to_string(),
            max_pool_size: 1,
            connect_timeout: Duration::from_millis(100),
            server_selection_timeout: Duration::from_millis(100),
        },
        collections: Collections::default(),
        settings_defaults: SettingsDefaults::default(),
        dashboard_defaults: DashboardDefaults::default(),
    }
}

/// Connected memory store plus every component wired to it.
pub fn connected_app() -> (Arc<MemoryStore>, AppState) {
    let memory = Arc::new(MemoryStore::connected());
    let handle: DbHandle = memory.clone();
    (memory, AppState::new(handle, &test_config()))
}

/// Components over a store whose `connect` was never called.
pub fn unconnected_app() -> (Arc<MemoryStore>, AppState) {
    let memory = Arc::new(MemoryStore::new());
    let handle: DbHandle = memory.clone();
    (memory, AppState::new(handle, &test_config()))
}
