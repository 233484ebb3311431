// OTP bot admin dashboard backend
// Metrics, cached dashboard stats, sync reporting and record management
// over the document store shared with the bot.

pub mod config;
pub mod dashboard;
pub mod database;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod records;
pub mod sync;
pub mod validation;

use config::Config;
use dashboard::DashboardCache;
use database::DbHandle;
use metrics::MetricsAggregator;
use records::RecordStore;
use sync::SyncReporter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: DbHandle,
    pub records: RecordStore,
    pub metrics: MetricsAggregator,
    pub dashboard: DashboardCache,
    pub sync: SyncReporter,
}

impl AppState {
    /// Wires every component to the same injected store handle.
    pub fn new(store: DbHandle, config: &Config) -> Self {
        let collections = config.collections.clone();
        Self {
            records: RecordStore::new(store.clone(), collections.clone(), config.settings_defaults.clone()),
            metrics: MetricsAggregator::new(store.clone(), collections.clone()),
            dashboard: DashboardCache::new(store.clone(), collections.clone(), config.dashboard_defaults.clone()),
            sync: SyncReporter::new(store.clone(), collections),
            store,
        }
    }
}
