// Canonical (bot) vs mirrored (website) collection comparison

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::config::Collections;
use crate::database::{bson_to_datetime, DbHandle, Filter, FindOptions, SortOrder};
use crate::error::{StoreError, SyncError};
use crate::models::{SyncReport, SyncStatus};

const LAST_SYNC_FIELD: &str = "last_sync";

/// Fail-hard sync reporter: an unreadable collection fails the whole report.
#[derive(Clone)]
pub struct SyncReporter {
    store: DbHandle,
    collections: Collections,
}

impl SyncReporter {
    pub fn new(store: DbHandle, collections: Collections) -> Self {
        Self { store, collections }
    }

    #[instrument(name = "sync.status", skip(self))]
    pub async fn sync_status(&self) -> Result<SyncReport, SyncError> {
        let c = &self.collections;
        let (users, services, servers) = tokio::try_join!(
            self.compare("users", &c.users, &c.website_users),
            self.compare("services", &c.services, &c.website_services),
            self.compare("servers", &c.servers, &c.website_servers),
        )?;

        let overall_synced = users.synced && services.synced && servers.synced;
        if overall_synced {
            info!("All collections in sync");
        } else {
            warn!(
                "Collections out of sync: users {}/{}, services {}/{}, servers {}/{}",
                users.bot_count,
                users.website_count,
                services.bot_count,
                services.website_count,
                servers.bot_count,
                servers.website_count
            );
        }

        Ok(SyncReport {
            users,
            services,
            servers,
            overall_synced,
            checked_at: Utc::now(),
        })
    }

    async fn compare(&self, kind: &str, canonical: &str, mirrored: &str) -> Result<SyncStatus, SyncError> {
        let failed = |source: StoreError| SyncError {
            kind: kind.to_string(),
            source,
        };

        let everything = Filter::All;
        let (bot_count, website_count, last_sync) = tokio::try_join!(
            self.store.count_documents(canonical, &everything),
            self.store.count_documents(mirrored, &everything),
            self.last_sync(mirrored),
        )
        .map_err(failed)?;

        Ok(SyncStatus {
            bot_count,
            website_count,
            synced: bot_count == website_count,
            last_sync,
        })
    }

    /// Newest `last_sync` marker in the mirrored collection.
    async fn last_sync(&self, mirrored: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let options = FindOptions::default()
            .sort(LAST_SYNC_FIELD, SortOrder::Descending)
            .limit(1);
        let docs = self
            .store
            .find(mirrored, &Filter::exists(LAST_SYNC_FIELD), &options)
            .await?;
        Ok(docs
            .first()
            .and_then(|doc| doc.get(LAST_SYNC_FIELD))
            .and_then(bson_to_datetime))
    }
}
