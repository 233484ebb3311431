// Singleton dashboard stats record, recomputed from services and servers

use chrono::Utc;
use mongodb::bson::{doc, Document};
use tracing::{info, instrument};

use crate::config::{Collections, DashboardDefaults};
use crate::database::{bson_to_i64, to_bson_datetime, DbHandle, Filter, FindOptions, Update};
use crate::error::AccessError;
use crate::models::{parse_price, price_text, round_cents, DashboardStats, DASHBOARD_STATS_TYPE};

#[derive(Clone)]
pub struct DashboardCache {
    store: DbHandle,
    collections: Collections,
    defaults: DashboardDefaults,
}

impl DashboardCache {
    pub fn new(store: DbHandle, collections: Collections, defaults: DashboardDefaults) -> Self {
        Self {
            store,
            collections,
            defaults,
        }
    }

    fn singleton() -> Filter {
        Filter::eq("type", DASHBOARD_STATS_TYPE)
    }

    /// Recomputes the snapshot and upserts it. Store failures propagate.
    #[instrument(name = "dashboard.refresh", skip(self))]
    pub async fn refresh_dashboard_cache(&self) -> Result<DashboardStats, AccessError> {
        let everything = Filter::All;
        let options = FindOptions::default();
        let (docs, total_servers, total_services) = tokio::try_join!(
            self.store.find(&self.collections.services, &everything, &options),
            self.store.count_documents(&self.collections.servers, &everything),
            self.store.count_documents(&self.collections.services, &everything),
        )?;

        let stats = summarize(&docs, total_servers, total_services, &self.defaults);

        let now = Utc::now();
        let stamp = to_bson_datetime(now);
        let mut set: Document = stats.to_document();
        set.insert("updatedAt", stamp);
        let update = Update {
            set,
            set_on_insert: doc! { "createdAt": stamp },
            ..Update::default()
        };
        self.store
            .update_one(&self.collections.dashboard_stats, &Self::singleton(), &update, true)
            .await?;

        info!(
            "Dashboard cache refreshed: {} services, {} servers, earnings {:.2}",
            total_services, total_servers, stats.earnings_total
        );
        Ok(DashboardStats {
            updated_at: Some(now),
            ..stats
        })
    }

    /// Removes the singleton. `true` only when a record existed.
    pub async fn clear_dashboard_cache(&self) -> Result<bool, AccessError> {
        let deleted = self
            .store
            .delete_one(&self.collections.dashboard_stats, &Self::singleton())
            .await?;
        if deleted > 0 {
            info!("Dashboard cache cleared");
        }
        Ok(deleted > 0)
    }

    pub async fn cached_dashboard(&self) -> Result<Option<DashboardStats>, AccessError> {
        let doc = self
            .store
            .find_one(&self.collections.dashboard_stats, &Self::singleton())
            .await?;
        Ok(doc.as_ref().and_then(DashboardStats::from_document))
    }
}

/// Totals over raw service documents. Every document counts, even one that would not
/// decode as a full [`crate::models::Service`]; a missing or malformed `users` or
/// `price` contributes zero for that document only.
fn summarize(
    services: &[Document],
    total_servers: u64,
    total_services: u64,
    defaults: &DashboardDefaults,
) -> DashboardStats {
    let mut users_total: i64 = 0;
    let mut earnings = 0.0;
    for service in services {
        let users = service.get("users").and_then(bson_to_i64).unwrap_or(0);
        users_total += users;
        earnings += parse_price(&price_text(service.get("price"))) * users as f64;
    }

    DashboardStats {
        earnings_today: defaults.earnings_today,
        earnings_total: round_cents(earnings),
        users_today: defaults.users_today,
        users_total,
        sold_today: defaults.sold_today,
        sold_total: users_total,
        total_servers,
        total_services,
        updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_earnings() {
        let services = [doc! { "name": "WHATSAPP", "price": "₹150", "users": 4_i64 }];
        let stats = summarize(&services, 1, 1, &DashboardDefaults::default());
        assert_eq!(stats.earnings_total, 600.0);
        assert_eq!(stats.users_total, 4);
        assert_eq!(stats.sold_total, 4);
    }

    #[test]
    fn test_summarize_skips_malformed_prices() {
        let services = [
            doc! { "price": "free", "users": 10_i64 },
            doc! { "price": "₹2.50", "users": 3_i32 },
            doc! { "price": "", "users": 1_i64 },
        ];
        let stats = summarize(&services, 0, 3, &DashboardDefaults::default());
        assert_eq!(stats.earnings_total, 7.5);
        assert_eq!(stats.users_total, 14);
    }

    #[test]
    fn test_summarize_counts_undecodable_services() {
        let services = [
            doc! { "price": "₹10", "users": 2_i64 },
            doc! { "_id": "legacy-1", "name": "TG", "price": 5.0, "users": "3" },
            doc! { "name": "no counter", "price": "₹99" },
        ];
        let stats = summarize(&services, 0, 3, &DashboardDefaults::default());
        assert_eq!(stats.users_total, 5);
        assert_eq!(stats.earnings_total, 35.0);
    }

    #[test]
    fn test_summarize_copies_configured_today_values() {
        let defaults = DashboardDefaults {
            earnings_today: 12.5,
            users_today: 2,
            sold_today: 3,
        };
        let stats = summarize(&[], 0, 0, &defaults);
        assert_eq!(stats.earnings_today, 12.5);
        assert_eq!(stats.users_today, 2);
        assert_eq!(stats.sold_today, 3);
        assert_eq!(stats.earnings_total, 0.0);
    }
}
