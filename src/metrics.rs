// User and sales metrics derived from the bot's embedded transaction logs

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use mongodb::bson::Document;
use regex::{Regex, RegexBuilder};
use tracing::{instrument, warn};

use crate::config::Collections;
use crate::database::{
    first_group_count, first_group_sum, to_bson_datetime, Accumulator, DbHandle, Filter, FindOptions, SortOrder,
    Stage,
};
use crate::error::StoreError;
use crate::models::{round_cents, DashboardSnapshot, Service, UserMetrics};
use crate::records::decode_all;

/// Case-insensitive reason pattern marking a debit as a number purchase.
pub const PURCHASE_REASON_PATTERN: &str = "number|purchase|bought";

const TOP_SERVICES: i64 = 3;

fn purchase_regex() -> Option<&'static Regex> {
    static PURCHASE: OnceLock<Option<Regex>> = OnceLock::new();
    PURCHASE
        .get_or_init(|| {
            RegexBuilder::new(PURCHASE_REASON_PATTERN)
                .case_insensitive(true)
                .build()
                .ok()
        })
        .as_ref()
}

/// Same classification the store applies through its regex filter.
pub fn reason_indicates_purchase(reason: &str) -> bool {
    purchase_regex().is_some_and(|re| re.is_match(reason))
}

/// Start of the current local day, expressed in UTC.
pub fn local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_timezone(&Local)
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map_or(now, |midnight| midnight.with_timezone(&Utc))
}

fn purchase_filter() -> Filter {
    Filter::eq("transactions.type", "debit").and(Filter::regex_ci("transactions.reason", PURCHASE_REASON_PATTERN))
}

/// Fail-soft metric reads. Every failure is logged and degrades to zeros.
#[derive(Clone)]
pub struct MetricsAggregator {
    store: DbHandle,
    collections: Collections,
}

impl MetricsAggregator {
    pub fn new(store: DbHandle, collections: Collections) -> Self {
        Self { store, collections }
    }

    pub async fn compute_user_metrics(&self) -> UserMetrics {
        self.compute_user_metrics_at(Utc::now()).await
    }

    #[instrument(name = "metrics.user_metrics", skip(self))]
    pub async fn compute_user_metrics_at(&self, now: DateTime<Utc>) -> UserMetrics {
        match self.read_user_metrics(now).await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Failed to compute user metrics, reporting zeros: {}", e);
                UserMetrics::default()
            }
        }
    }

    async fn read_user_metrics(&self, now: DateTime<Utc>) -> Result<UserMetrics, StoreError> {
        let users = self.collections.users.as_str();
        let today = to_bson_datetime(local_midnight(now));
        let day_ago = to_bson_datetime(now - Duration::hours(24));
        let in_last_day = || Filter::gte("transactions.timestamp", day_ago);
        let everyone = Filter::All;
        let created_today = Filter::gte("created_at", today);

        let (
            total_users,
            users_today,
            total_balance,
            total_transactions,
            transactions_24h,
            numbers_sold,
            numbers_sold_24h,
        ) = tokio::try_join!(
            self.store.count_documents(users, &everyone),
            self.store.count_documents(users, &created_today),
            self.sum_balances(),
            self.count_transactions(Filter::All),
            self.count_transactions(in_last_day()),
            self.count_transactions(purchase_filter()),
            self.count_transactions(purchase_filter().and(in_last_day())),
        )?;

        Ok(UserMetrics {
            total_users,
            users_today,
            total_balance,
            total_transactions,
            transactions_24h,
            numbers_sold,
            numbers_sold_24h,
        })
    }

    async fn sum_balances(&self) -> Result<f64, StoreError> {
        let pipeline = [Stage::Group {
            key: None,
            fields: vec![("total".to_string(), Accumulator::Sum("balance".to_string()))],
        }];
        let groups = self.store.aggregate(&self.collections.users, &pipeline).await?;
        Ok(round_cents(first_group_sum(&groups, "total")))
    }

    /// Counts flattened transactions matching `filter`, in stored order per user.
    async fn count_transactions(&self, filter: Filter) -> Result<u64, StoreError> {
        let mut pipeline = vec![Stage::Unwind("transactions".to_string())];
        if filter != Filter::All {
            pipeline.push(Stage::Match(filter));
        }
        pipeline.push(Stage::Group {
            key: None,
            fields: vec![("count".to_string(), Accumulator::Count)],
        });

        let groups = self.store.aggregate(&self.collections.users, &pipeline).await?;
        Ok(first_group_count(&groups, "count"))
    }

    /// Metrics, best sellers and record counts. Each part degrades on its own.
    #[instrument(name = "metrics.dashboard_snapshot", skip(self))]
    pub async fn compute_dashboard_snapshot(&self) -> DashboardSnapshot {
        let everything = Filter::All;
        let (metrics, top_services, total_servers, total_services) = tokio::join!(
            self.compute_user_metrics(),
            self.top_services(),
            self.store.count_documents(&self.collections.servers, &everything),
            self.store.count_documents(&self.collections.services, &everything),
        );

        DashboardSnapshot {
            metrics,
            top_services: top_services.unwrap_or_else(|e| {
                warn!("Failed to read top services: {}", e);
                Vec::new()
            }),
            total_servers: total_servers.unwrap_or_else(|e| {
                warn!("Failed to count servers: {}", e);
                0
            }),
            total_services: total_services.unwrap_or_else(|e| {
                warn!("Failed to count services: {}", e);
                0
            }),
        }
    }

    async fn top_services(&self) -> Result<Vec<Service>, StoreError> {
        let collection = &self.collections.services;
        let options = FindOptions::default()
            .sort("users", SortOrder::Descending)
            .limit(TOP_SERVICES);
        let docs: Vec<Document> = self.store.find(collection, &Filter::All, &options).await?;
        Ok(decode_all(collection, &docs, Service::from_document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reason_indicates_purchase() {
        assert!(reason_indicates_purchase("Number"));
        assert!(reason_indicates_purchase("Purchase of WhatsApp OTP"));
        assert!(reason_indicates_purchase("bought telegram number"));
        assert!(!reason_indicates_purchase("Admin top-up"));
        assert!(!reason_indicates_purchase(""));
    }

    #[test]
    fn test_purchase_regex_is_compiled_once() {
        let first = purchase_regex().unwrap();
        let second = purchase_regex().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_local_midnight_is_not_after_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let midnight = local_midnight(now);
        assert!(midnight <= now);
        assert!(now - midnight < Duration::hours(25));
    }

    #[test]
    fn test_purchase_filter_shape() {
        assert_eq!(
            purchase_filter(),
            Filter::And(vec![
                Filter::eq("transactions.type", "debit"),
                Filter::regex_ci("transactions.reason", PURCHASE_REASON_PATTERN),
            ])
        );
    }
}
