// Records stored by the bot and the dashboard, plus derived statistics

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::database::{bson_to_datetime, bson_to_f64, bson_to_i64, to_bson_datetime};

/// Discriminator value of the singleton dashboard stats document.
pub const DASHBOARD_STATS_TYPE: &str = "dashboard";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
    /// Any other stored value. Treated as corrupt and never classified.
    #[serde(untagged)]
    Unknown(String),
}

impl TransactionKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "credit" => Self::Credit,
            "debit" => Self::Debit,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Unknown(raw) => raw,
        }
    }
}

/// Entry of a user's embedded, append-only transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub reason: String,
    pub amount: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(kind: TransactionKind, reason: &str, amount: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
            amount,
            timestamp: Some(timestamp),
        }
    }

    pub fn from_document(doc: &Document) -> Self {
        Self {
            kind: TransactionKind::parse(doc.get_str("type").unwrap_or_default()),
            reason: doc
                .get_str("reason")
                .or_else(|_| doc.get_str("description"))
                .unwrap_or_default()
                .to_string(),
            amount: doc.get("amount").and_then(bson_to_f64).unwrap_or(0.0),
            timestamp: doc.get("timestamp").and_then(bson_to_datetime),
        }
    }

    pub fn to_document(&self) -> Document {
        doc! {
            "type": self.kind.as_str(),
            "reason": self.reason.as_str(),
            "amount": self.amount,
            "timestamp": self.timestamp.map_or(Bson::Null, |t| Bson::DateTime(to_bson_datetime(t))),
        }
    }
}

/// Bot user with its embedded transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub balance: f64,
    pub banned: bool,
    /// Numbers bought, bumped by the bot on every successful purchase.
    pub total_purchased: i64,
    /// Purchased numbers that received a code.
    pub total_used: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub transactions: Vec<Transaction>,
}

impl User {
    pub fn from_document(doc: &Document) -> Option<Self> {
        let transactions = match doc.get("transactions") {
            Some(Bson::Array(items)) => items
                .iter()
                .filter_map(Bson::as_document)
                .map(Transaction::from_document)
                .collect(),
            _ => Vec::new(),
        };

        Some(Self {
            user_id: doc.get("user_id").and_then(bson_to_i64)?,
            username: optional_str(doc, "username"),
            first_name: optional_str(doc, "first_name"),
            balance: doc.get("balance").and_then(bson_to_f64).unwrap_or(0.0),
            banned: doc.get_bool("banned").unwrap_or(false),
            total_purchased: doc.get("total_purchased").and_then(bson_to_i64).unwrap_or(0),
            total_used: doc.get("total_used").and_then(bson_to_i64).unwrap_or(0),
            created_at: doc.get("created_at").and_then(bson_to_datetime),
            updated_at: doc.get("updated_at").and_then(bson_to_datetime),
            transactions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub server_id: Option<String>,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    /// Currency-prefixed display price such as `"₹150"`.
    pub price: String,
    /// Minutes during which cancelling a purchased number is disabled.
    pub cancel_disable: Option<i64>,
    pub users: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Service {
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: doc.get_object_id("_id").ok()?.to_hex(),
            server_id: optional_str(doc, "server_id"),
            name: doc.get_str("name").ok()?.to_string(),
            code: optional_str(doc, "code").unwrap_or_default(),
            description: optional_str(doc, "description"),
            price: price_text(doc.get("price")),
            cancel_disable: doc.get("cancel_disable").and_then(bson_to_i64),
            users: doc.get("users").and_then(bson_to_i64).unwrap_or(0),
            created_at: doc.get("createdAt").and_then(bson_to_datetime),
            updated_at: doc.get("updatedAt").and_then(bson_to_datetime),
        })
    }

    /// Numeric price with the leading currency marker removed. Malformed or missing prices are 0.
    pub fn unit_price(&self) -> f64 {
        parse_price(&self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub country: String,
    pub flag: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Server {
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: doc.get_object_id("_id").ok()?.to_hex(),
            name: doc.get_str("name").ok()?.to_string(),
            country: optional_str(doc, "country")
                .or_else(|| optional_str(doc, "country_code"))
                .unwrap_or_default(),
            flag: optional_str(doc, "flag").unwrap_or_default(),
            status: optional_str(doc, "status").unwrap_or_else(|| "active".to_string()),
            created_at: doc.get("createdAt").and_then(bson_to_datetime),
            updated_at: doc.get("updatedAt").and_then(bson_to_datetime),
        })
    }
}

/// Upstream number-provider API attached to a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiBinding {
    pub id: String,
    pub server_id: String,
    pub name: String,
    pub api_url: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ApiBinding {
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: doc.get_object_id("_id").ok()?.to_hex(),
            server_id: optional_str(doc, "server_id").unwrap_or_default(),
            name: doc.get_str("name").ok()?.to_string(),
            api_url: optional_str(doc, "api_url").unwrap_or_default(),
            api_key: optional_str(doc, "api_key").unwrap_or_default(),
            created_at: doc.get("createdAt").and_then(bson_to_datetime),
            updated_at: doc.get("updatedAt").and_then(bson_to_datetime),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: String,
    pub code: String,
    pub amount: f64,
    pub max_uses: i64,
    pub used_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PromoCode {
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: doc.get_object_id("_id").ok()?.to_hex(),
            code: doc.get_str("code").ok()?.to_string(),
            amount: doc.get("amount").and_then(bson_to_f64).unwrap_or(0.0),
            max_uses: doc.get("max_uses").and_then(bson_to_i64).unwrap_or(0),
            used_count: doc.get("used_count").and_then(bson_to_i64).unwrap_or(0),
            created_at: doc.get("createdAt").and_then(bson_to_datetime),
            updated_at: doc.get("updatedAt").and_then(bson_to_datetime),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub bot_name: String,
    pub support_username: String,
    pub currency_symbol: String,
    pub min_recharge: f64,
    pub referral_bonus: f64,
    pub maintenance_mode: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Settings {
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            bot_name: doc.get_str("bot_name").ok()?.to_string(),
            support_username: optional_str(doc, "support_username").unwrap_or_default(),
            currency_symbol: optional_str(doc, "currency_symbol").unwrap_or_default(),
            min_recharge: doc.get("min_recharge").and_then(bson_to_f64).unwrap_or(0.0),
            referral_bonus: doc.get("referral_bonus").and_then(bson_to_f64).unwrap_or(0.0),
            maintenance_mode: doc.get_bool("maintenance_mode").unwrap_or(false),
            updated_at: doc.get("updatedAt").and_then(bson_to_datetime),
        })
    }

    pub fn to_document(&self) -> Document {
        doc! {
            "bot_name": self.bot_name.as_str(),
            "support_username": self.support_username.as_str(),
            "currency_symbol": self.currency_symbol.as_str(),
            "min_recharge": self.min_recharge,
            "referral_bonus": self.referral_bonus,
            "maintenance_mode": self.maintenance_mode,
        }
    }
}

/// Cached dashboard snapshot. Always reproducible from the service and server collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub earnings_today: f64,
    pub earnings_total: f64,
    pub users_today: i64,
    pub users_total: i64,
    pub sold_today: i64,
    pub sold_total: i64,
    pub total_servers: u64,
    pub total_services: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DashboardStats {
    pub fn from_document(doc: &Document) -> Option<Self> {
        let int = |key: &str| doc.get(key).and_then(bson_to_i64).unwrap_or(0);
        Some(Self {
            earnings_today: doc.get("earnings_today").and_then(bson_to_f64).unwrap_or(0.0),
            earnings_total: doc.get("earnings_total").and_then(bson_to_f64)?,
            users_today: int("users_today"),
            users_total: int("users_total"),
            sold_today: int("sold_today"),
            sold_total: int("sold_total"),
            total_servers: int("total_servers").max(0) as u64,
            total_services: int("total_services").max(0) as u64,
            updated_at: doc.get("updatedAt").and_then(bson_to_datetime),
        })
    }

    /// Snapshot fields, excluding the discriminator and timestamps.
    pub fn to_document(&self) -> Document {
        doc! {
            "earnings_today": self.earnings_today,
            "earnings_total": self.earnings_total,
            "users_today": self.users_today,
            "users_total": self.users_total,
            "sold_today": self.sold_today,
            "sold_total": self.sold_total,
            "total_servers": self.total_servers as i64,
            "total_services": self.total_services as i64,
        }
    }
}

/// Point-in-time statistics derived from the user transaction log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetrics {
    pub total_users: u64,
    pub users_today: u64,
    pub total_balance: f64,
    pub total_transactions: u64,
    pub transactions_24h: u64,
    pub numbers_sold: u64,
    pub numbers_sold_24h: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub metrics: UserMetrics,
    pub top_services: Vec<Service>,
    pub total_servers: u64,
    pub total_services: u64,
}

/// Canonical vs mirrored comparison for one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub bot_count: u64,
    pub website_count: u64,
    pub synced: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub users: SyncStatus,
    pub services: SyncStatus,
    pub servers: SyncStatus,
    pub overall_synced: bool,
    pub checked_at: DateTime<Utc>,
}

/// Strips the leading currency marker (any run of non-digit characters) and parses the rest.
pub fn parse_price(raw: &str) -> f64 {
    let digits = raw
        .trim()
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .replace(',', "");
    digits
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .unwrap_or(0.0)
}

/// Rounds a currency amount to two decimals, ties to even.
///
/// Binary noise below a millionth of a cent is discarded first, so a sum such as
/// `10.005 + 0 - 5` is treated as the exact tie `5.005` and rounds to `5.00`.
pub fn round_cents(value: f64) -> f64 {
    let cents = (value * 100.0 * 1e6).round() / 1e6;
    cents.round_ties_even() / 100.0
}

fn optional_str(doc: &Document, key: &str) -> Option<String> {
    doc.get_str(key).ok().map(str::to_string)
}

/// Prices are usually stored as text but older documents hold plain numbers.
pub(crate) fn price_text(value: Option<&Bson>) -> String {
    match value {
        Some(Bson::String(s)) => s.clone(),
        Some(other) => bson_to_f64(other).map(|p| p.to_string()).unwrap_or_default(),
        None => String::new(),
    }
}
