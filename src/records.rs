//! Typed CRUD over the dashboard's collections.
//!
//! Every write passes through [`crate::validation`] first and is stamped with
//! `createdAt`/`updatedAt`. "Not found" is reported as a zero count, `false` or
//! `None`, never as an error.

use std::collections::BTreeMap;

use chrono::Utc;
use mongodb::bson::{doc, Bson, Document};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::{Collections, SettingsDefaults};
use crate::database::{to_bson_datetime, DbHandle, Filter, FindOptions, SortOrder, Update};
use crate::error::{AccessError, StoreError, ValidationError};
use crate::metrics::reason_indicates_purchase;
use crate::models::{ApiBinding, PromoCode, Server, Service, Settings, Transaction, TransactionKind, User};
use crate::validation::{parse_identifier, parse_integer, parse_number, parse_url, sanitize_string};

/// Untrusted form input, keyed by field name.
pub type FormData = Map<String, Value>;

const NAME_MAX: usize = 100;
const SHORT_MAX: usize = 32;
const COUNTRY_MAX: usize = 64;
const FLAG_MAX: usize = 16;
const DESCRIPTION_MAX: usize = 500;
const SECRET_MAX: usize = 256;
const REASON_MAX: usize = 200;
const USERNAME_MAX: usize = 32;
const FIRST_NAME_MAX: usize = 64;

/// Seeded into an empty flag collection, one entry per default country.
pub const DEFAULT_FLAGS: [(&str, &str); 5] = [
    ("India", "🇮🇳"),
    ("United States", "🇺🇸"),
    ("United Kingdom", "🇬🇧"),
    ("Russia", "🇷🇺"),
    ("Indonesia", "🇮🇩"),
];

/// Collects per-field validation results so one error can name every bad field.
struct FieldCheck<'a> {
    data: &'a FormData,
    failed: Vec<String>,
}

impl<'a> FieldCheck<'a> {
    fn new(data: &'a FormData) -> Self {
        Self {
            data,
            failed: Vec::new(),
        }
    }

    fn value(&self, field: &str) -> Option<&'a Value> {
        self.data.get(field).filter(|v| !v.is_null())
    }

    fn reject(&mut self, field: &str) {
        self.failed.push(field.to_string());
    }

    /// Required text; blank after sanitizing counts as missing.
    fn text(&mut self, field: &str, max: usize) -> String {
        match self.value(field).and_then(|v| sanitize_string(v, max)) {
            Some(text) if !text.is_empty() => text,
            _ => {
                self.reject(field);
                String::new()
            }
        }
    }

    fn optional_text(&mut self, field: &str, max: usize) -> Option<String> {
        let value = self.value(field)?;
        let text = sanitize_string(value, max);
        if text.is_none() {
            self.reject(field);
        }
        text.filter(|t| !t.is_empty())
    }

    fn identifier(&mut self, field: &str) -> String {
        match self.value(field).and_then(parse_identifier) {
            Some(id) => id,
            None => {
                self.reject(field);
                String::new()
            }
        }
    }

    fn url(&mut self, field: &str) -> String {
        match self.value(field).and_then(parse_url) {
            Some(url) => url,
            None => {
                self.reject(field);
                String::new()
            }
        }
    }

    /// Required number that must be zero or greater.
    fn amount(&mut self, field: &str) -> f64 {
        match self.value(field).and_then(parse_number) {
            Some(n) if n >= 0.0 => n,
            _ => {
                self.reject(field);
                0.0
            }
        }
    }

    fn optional_amount(&mut self, field: &str) -> Option<f64> {
        let value = self.value(field)?;
        let parsed = parse_number(value).filter(|n| *n >= 0.0);
        if parsed.is_none() {
            self.reject(field);
        }
        parsed
    }

    fn count(&mut self, field: &str) -> i64 {
        match self.value(field).and_then(parse_integer) {
            Some(n) if n >= 0 => n,
            _ => {
                self.reject(field);
                0
            }
        }
    }

    fn optional_count(&mut self, field: &str) -> Option<i64> {
        let value = self.value(field)?;
        let parsed = parse_integer(value).filter(|n| *n >= 0);
        if parsed.is_none() {
            self.reject(field);
        }
        parsed
    }

    fn optional_flag(&mut self, field: &str) -> Option<bool> {
        let parsed = match self.value(field)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "1" => Some(true),
                "false" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            self.reject(field);
        }
        parsed
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { fields: self.failed })
        }
    }
}

/// Record store accessor over an injected store handle.
#[derive(Clone)]
pub struct RecordStore {
    store: DbHandle,
    collections: Collections,
    settings_defaults: SettingsDefaults,
}

impl RecordStore {
    pub fn new(store: DbHandle, collections: Collections, settings_defaults: SettingsDefaults) -> Self {
        Self {
            store,
            collections,
            settings_defaults,
        }
    }

    // ---- servers ----

    #[instrument(name = "records.add_server", skip_all)]
    pub async fn add_server(&self, data: &FormData) -> Result<String, AccessError> {
        self.store.ensure_connected().await?;

        let mut check = FieldCheck::new(data);
        let name = check.text("name", NAME_MAX);
        let country = check.text("country", COUNTRY_MAX);
        let flag = check.text("flag", FLAG_MAX);
        let status = check.optional_text("status", SHORT_MAX);
        check.finish()?;

        let mut document = doc! {
            "name": name,
            "country": country,
            "flag": flag,
            "status": status.unwrap_or_else(|| "active".to_string()),
        };
        stamp_created(&mut document);

        let id = self.store.insert_one(&self.collections.servers, document).await?;
        info!("Added server {}", id);
        Ok(id)
    }

    pub async fn delete_server(&self, id: &str) -> Result<u64, AccessError> {
        self.delete_by_id(&self.collections.servers, id).await
    }

    pub async fn delete_all_servers(&self) -> Result<u64, AccessError> {
        self.delete_all(&self.collections.servers).await
    }

    pub async fn list_servers(&self) -> Result<Vec<Server>, AccessError> {
        self.list(&self.collections.servers, Server::from_document).await
    }

    // ---- services ----

    #[instrument(name = "records.add_service", skip_all)]
    pub async fn add_service(&self, data: &FormData) -> Result<String, AccessError> {
        self.store.ensure_connected().await?;

        let mut check = FieldCheck::new(data);
        let server_id = check.identifier("server_id");
        let name = check.text("name", NAME_MAX);
        let code = check.text("code", SHORT_MAX);
        let price = check.text("price", SHORT_MAX);
        let description = check.optional_text("description", DESCRIPTION_MAX);
        let cancel_disable = check.optional_count("cancel_disable");
        check.finish()?;

        let mut document = doc! {
            "server_id": server_id,
            "name": name,
            "code": code,
            "price": price,
            "description": description.map_or(Bson::Null, Bson::String),
            "cancel_disable": cancel_disable.map_or(Bson::Null, Bson::Int64),
            "users": 0_i64,
        };
        stamp_created(&mut document);

        let id = self.store.insert_one(&self.collections.services, document).await?;
        info!("Added service {}", id);
        Ok(id)
    }

    pub async fn delete_service(&self, id: &str) -> Result<u64, AccessError> {
        self.delete_by_id(&self.collections.services, id).await
    }

    pub async fn delete_all_services(&self) -> Result<u64, AccessError> {
        self.delete_all(&self.collections.services).await
    }

    pub async fn list_services(&self) -> Result<Vec<Service>, AccessError> {
        self.list(&self.collections.services, Service::from_document).await
    }

    // ---- external API bindings ----

    pub async fn add_api_binding(&self, data: &FormData) -> Result<String, AccessError> {
        self.store.ensure_connected().await?;

        let mut check = FieldCheck::new(data);
        let server_id = check.identifier("server_id");
        let name = check.text("name", NAME_MAX);
        let api_url = check.url("api_url");
        let api_key = check.text("api_key", SECRET_MAX);
        check.finish()?;

        let mut document = doc! {
            "server_id": server_id,
            "name": name,
            "api_url": api_url,
            "api_key": api_key,
        };
        stamp_created(&mut document);

        Ok(self.store.insert_one(&self.collections.api_bindings, document).await?)
    }

    pub async fn delete_api_binding(&self, id: &str) -> Result<u64, AccessError> {
        self.delete_by_id(&self.collections.api_bindings, id).await
    }

    pub async fn delete_all_api_bindings(&self) -> Result<u64, AccessError> {
        self.delete_all(&self.collections.api_bindings).await
    }

    pub async fn list_api_bindings(&self) -> Result<Vec<ApiBinding>, AccessError> {
        self.list(&self.collections.api_bindings, ApiBinding::from_document)
            .await
    }

    // ---- flags ----

    pub async fn add_flag(&self, data: &FormData) -> Result<String, AccessError> {
        self.store.ensure_connected().await?;

        let mut check = FieldCheck::new(data);
        let country = check.text("country", COUNTRY_MAX);
        let flag = check.text("flag", FLAG_MAX);
        check.finish()?;

        let mut document = doc! { "country": country, "flag": flag };
        stamp_created(&mut document);
        Ok(self.store.insert_one(&self.collections.flags, document).await?)
    }

    pub async fn delete_flag(&self, id: &str) -> Result<u64, AccessError> {
        self.delete_by_id(&self.collections.flags, id).await
    }

    pub async fn delete_all_flags(&self) -> Result<u64, AccessError> {
        self.delete_all(&self.collections.flags).await
    }

    /// Country to flag glyph. Seeds [`DEFAULT_FLAGS`] into an empty collection first.
    #[instrument(name = "records.get_flags", skip_all)]
    pub async fn get_flags(&self) -> Result<BTreeMap<String, String>, AccessError> {
        let collection = &self.collections.flags;

        if self.store.count_documents(collection, &Filter::All).await? == 0 {
            info!("Flag collection empty, seeding {} defaults", DEFAULT_FLAGS.len());
            let now = to_bson_datetime(Utc::now());
            for (country, flag) in DEFAULT_FLAGS {
                // Upsert by country so concurrent first calls cannot duplicate entries.
                let update = Update {
                    set_on_insert: doc! { "flag": flag, "createdAt": now, "updatedAt": now },
                    ..Update::default()
                };
                self.store
                    .update_one(collection, &Filter::eq("country", country), &update, true)
                    .await?;
            }
        }

        let docs = self
            .store
            .find(collection, &Filter::All, &FindOptions::default())
            .await?;

        let mut flags = BTreeMap::new();
        for doc in &docs {
            match (doc.get_str("country"), doc.get_str("flag")) {
                (Ok(country), Ok(flag)) => {
                    flags.entry(country.to_string()).or_insert_with(|| flag.to_string());
                }
                _ => warn!("Skipping malformed flag document in '{}'", collection),
            }
        }
        Ok(flags)
    }

    // ---- promo codes ----

    pub async fn add_promo_code(&self, data: &FormData) -> Result<String, AccessError> {
        self.store.ensure_connected().await?;

        let mut check = FieldCheck::new(data);
        let code = check.text("code", SHORT_MAX);
        let amount = check.amount("amount");
        let max_uses = check.count("max_uses");
        check.finish()?;

        let mut document = doc! {
            "code": code.to_ascii_uppercase(),
            "amount": amount,
            "max_uses": max_uses,
            "used_count": 0_i64,
        };
        stamp_created(&mut document);
        Ok(self.store.insert_one(&self.collections.promo_codes, document).await?)
    }

    pub async fn delete_promo_code(&self, id: &str) -> Result<u64, AccessError> {
        self.delete_by_id(&self.collections.promo_codes, id).await
    }

    pub async fn delete_all_promo_codes(&self) -> Result<u64, AccessError> {
        self.delete_all(&self.collections.promo_codes).await
    }

    pub async fn list_promo_codes(&self) -> Result<Vec<PromoCode>, AccessError> {
        self.list(&self.collections.promo_codes, PromoCode::from_document)
            .await
    }

    // ---- settings ----

    /// Returns the settings document, creating it from configured defaults when absent.
    pub async fn get_settings(&self) -> Result<Settings, AccessError> {
        let collection = &self.collections.settings;

        if let Some(doc) = self.store.find_one(collection, &Filter::All).await? {
            return decode_one(collection, &doc, Settings::from_document);
        }

        let defaults = Settings {
            bot_name: self.settings_defaults.bot_name.clone(),
            support_username: self.settings_defaults.support_username.clone(),
            currency_symbol: self.settings_defaults.currency_symbol.clone(),
            min_recharge: self.settings_defaults.min_recharge,
            referral_bonus: self.settings_defaults.referral_bonus,
            maintenance_mode: false,
            updated_at: None,
        };
        let mut document = defaults.to_document();
        stamp_created(&mut document);

        // Filter::All matches any existing document, so a racing creator wins and we no-op.
        let update = Update {
            set_on_insert: document,
            ..Update::default()
        };
        self.store.update_one(collection, &Filter::All, &update, true).await?;
        info!("Created settings document from configured defaults");

        let doc = self
            .store
            .find_one(collection, &Filter::All)
            .await?
            .ok_or_else(|| StoreError::decode(collection, "settings missing after creation"))?;
        decode_one(collection, &doc, Settings::from_document)
    }

    pub async fn update_settings(&self, data: &FormData) -> Result<Settings, AccessError> {
        self.store.ensure_connected().await?;

        let mut check = FieldCheck::new(data);
        let bot_name = check.optional_text("bot_name", NAME_MAX);
        let support_username = check.optional_text("support_username", USERNAME_MAX);
        let currency_symbol = check.optional_text("currency_symbol", 8);
        let min_recharge = check.optional_amount("min_recharge");
        let referral_bonus = check.optional_amount("referral_bonus");
        let maintenance_mode = check.optional_flag("maintenance_mode");
        check.finish()?;

        // Make sure there is a document to update.
        self.get_settings().await?;

        let mut set = Document::new();
        if let Some(v) = bot_name {
            set.insert("bot_name", v);
        }
        if let Some(v) = support_username {
            set.insert("support_username", v);
        }
        if let Some(v) = currency_symbol {
            set.insert("currency_symbol", v);
        }
        if let Some(v) = min_recharge {
            set.insert("min_recharge", v);
        }
        if let Some(v) = referral_bonus {
            set.insert("referral_bonus", v);
        }
        if let Some(v) = maintenance_mode {
            set.insert("maintenance_mode", v);
        }
        set.insert("updatedAt", to_bson_datetime(Utc::now()));

        self.store
            .update_one(&self.collections.settings, &Filter::All, &Update::set(set), false)
            .await?;
        self.get_settings().await
    }

    // ---- users (bot-owned) ----

    pub async fn get_or_create_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<User, AccessError> {
        self.store.ensure_connected().await?;
        check_user_id(user_id)?;

        let username = sanitize_optional("username", username, USERNAME_MAX)?;
        let first_name = sanitize_optional("first_name", first_name, FIRST_NAME_MAX)?;

        let now = to_bson_datetime(Utc::now());
        let update = Update {
            set_on_insert: doc! {
                "username": username.map_or(Bson::Null, Bson::String),
                "first_name": first_name.map_or(Bson::Null, Bson::String),
                "balance": 0.0,
                "banned": false,
                "total_purchased": 0_i64,
                "total_used": 0_i64,
                "transactions": [],
                "created_at": now,
                "updated_at": now,
            },
            ..Update::default()
        };
        let collection = &self.collections.users;
        let filter = Filter::eq("user_id", user_id);
        let outcome = self.store.update_one(collection, &filter, &update, true).await?;
        if outcome.upserted {
            info!("Created new user: {}", user_id);
        }

        let doc = self
            .store
            .find_one(collection, &filter)
            .await?
            .ok_or_else(|| StoreError::decode(collection, format!("user {user_id} missing after upsert")))?;
        decode_one(collection, &doc, User::from_document)
    }

    /// Adds to a user's balance and records a credit entry. `false` when the user does not exist.
    #[instrument(name = "records.credit_balance", skip(self, reason))]
    pub async fn credit_balance(&self, user_id: i64, amount: f64, reason: &str) -> Result<bool, AccessError> {
        self.store.ensure_connected().await?;
        let (amount, reason) = check_adjustment(user_id, amount, reason)?;

        let update = balance_update(TransactionKind::Credit, amount, &reason);
        let outcome = self
            .store
            .update_one(&self.collections.users, &Filter::eq("user_id", user_id), &update, false)
            .await?;
        Ok(outcome.matched > 0)
    }

    /// Deducts from a user's balance only when it covers `amount`.
    /// `false` when the user does not exist or the balance is insufficient.
    #[instrument(name = "records.debit_balance", skip(self, reason))]
    pub async fn debit_balance(&self, user_id: i64, amount: f64, reason: &str) -> Result<bool, AccessError> {
        self.store.ensure_connected().await?;
        let (amount, reason) = check_adjustment(user_id, amount, reason)?;

        let filter = Filter::eq("user_id", user_id).and(Filter::gte("balance", amount));
        let update = balance_update(TransactionKind::Debit, -amount, &reason);
        let outcome = self
            .store
            .update_one(&self.collections.users, &filter, &update, false)
            .await?;
        if outcome.matched == 0 {
            debug!("Debit of {} refused for user {}", amount, user_id);
        }
        Ok(outcome.matched > 0)
    }

    /// The last `limit` transactions in stored order, or `None` for an unknown user.
    pub async fn transaction_history(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Option<Vec<Transaction>>, AccessError> {
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(None);
        };
        Ok(Some(last_entries(user.transactions, limit)))
    }

    /// The last `limit` number purchases: debits whose reason marks them as a purchase.
    pub async fn number_history(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Option<Vec<Transaction>>, AccessError> {
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(None);
        };
        let purchases = user
            .transactions
            .into_iter()
            .filter(|tx| tx.kind == TransactionKind::Debit && reason_indicates_purchase(&tx.reason))
            .collect();
        Ok(Some(last_entries(purchases, limit)))
    }

    pub async fn increment_purchased_count(&self, user_id: i64) -> Result<bool, AccessError> {
        self.bump_counter(user_id, "total_purchased").await
    }

    pub async fn increment_used_count(&self, user_id: i64) -> Result<bool, AccessError> {
        self.bump_counter(user_id, "total_used").await
    }

    /// Removes every bot user. Returns the number of deleted records.
    #[instrument(name = "records.clear_all_user_data", skip(self))]
    pub async fn clear_all_user_data(&self) -> Result<u64, AccessError> {
        let deleted = self.store.delete_many(&self.collections.users, &Filter::All).await?;
        warn!("Cleared all user data: {} user record(s) deleted", deleted);
        Ok(deleted)
    }

    pub async fn set_banned(&self, user_id: i64, banned: bool) -> Result<bool, AccessError> {
        self.store.ensure_connected().await?;
        let update = Update::set(doc! {
            "banned": banned,
            "updated_at": to_bson_datetime(Utc::now()),
        });
        let outcome = self
            .store
            .update_one(&self.collections.users, &Filter::eq("user_id", user_id), &update, false)
            .await?;
        Ok(outcome.matched > 0)
    }

    // ---- shared helpers ----

    async fn find_user(&self, user_id: i64) -> Result<Option<User>, AccessError> {
        let collection = &self.collections.users;
        match self.store.find_one(collection, &Filter::eq("user_id", user_id)).await? {
            Some(doc) => decode_one(collection, &doc, User::from_document).map(Some),
            None => Ok(None),
        }
    }

    async fn bump_counter(&self, user_id: i64, field: &str) -> Result<bool, AccessError> {
        self.store.ensure_connected().await?;
        check_user_id(user_id)?;
        let mut inc = Document::new();
        inc.insert(field, 1_i64);
        let update = Update {
            set: doc! { "updated_at": to_bson_datetime(Utc::now()) },
            inc,
            ..Update::default()
        };
        let outcome = self
            .store
            .update_one(&self.collections.users, &Filter::eq("user_id", user_id), &update, false)
            .await?;
        Ok(outcome.matched > 0)
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<u64, AccessError> {
        self.store.ensure_connected().await?;
        let filter = parse_identifier(&Value::String(id.to_string()))
            .and_then(|id| Filter::id(&id))
            .ok_or_else(|| ValidationError::field("id"))?;

        let deleted = self.store.delete_one(collection, &filter).await?;
        info!("Deleted {} document(s) from '{}' for id {}", deleted, collection, id);
        Ok(deleted)
    }

    async fn delete_all(&self, collection: &str) -> Result<u64, AccessError> {
        let deleted = self.store.delete_many(collection, &Filter::All).await?;
        info!("Deleted all {} document(s) from '{}'", deleted, collection);
        Ok(deleted)
    }

    async fn list<T>(&self, collection: &str, decode: fn(&Document) -> Option<T>) -> Result<Vec<T>, AccessError> {
        let options = FindOptions::default().sort("createdAt", SortOrder::Descending);
        let docs = self.store.find(collection, &Filter::All, &options).await?;
        Ok(decode_all(collection, &docs, decode))
    }
}

/// Decodes every well-formed document, logging and skipping the rest.
pub(crate) fn decode_all<T>(collection: &str, docs: &[Document], decode: fn(&Document) -> Option<T>) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| {
            let decoded = decode(doc);
            if decoded.is_none() {
                warn!("Skipping malformed document in '{}': {:?}", collection, doc.get("_id"));
            }
            decoded
        })
        .collect()
}

fn decode_one<T>(collection: &str, doc: &Document, decode: fn(&Document) -> Option<T>) -> Result<T, AccessError> {
    decode(doc).ok_or_else(|| StoreError::decode(collection, "required fields missing").into())
}

fn last_entries(entries: Vec<Transaction>, limit: usize) -> Vec<Transaction> {
    let skip = entries.len().saturating_sub(limit);
    entries.into_iter().skip(skip).collect()
}

fn stamp_created(document: &mut Document) {
    let now = to_bson_datetime(Utc::now());
    document.insert("createdAt", now);
    document.insert("updatedAt", now);
}

fn check_user_id(user_id: i64) -> Result<(), ValidationError> {
    if user_id > 0 {
        Ok(())
    } else {
        Err(ValidationError::field("user_id"))
    }
}

fn sanitize_optional(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, ValidationError> {
    match value {
        None => Ok(None),
        Some(raw) => sanitize_string(&Value::String(raw.to_string()), max)
            .map(Some)
            .ok_or_else(|| ValidationError::field(field)),
    }
}

fn check_adjustment(user_id: i64, amount: f64, reason: &str) -> Result<(f64, String), ValidationError> {
    let mut failed = Vec::new();
    if user_id <= 0 {
        failed.push("user_id".to_string());
    }
    if !(amount.is_finite() && amount > 0.0) {
        failed.push("amount".to_string());
    }
    let reason = sanitize_string(&Value::String(reason.to_string()), REASON_MAX);
    if reason.is_none() {
        failed.push("reason".to_string());
    }

    match reason {
        Some(reason) if failed.is_empty() => Ok((amount, reason)),
        _ => Err(ValidationError { fields: failed }),
    }
}

fn balance_update(kind: TransactionKind, delta: f64, reason: &str) -> Update {
    let now = Utc::now();
    let entry = Transaction::new(kind, reason, delta.abs(), now);
    Update {
        set: doc! { "updated_at": to_bson_datetime(now) },
        inc: doc! { "balance": delta },
        push: doc! { "transactions": entry.to_document() },
        ..Update::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(value: Value) -> FormData {
        match value {
            Value::Object(map) => map,
            _ => FormData::new(),
        }
    }

    #[test]
    fn test_field_check_collects_every_failure() {
        let data = form(json!({ "name": "<>", "country": 12, "status": "x".repeat(40) }));
        let mut check = FieldCheck::new(&data);
        check.text("name", NAME_MAX);
        check.text("country", COUNTRY_MAX);
        check.text("flag", FLAG_MAX);
        check.optional_text("status", SHORT_MAX);

        let err = check.finish().unwrap_err();
        assert_eq!(err.fields, vec!["name", "country", "flag", "status"]);
    }

    #[test]
    fn test_field_check_optional_absent_is_fine() {
        let data = form(json!({ "description": null }));
        let mut check = FieldCheck::new(&data);
        assert_eq!(check.optional_text("description", DESCRIPTION_MAX), None);
        assert_eq!(check.optional_count("cancel_disable"), None);
        assert!(check.finish().is_ok());
    }

    #[test]
    fn test_check_adjustment() {
        assert!(check_adjustment(7, 10.0, "Admin top-up").is_ok());
        let err = check_adjustment(0, -1.0, "ok").unwrap_err();
        assert_eq!(err.fields, vec!["user_id", "amount"]);
        assert!(check_adjustment(7, f64::NAN, "ok").is_err());
    }

    #[test]
    fn test_balance_update_records_positive_amount() {
        let update = balance_update(TransactionKind::Debit, -4.5, "Number purchase");
        assert_eq!(update.inc.get_f64("balance").unwrap(), -4.5);
        let entry = update.push.get_document("transactions").unwrap();
        assert_eq!(entry.get_str("type").unwrap(), "debit");
        assert_eq!(entry.get_f64("amount").unwrap(), 4.5);
    }
}
