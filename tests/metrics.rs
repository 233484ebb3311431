mod common;

use chrono::{Duration, Utc};
use mongodb::bson::{doc, Bson, Document};
use otp_dashboard::database::to_bson_datetime;
use otp_dashboard::metrics::reason_indicates_purchase;
use otp_dashboard::models::UserMetrics;

use common::{connected_app, unconnected_app};

fn tx(kind: &str, reason: &str, amount: f64, hours_ago: i64) -> Bson {
    let at = to_bson_datetime(Utc::now() - Duration::hours(hours_ago));
    Bson::Document(doc! { "type": kind, "reason": reason, "amount": amount, "timestamp": at })
}

fn user(user_id: i64, balance: f64, transactions: Vec<Bson>) -> Document {
    doc! {
        "user_id": user_id,
        "balance": balance,
        "created_at": to_bson_datetime(Utc::now() - Duration::days(30)),
        "transactions": transactions,
    }
}

#[tokio::test]
async fn test_users_without_transactions() {
    let (memory, app) = connected_app();
    memory.seed("users", vec![user(1, 0.0, vec![]), user(2, 0.0, vec![])]);

    let metrics = app.metrics.compute_user_metrics().await;
    assert_eq!(metrics.total_users, 2);
    assert_eq!(metrics.total_transactions, 0);
    assert_eq!(metrics.transactions_24h, 0);
    assert_eq!(metrics.numbers_sold, 0);
    assert_eq!(metrics.numbers_sold_24h, 0);
}

#[tokio::test]
async fn test_purchase_requires_debit() {
    let (memory, app) = connected_app();
    memory.seed(
        "users",
        vec![
            user(1, 10.0, vec![tx("debit", "Number", 5.0, 1)]),
            user(2, 10.0, vec![tx("credit", "Number", 5.0, 1)]),
        ],
    );

    let metrics = app.metrics.compute_user_metrics().await;
    assert_eq!(metrics.total_transactions, 2);
    assert_eq!(metrics.numbers_sold, 1);
    assert!(reason_indicates_purchase("Number"));
}

#[tokio::test]
async fn test_unknown_transaction_type_is_never_a_purchase() {
    let (memory, app) = connected_app();
    memory.seed(
        "users",
        vec![user(
            1,
            5.0,
            vec![
                tx("refund", "Number purchase", 5.0, 1),
                tx("debit", "Number purchase", 5.0, 1),
            ],
        )],
    );

    let metrics = app.metrics.compute_user_metrics().await;
    assert_eq!(metrics.total_users, 1);
    assert_eq!(metrics.total_transactions, 2);
    assert_eq!(metrics.transactions_24h, 2);
    assert_eq!(metrics.numbers_sold, 1);
    assert_eq!(metrics.numbers_sold_24h, 1);
    assert_eq!(metrics.total_balance, 5.0);
}

#[tokio::test]
async fn test_transaction_windows() {
    let (memory, app) = connected_app();
    memory.seed(
        "users",
        vec![
            user(
                1,
                0.0,
                vec![
                    tx("credit", "Recharge", 100.0, 72),
                    tx("debit", "Bought WhatsApp number", 5.0, 48),
                    tx("debit", "PURCHASE telegram", 5.0, 2),
                    tx("debit", "Service fee", 1.0, 1),
                ],
            ),
            user(2, 0.0, vec![tx("credit", "Referral bonus", 2.0, 3)]),
        ],
    );

    let metrics = app.metrics.compute_user_metrics().await;
    assert_eq!(metrics.total_transactions, 5);
    assert_eq!(metrics.transactions_24h, 3);
    assert_eq!(metrics.numbers_sold, 2);
    assert_eq!(metrics.numbers_sold_24h, 1);
}

#[tokio::test]
async fn test_balance_sum_is_rounded() {
    let (memory, app) = connected_app();
    memory.seed(
        "users",
        vec![user(1, 10.005, vec![]), user(2, 0.0, vec![]), user(3, -5.0, vec![])],
    );

    let metrics = app.metrics.compute_user_metrics().await;
    assert_eq!(metrics.total_users, 3);
    assert_eq!(metrics.total_balance, 5.0);
}

#[tokio::test]
async fn test_users_today_counts_since_midnight() {
    let (memory, app) = connected_app();
    let now = Utc::now();
    memory.seed(
        "users",
        vec![
            doc! { "user_id": 1_i64, "created_at": to_bson_datetime(now) },
            doc! { "user_id": 2_i64, "created_at": to_bson_datetime(now - Duration::days(3)) },
        ],
    );

    let metrics = app.metrics.compute_user_metrics_at(now).await;
    assert_eq!(metrics.total_users, 2);
    assert_eq!(metrics.users_today, 1);
}

#[tokio::test]
async fn test_unconnected_store_reports_zeros() {
    let (_, app) = unconnected_app();
    assert_eq!(app.metrics.compute_user_metrics().await, UserMetrics::default());

    let snapshot = app.metrics.compute_dashboard_snapshot().await;
    assert_eq!(snapshot.metrics, UserMetrics::default());
    assert!(snapshot.top_services.is_empty());
    assert_eq!(snapshot.total_servers, 0);
    assert_eq!(snapshot.total_services, 0);
}

#[tokio::test]
async fn test_read_failure_reports_zeros() {
    let (memory, app) = connected_app();
    memory.seed("users", vec![user(1, 50.0, vec![tx("debit", "Number", 5.0, 1)])]);
    memory.set_fail_reads(true);

    assert_eq!(app.metrics.compute_user_metrics().await, UserMetrics::default());
}

#[tokio::test]
async fn test_dashboard_snapshot_top_services() {
    let (memory, app) = connected_app();
    memory.seed(
        "services",
        vec![
            doc! { "name": "A", "price": "₹1", "users": 3_i64 },
            doc! { "name": "B", "price": "₹1", "users": 9_i64 },
            doc! { "name": "C", "price": "₹1", "users": 1_i64 },
            doc! { "name": "D", "price": "₹1", "users": 5_i64 },
        ],
    );
    memory.seed("servers", vec![doc! { "name": "S1" }]);

    let snapshot = app.metrics.compute_dashboard_snapshot().await;
    let names: Vec<&str> = snapshot.top_services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["B", "D", "A"]);
    assert_eq!(snapshot.total_servers, 1);
    assert_eq!(snapshot.total_services, 4);
}
