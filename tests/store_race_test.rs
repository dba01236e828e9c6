//! Conditional-update invariants under concurrent access.
//!
//! These run against a live PostgreSQL instance (`DATABASE_URL`); each test
//! gets its own throwaway database with the migrations applied.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use startline::config::{Config, PlatformFee};
use startline::crypto::MasterKey;
use startline::db::{orders as order_store, stock};
use startline::gateway::ProcessorClient;
use startline::orders::{RegistrationEntry, RegistrationRequest, create_orders};
use startline::state::AppState;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn test_state(pool: PgPool) -> AppState {
    let config = Config {
        database_url: String::new(),
        http_port: 0,
        environment: "development".into(),
        master_key_hex: "ab".repeat(32),
        // Nothing in these tests reaches the processor.
        processor_base_url: "http://127.0.0.1:9".into(),
        processor_timeout_ms: 200,
        fallback_seller_token: None,
        fallback_app_token: None,
        platform_fee: PlatformFee::Percentage(dec("0.10")),
        public_base_url: "http://localhost:8080".into(),
        webhook_secret: "whsec_test".into(),
        sweep_interval_secs: 300,
        sweep_batch_size: 100,
        sweep_window_hours: 48,
    };
    AppState {
        pool,
        vault: MasterKey::from_hex(&config.master_key_hex).unwrap(),
        gateway: Arc::new(
            ProcessorClient::new(&config.processor_base_url, config.processor_timeout_ms).unwrap(),
        ),
        config: Arc::new(config),
    }
}

async fn seed_event(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO events (id, organizer_id, name, published, registration_start,
                             registration_end, requires_apparel_size, created_at)
         VALUES ($1, $2, 'Test Run', TRUE, $3, $4, FALSE, $3)",
    )
    .bind(id)
    .bind(Uuid::new_v4())
    .bind(Utc::now() - Duration::days(1))
    .bind(Utc::now() + Duration::days(1))
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn seed_modality(pool: &PgPool, event_id: Uuid, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO modalities (id, event_id, name, base_price, max_slots, active)
         VALUES ($1, $2, $3, $4, NULL, TRUE)",
    )
    .bind(id)
    .bind(event_id)
    .bind(name)
    .bind(dec("100.00"))
    .execute(pool)
    .await
    .unwrap();
    id
}

fn entry(modality_id: Uuid) -> RegistrationEntry {
    RegistrationEntry {
        participant_id: Uuid::new_v4(),
        modality_id,
        apparel_size: None,
    }
}

async fn try_reserve(pool: &PgPool, event_id: Uuid) -> bool {
    let mut tx = pool.begin().await.unwrap();
    let reserved = stock::reserve(&mut tx, event_id, "M").await.unwrap();
    tx.commit().await.unwrap();
    reserved
}

// stock=50, reserved=49: the last unit goes to exactly one of two
// concurrent reservation attempts and the available count lands on zero.
#[sqlx::test]
async fn last_size_reservation_wins_exactly_once(pool: PgPool) {
    let event_id = seed_event(&pool).await;
    sqlx::query(
        "INSERT INTO size_stock (event_id, size, stock, reserved, sold)
         VALUES ($1, 'M', 50, 49, 0)",
    )
    .bind(event_id)
    .execute(&pool)
    .await
    .unwrap();

    let (a, b) = tokio::join!(try_reserve(&pool, event_id), try_reserve(&pool, event_id));
    assert!(a ^ b, "exactly one reservation must take the last unit");

    let row = stock::find(&pool, event_id, "M").await.unwrap().unwrap();
    assert_eq!(row.reserved, 50);
    assert_eq!(row.stock - row.reserved - row.sold, 0);
}

// Two checkouts listing the same modalities in opposite orders must both
// complete cleanly (no deadlock abort) with unique sequential order numbers.
#[sqlx::test]
async fn concurrent_checkouts_never_share_an_order_number(pool: PgPool) {
    let event_id = seed_event(&pool).await;
    let m1 = seed_modality(&pool, event_id, "5K").await;
    let m2 = seed_modality(&pool, event_id, "10K").await;
    let state = test_state(pool.clone());

    let req_a = RegistrationRequest {
        event_id,
        participants: vec![entry(m1), entry(m2)],
        coupon_code: None,
    };
    let req_b = RegistrationRequest {
        event_id,
        participants: vec![entry(m2), entry(m1)],
        coupon_code: None,
    };

    let (a, b) = tokio::join!(
        create_orders(&state, Uuid::new_v4(), &req_a),
        create_orders(&state, Uuid::new_v4(), &req_b),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let mut numbers: Vec<i64> = a.iter().chain(b.iter()).map(|o| o.order_number).collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}

// Webhook and pull sync racing to the same approved payment record exactly
// one CONFIRMED transition.
#[sqlx::test]
async fn confirm_fires_exactly_once_under_race(pool: PgPool) {
    let event_id = seed_event(&pool).await;
    let modality_id = seed_modality(&pool, event_id, "5K").await;
    let state = test_state(pool.clone());

    let req = RegistrationRequest {
        event_id,
        participants: vec![entry(modality_id)],
        coupon_code: None,
    };
    let created = create_orders(&state, Uuid::new_v4(), &req).await.unwrap();
    let order_id = created[0].id;

    let now = Utc::now();
    let (a, b) = tokio::join!(
        order_store::confirm(&pool, order_id, "555", Some("pix"), None, now),
        order_store::confirm(&pool, order_id, "555", Some("pix"), None, now),
    );
    assert!(
        a.unwrap() ^ b.unwrap(),
        "exactly one transition must fire"
    );

    let row = order_store::find_by_id(&pool, order_id).await.unwrap().unwrap();
    assert_eq!(row.status, "CONFIRMED");
    assert_eq!(row.payment_status, "APPROVED");
    assert!(row.confirmed_at.is_some());
}

// The group primary (the order whose id the checkout preference carries as
// external_reference) is the lowest order number of the checkout.
#[sqlx::test]
async fn group_primary_is_lowest_order_number(pool: PgPool) {
    let event_id = seed_event(&pool).await;
    let m1 = seed_modality(&pool, event_id, "5K").await;
    let m2 = seed_modality(&pool, event_id, "10K").await;
    let state = test_state(pool.clone());

    let req = RegistrationRequest {
        event_id,
        participants: vec![entry(m2), entry(m1)],
        coupon_code: None,
    };
    let created = create_orders(&state, Uuid::new_v4(), &req).await.unwrap();
    let checkout_ref = created[0].checkout_ref.clone().unwrap();

    let primary = order_store::find_group_primary(&pool, &checkout_ref)
        .await
        .unwrap()
        .unwrap();
    // create_orders returns rows ordered by order_number.
    assert_eq!(primary.id, created[0].id);
    assert_eq!(
        primary.order_number,
        created.iter().map(|o| o.order_number).min().unwrap()
    );
}
