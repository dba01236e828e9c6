//! Checkout group reconstruction
//!
//! Orders created together share a `checkout_ref`. Historical rows predate
//! that column, so grouping falls back to the preference pseudo payment id
//! (`<preferenceId>_<orderId>`, shared prefix) and finally to a temporal
//! heuristic: same buyer, same event, created within the same minute.

use serde::Serialize;
use std::collections::HashMap;

use crate::db::orders::OrderRow;

/// One reconstructed checkout group
#[derive(Debug, Serialize)]
pub struct OrderGroup {
    pub key: String,
    pub orders: Vec<OrderRow>,
}

/// Group orders by the checkout they were created in. Groups come out in
/// first-seen order, which for rows ordered by creation time means
/// chronological.
pub fn group_orders(orders: Vec<OrderRow>) -> Vec<OrderGroup> {
    let mut groups: Vec<OrderGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for order in orders {
        let key = group_key(&order);
        match index.get(&key) {
            Some(&i) => groups[i].orders.push(order),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(OrderGroup {
                    key,
                    orders: vec![order],
                });
            }
        }
    }
    groups
}

fn group_key(order: &OrderRow) -> String {
    if let Some(checkout_ref) = &order.checkout_ref {
        return format!("ref:{checkout_ref}");
    }
    if let Some(prefix) = preference_prefix(order.payment_id.as_deref()) {
        return format!("pref:{prefix}");
    }
    // Floor to the minute. Real processor payment ids are all digits and
    // carry no underscore, so they fall through to here too.
    format!(
        "time:{}:{}:{}",
        order.buyer_id,
        order.event_id,
        order.created_at.timestamp() / 60
    )
}

/// The shared preference prefix of a pseudo payment id, if there is one.
fn preference_prefix(payment_id: Option<&str>) -> Option<&str> {
    let (prefix, suffix) = payment_id?.rsplit_once('_')?;
    if prefix.is_empty() || suffix.is_empty() {
        return None;
    }
    Some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn order(
        buyer: Uuid,
        event: Uuid,
        checkout_ref: Option<&str>,
        payment_id: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> OrderRow {
        OrderRow {
            id: Uuid::new_v4(),
            event_id: event,
            modality_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            buyer_id: buyer,
            coupon_id: None,
            order_number: 1,
            base_price: Decimal::new(10000, 2),
            discount: Decimal::ZERO,
            subtotal: Decimal::new(10000, 2),
            platform_fee: Decimal::new(1000, 2),
            total: Decimal::new(11000, 2),
            status: "PENDING".into(),
            payment_status: "PENDING".into(),
            payment_id: payment_id.map(Into::into),
            payment_method: None,
            processor_fee: None,
            apparel_size: None,
            checkout_ref: checkout_ref.map(Into::into),
            created_at,
            confirmed_at: None,
            cancelled_at: None,
        }
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    #[test]
    fn checkout_ref_groups_together() {
        let buyer = Uuid::new_v4();
        let event = Uuid::new_v4();
        let groups = group_orders(vec![
            order(buyer, event, Some("chk_a"), None, at(0)),
            order(buyer, event, Some("chk_a"), None, at(1)),
            order(buyer, event, Some("chk_b"), None, at(2)),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].orders.len(), 2);
        assert_eq!(groups[1].orders.len(), 1);
    }

    #[test]
    fn pseudo_payment_id_prefix_groups_legacy_orders() {
        let buyer = Uuid::new_v4();
        let event = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pid_a = format!("pref123_{a}");
        let pid_b = format!("pref123_{b}");
        let groups = group_orders(vec![
            order(buyer, event, None, Some(&pid_a), at(0)),
            order(buyer, event, None, Some(&pid_b), at(90)),
            order(buyer, event, None, Some("pref999_x"), at(1)),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "pref:pref123");
        assert_eq!(groups[0].orders.len(), 2);
    }

    #[test]
    fn checkout_ref_wins_over_payment_id() {
        let buyer = Uuid::new_v4();
        let event = Uuid::new_v4();
        let groups = group_orders(vec![
            order(buyer, event, Some("chk_x"), Some("pref1_a"), at(0)),
            order(buyer, event, Some("chk_x"), Some("pref2_b"), at(0)),
        ]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "ref:chk_x");
    }

    #[test]
    fn same_minute_orders_group_temporally() {
        let buyer = Uuid::new_v4();
        let event = Uuid::new_v4();
        let groups = group_orders(vec![
            order(buyer, event, None, None, at(5)),
            order(buyer, event, None, None, at(40)),
            order(buyer, event, None, None, at(70)),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].orders.len(), 2);
    }

    #[test]
    fn different_buyers_never_group_temporally() {
        let event = Uuid::new_v4();
        let groups = group_orders(vec![
            order(Uuid::new_v4(), event, None, None, at(0)),
            order(Uuid::new_v4(), event, None, None, at(0)),
        ]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn real_payment_id_falls_back_to_temporal() {
        let buyer = Uuid::new_v4();
        let event = Uuid::new_v4();
        // All-digit processor ids carry no underscore, so two orders paid
        // separately in the same minute still group by time.
        let groups = group_orders(vec![
            order(buyer, event, None, Some("123456789"), at(0)),
            order(buyer, event, None, Some("987654321"), at(10)),
        ]);
        assert_eq!(groups.len(), 1);
    }
}
