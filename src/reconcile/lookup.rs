//! Payment lookup cascade
//!
//! Ordered strategies, first hit wins: fetch directly when the order already
//! carries a real processor payment id, otherwise search the processor by
//! `external_reference` equal to the order id. Search results are filtered
//! for an exact reference match and an approved payment is preferred when
//! several exist (a buyer may retry a rejected card against the same
//! preference).

use async_trait::async_trait;

use crate::db::orders::OrderRow;
use crate::gateway::{GatewayError, Payment, ProcessorClient};

/// Read-side of the processor API, mockable in tests.
#[async_trait]
pub trait PaymentSource: Send + Sync {
    async fn payment_by_id(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<Option<Payment>, GatewayError>;

    async fn payments_by_reference(
        &self,
        access_token: &str,
        reference: &str,
    ) -> Result<Vec<Payment>, GatewayError>;
}

#[async_trait]
impl PaymentSource for ProcessorClient {
    async fn payment_by_id(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<Option<Payment>, GatewayError> {
        self.get_payment(access_token, payment_id).await
    }

    async fn payments_by_reference(
        &self,
        access_token: &str,
        reference: &str,
    ) -> Result<Vec<Payment>, GatewayError> {
        self.search_payments(access_token, reference).await
    }
}

/// Which strategy produced the payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    /// Fetched by a payment id already on the order
    DirectId,
    /// Discovered by `external_reference` search; the id should be persisted
    ExternalReference,
}

/// A payment located for an order
#[derive(Debug, Clone)]
pub struct FoundPayment {
    pub payment: Payment,
    pub strategy: LookupStrategy,
}

/// Real processor ids are all digits. Preference pseudo-ids
/// (`<preferenceId>_<orderId>`) are not and must never be fetched directly.
fn is_processor_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Run the lookup cascade for one order.
pub async fn find_payment(
    source: &dyn PaymentSource,
    access_token: &str,
    order: &OrderRow,
) -> Result<Option<FoundPayment>, GatewayError> {
    if let Some(payment_id) = order.payment_id.as_deref().filter(|p| is_processor_id(p))
        && let Some(payment) = source.payment_by_id(access_token, payment_id).await?
    {
        return Ok(Some(FoundPayment {
            payment,
            strategy: LookupStrategy::DirectId,
        }));
    }

    let reference = order.id.to_string();
    let mut matches: Vec<Payment> = source
        .payments_by_reference(access_token, &reference)
        .await?
        .into_iter()
        .filter(|p| p.external_reference.as_deref() == Some(reference.as_str()))
        .collect();

    if matches.is_empty() {
        return Ok(None);
    }
    let pick = matches.iter().position(Payment::is_approved).unwrap_or(0);
    Ok(Some(FoundPayment {
        payment: matches.swap_remove(pick),
        strategy: LookupStrategy::ExternalReference,
    }))
}
