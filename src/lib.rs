//! startline — order lifecycle and payment reconciliation for
//! limited-capacity event registrations
//!
//! Core flow: deterministic pricing (batch tiers + coupons + platform fee),
//! race-safe order creation against bounded inventory, checkout preference
//! creation at the payment processor, and a multi-trigger reconciliation
//! engine that aligns internal order state with the processor's
//! authoritative payment record.

pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod gateway;
pub mod orders;
pub mod pricing;
pub mod reconcile;
pub mod state;
