//! Stripe integration for credit purchases.
//!
//! Stripe handles:
//! - Credit purchases via Checkout
//! - Session retrieval for the confirmation page
//! - Webhook signature verification

pub mod client;
pub mod types;

pub use client::{
    is_checkout_session_id, verify_webhook_signature, StripeClient, StripeError,
    WEBHOOK_TOLERANCE_SECONDS,
};
pub use types::*;
