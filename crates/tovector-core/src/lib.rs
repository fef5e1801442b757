//! Core types and utilities for tovector.
//!
//! This crate provides the foundational types used throughout the service:
//!
//! - **Identifiers**: `UserId`, `ImageId`, `CreditLogId`
//! - **Credits**: `UserCredits`, `CreditLog`, `ActionType`, `Charge`
//! - **Images**: `ImageRecord`, `UploadPolicy`, `ImageKind`
//! - **Pricing**: `PricingConfig`
//!
//! # Credit Unit
//!
//! **1 credit = $1.00**
//!
//! - A preview costs 1 credit (or one free preview)
//! - A full vectorization costs 5 credits
//! - Stored as `i64` whole credits

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod credits;
pub mod error;
pub mod ids;
pub mod image;
pub mod pricing;

pub use credits::{plan_charge, ActionType, Charge, CreditLog, Deduction, UserCredits};
pub use error::{Result, TovectorError};
pub use ids::{CreditLogId, IdError, ImageId, UserId};
pub use image::{
    fit_to_pixel_budget, storage_path, ImageKind, ImageRecord, UploadPolicy, MAX_PIXELS,
    MAX_UPLOAD_BYTES, SVG_MIME_TYPE,
};
pub use pricing::PricingConfig;
