//! Pashmiya Core - Shared types library.
//!
//! This crate provides common types used across all Pashmiya client components:
//! - `storefront` - Cart, checkout, wishlist and notification engine
//! - `cli` - Command-line front end for the engine
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, the currency catalog, emails, and status tags

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
