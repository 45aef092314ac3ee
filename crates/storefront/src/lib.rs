//! Pashmiya storefront engine.
//!
//! Client-side state for the shop: a persisted cart, checkout orchestration
//! against the payment gateway, a server-backed wishlist, and a notification
//! inbox fed by REST snapshots and a live WebSocket push channel.
//!
//! Every network call goes through [`api::ApiClient`], which shares one
//! [`session::SessionContext`] with the rest of the engine. A 401 from any
//! call ends the session there; components watch the session instead of
//! listening for a global logout event.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod currency;
pub mod error;
pub mod notifications;
pub mod reconcile;
pub mod session;
pub mod storage;
pub mod wishlist;

pub use error::{AppError, Result};
