//! API route modules
//!
//! # Structure
//!
//! - [`health`] - liveness probe
//! - [`webhooks`] - payment gateway confirmation endpoints
//! - [`orders`] - order lookup and shipping guide creation
//! - [`products`] - inventory movement history and ledger audit

pub mod health;
pub mod orders;
pub mod products;
pub mod webhooks;
