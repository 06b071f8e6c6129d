//! Payment webhook routes
//!
//! | Path | Method | Body | Description |
//! |------|--------|------|-------------|
//! | /api/webhooks/wompi | POST | JSON envelope | Card gateway events |
//! | /api/webhooks/payu | POST | form-urlencoded | Alternate gateway confirmations |
//!
//! Both endpoints verify the provider signature before touching any
//! order. Events for unknown references or unsupported types are
//! acknowledged with 200 so the gateway stops retrying them.

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/webhooks/wompi", post(handler::wompi))
        .route("/api/webhooks/payu", post(handler::payu))
}
