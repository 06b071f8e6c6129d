//! Product API routes
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /api/products/{id} | GET | Fetch one product |
//! | /api/products/{id}/movements | GET | Movement history, oldest first |
//! | /api/products/{id}/audit | GET | Ledger consistency check |
//! | /api/products/restock | POST | Resilient restock intake batch |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/products", product_routes())
}

fn product_routes() -> Router<ServerState> {
    Router::new()
        .route("/restock", post(handler::restock))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/movements", get(handler::movements))
        .route("/{id}/audit", get(handler::audit))
}
