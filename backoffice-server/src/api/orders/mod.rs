//! Order API routes
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /api/orders | GET | List all orders |
//! | /api/orders/{id} | GET | Fetch one order |
//! | /api/orders/{id}/shipping-guide | POST | Create the shipping guide |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", order_routes())
}

fn order_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/shipping-guide", post(handler::create_shipping_guide))
}
