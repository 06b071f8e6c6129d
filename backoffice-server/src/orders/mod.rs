//! Order state machine and payment-event pipeline
//!
//! Owns every status transition. Webhook handlers and admin endpoints
//! never mutate an order directly; they hand a normalized
//! [`shared::gateway::PaymentEvent`] to [`OrderPipeline`], which applies
//! the transition and all of its side effects inside one storage
//! transaction.

pub mod financials;
mod pipeline;

#[cfg(test)]
mod tests;

pub use pipeline::{
    FinancialCancelPolicy, OrderPipeline, PipelineError, PipelineOutcome, PipelineResult,
};
