//! GoFlow - durable step workflows for the GoFlow service
//!
//! Workflows react to identity-provider and application events, record
//! every completed step, and survive restarts between steps.

pub mod functions;
mod runtime;

pub use functions::build_registry;
pub use runtime::{GoFlow, GoFlowBuilder};
