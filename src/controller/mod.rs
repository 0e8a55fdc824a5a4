//! Reconciliation of the OAuth server
//!
//! [`reconcile`] drives one pass of the sync pipeline for the `cluster`
//! operator config; [`Context`] carries the collaborators and the state that
//! survives between passes.

mod context;
mod route;
mod sync;

pub use context::{Context, ContextBuilder, SyncState};
pub use route::{canonical_host, default_route, handle_route, RouteState};
pub use sync::{error_policy, reconcile, sync, OPERATOR_SYNC, ROUTE_STATUS};
