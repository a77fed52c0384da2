//! Storage contracts for users, roles, explorations and dashboards.
//! - Each contract is an `async_trait` with an in-memory and a SeaORM backend.
//! - Every operation takes a [`RequestContext`] and returns [`StoreResult`].
//! - [`runtime::build_stores`] picks the backend from configuration.

pub mod errors;
pub mod context;
pub mod ids;
pub mod clock;
pub mod storage;
pub mod auth;
pub mod exploration;
pub mod dashboard;
pub mod runtime;
#[cfg(test)]
pub mod test_support;

pub use context::{CancelCause, CancelHandle, RequestContext};
pub use errors::{ErrorKind, StoreError, StoreResult};
pub use ids::{DashboardId, ExplorationId, RoleId, UserId};
pub use runtime::{build_stores, Stores};
