//! Storage primitives shared by the backends.
//!
//! `StateCell` holds an in-process backend's whole state behind one lock,
//! applies writes copy-then-swap, and can mirror the state into a JSON
//! snapshot file. `transaction` stages SeaORM writes so that only the work
//! before COMMIT is ever cancelled.

pub mod state_cell;
pub(crate) mod transaction;

pub use state_cell::StateCell;
