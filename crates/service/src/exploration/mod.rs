//! Per-user saved exploration sessions.

pub mod domain;
pub mod repository;
pub mod repo;

pub use domain::Exploration;
pub use repository::ExplorationStore;
