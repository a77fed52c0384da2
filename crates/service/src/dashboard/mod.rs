//! Dashboards made of positioned cells.

pub mod domain;
pub mod repository;
pub mod repo;

pub use domain::{Cell, Dashboard, Query};
pub use repository::DashboardStore;
