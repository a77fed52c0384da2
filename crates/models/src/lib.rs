//! SeaORM entities backing the relational store implementation.
//!
//! Permission lists and dashboard cells are kept as JSON text columns; the
//! user/role relation lives in its own association table so neither side
//! embeds the other.

pub mod errors;
pub mod db;
pub mod id_sequence;
pub mod permission;
pub mod user;
pub mod role;
pub mod user_role;
pub mod exploration;
pub mod dashboard;
