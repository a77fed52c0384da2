//! Ambient helpers shared by every crate in the workspace: logging setup and
//! environment/runtime preparation.

pub mod env;
pub mod utils;
