use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::DashboardId;

/// Reference to a time-series query. Opaque to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    pub fn new(q: impl Into<String>) -> Self { Self(q.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for Query {
    fn from(s: String) -> Self { Self(s) }
}

/// A positioned rectangle on a dashboard. Coordinates are not range-checked
/// and cells may overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(rename = "X")]
    pub x: i32,
    #[serde(rename = "Y")]
    pub y: i32,
    #[serde(rename = "W")]
    pub w: i32,
    #[serde(rename = "H")]
    pub h: i32,
    #[serde(rename = "Queries", default)]
    pub queries: Vec<Query>,
}

impl Cell {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h, queries: Vec::new() }
    }

    pub fn with_queries<I, Q>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Query>,
    {
        self.queries = queries.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(rename = "ID", default)]
    pub id: DashboardId,
    #[serde(rename = "Cells", default)]
    pub cells: Vec<Cell>,
}

impl Dashboard {
    pub fn new(cells: impl IntoIterator<Item = Cell>) -> Self {
        Self { id: DashboardId::default(), cells: cells.into_iter().collect() }
    }
}
