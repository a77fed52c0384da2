use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};
use crate::ids::{ExplorationId, UserId};

/// A saved exploration session. `data` is whatever the front end stored and
/// is never looked at here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exploration {
    #[serde(rename = "ID", default)]
    pub id: ExplorationId,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "UserID")]
    pub user_id: UserId,
    #[serde(rename = "Data", default)]
    pub data: String,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "UpdatedAt", default)]
    pub updated_at: DateTime<Utc>,
}

impl Exploration {
    pub fn new(user_id: UserId, name: impl Into<String>, data: impl Into<String>) -> Self {
        Self { user_id, name: name.into(), data: data.into(), ..Self::default() }
    }

    pub(crate) fn validate_owner(&self) -> StoreResult<()> {
        if !self.user_id.is_assigned() {
            return Err(StoreError::validation(format!("exploration owner {} is not a valid user ID", self.user_id)));
        }
        Ok(())
    }
}
