//! Typed identifiers. Each entity gets its own newtype so a role ID can
//! never be passed where a user ID is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn get(self) -> i64 { self.0 }

            /// Backend-assigned identifiers are strictly positive; zero means
            /// the record has not been stored yet.
            pub const fn is_assigned(self) -> bool { self.0 > 0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self { Self(v) }
        }

        impl From<$name> for i64 {
            fn from(v: $name) -> Self { v.0 }
        }
    };
}

id_type!(
    /// Identifies a [`User`](crate::auth::domain::User); also the owner key of explorations.
    UserId
);
id_type!(
    /// Identifies a [`Role`](crate::auth::domain::Role).
    RoleId
);
id_type!(
    /// Identifies an [`Exploration`](crate::exploration::domain::Exploration).
    ExplorationId
);
id_type!(
    /// Identifies a [`Dashboard`](crate::dashboard::domain::Dashboard).
    DashboardId
);
