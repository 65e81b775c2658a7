//! Type-safe ID wrappers for swarms, agents and listings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a string-backed ID newtype with `new`, `as_str`, `Display` and
/// `From<String>`/`From<&str>`
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Swarm ID, a UUID v4 (e.g., "8f14e45f-ceea-467f-a9f0-3b2c1e5d6a7b")
    SwarmId
);

string_id!(
    /// Agent ID, `<swarm-short>-agent-<n>` (e.g., "8f14e45f-agent-3")
    AgentId
);

string_id!(
    /// Marketplace listing ID, opaque to the swarm
    ListingId
);

impl SwarmId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// First 8 characters, the prefix of every agent ID in the swarm
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl AgentId {
    /// The n-th agent of `swarm`
    pub fn for_swarm(swarm: &SwarmId, n: usize) -> Self {
        Self(format!("{}-agent-{}", swarm.short(), n))
    }
}
