//! Typed identifiers
//!
//! Every entity id is a distinct newtype over a string so a rule id can never
//! be passed where a command id belongs. Generated ids are uuid v4; device ids
//! come from the firmware and stay opaque.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
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

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Opaque device identifier assigned by the firmware
    DeviceId
);
string_id!(
    /// Automation rule identifier
    RuleId
);
string_id!(
    /// Program identifier
    ProgramId
);
string_id!(
    /// Command identifier (uuid v4 when generated by the dispatcher)
    CommandId
);

impl RuleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl ProgramId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl CommandId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
