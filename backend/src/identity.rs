//! Opaque participant identities.
//!
//! The core only compares identities for equality; how they are authenticated is up to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! identity {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
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

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

identity!(
    /// A committee member able to approve access sessions and vote on records.
    ValidatorId
);

identity!(
    /// A party asking for decryption rights.
    RequesterId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_string() {
        let id = ValidatorId::new("validator-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"validator-7\"");
        let back: ValidatorId = serde_json::from_str("\"validator-7\"").unwrap();
        assert_eq!(back, id);
    }
}
