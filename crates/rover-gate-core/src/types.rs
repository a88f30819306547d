//! Strong type definitions for the rover gate.
//!
//! Foreign chains disagree on hash width and encoding, so identifiers are
//! opaque strings wrapped in newtypes to keep them from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Name of a rover, which is also the name of the chain it watches
    /// (`btc`, `eth`, `lsk`, ...).
    RoverId
);

string_id!(
    /// Hash of a block, either a rovered block or a block of the local chain.
    BlockHash
);

string_id!(
    /// Reference to a transaction tracked by the settlement ledger.
    TxRef
);

/// Key holding the height of the latest local block.
///
/// The node always writes it under `bc`, whatever namespace the miner mutex
/// lives in.
pub const LATEST_BLOCK_KEY: &str = "bc.block.latest";

/// The logical chain namespace the miner mutex key is scoped under.
///
/// Always lower-case. The default namespace is `bc`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainNamespace(String);

impl ChainNamespace {
    /// Create a namespace, lower-casing the input.
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// Borrow the namespace.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key holding the miner's exclusive-hold flag.
    pub fn miner_mutex_key(&self) -> String {
        format!("{}.miner.mutex", self.0)
    }
}

impl Default for ChainNamespace {
    fn default() -> Self {
        Self("bc".to_string())
    }
}

impl fmt::Debug for ChainNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainNamespace({})", self.0)
    }
}

impl fmt::Display for ChainNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
