// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Block headers as observed from the chain

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! hash_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into().to_ascii_lowercase())
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
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }
    };
}

hash_newtype! {
    /// Hex block hash (lowercased on construction)
    BlockHash
}

hash_newtype! {
    /// Hex transaction hash (lowercased on construction)
    TxHash
}

/// An immutable block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub number: u64,
    #[serde(default)]
    pub timestamp: u64,
}

impl Head {
    pub fn new(
        hash: impl Into<BlockHash>,
        parent_hash: impl Into<BlockHash>,
        number: u64,
        timestamp: u64,
    ) -> Self {
        Self { hash: hash.into(), parent_hash: parent_hash.into(), number, timestamp }
    }

    /// True when `self` directly extends `parent` with a consistent number
    pub fn is_child_of(&self, parent: &Head) -> bool {
        self.parent_hash == parent.hash && self.number == parent.number + 1
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.number, crate::id::short(self.hash.as_str(), 10))
    }
}
