//! Type-safe integer handles for hypergraph entities.
//!
//! Every vertex and hyperedge in a hypergraph is addressed by a strongly-typed
//! handle to prevent accidental mixing of identifiers at compile time. Handles
//! are issued by the arena counters owned by each hypergraph and are never
//! reused within one graph, so they stay stable across rewrites and rollbacks.
//!
//! Cluster identifiers reuse the handle space of vertices: a cluster is named
//! after its smallest member vertex.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create an identifier from its raw arena index.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the raw arena index.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Handle of a vertex (a fundamental event) in a hypergraph.
    VertexId
}

define_id! {
    /// Handle of a hyperedge (a k-ary relation) in a hypergraph.
    EdgeId
}

define_id! {
    /// Identifier of a ξ-cluster: the smallest vertex id among its members.
    ClusterId
}

impl From<VertexId> for ClusterId {
    fn from(founder: VertexId) -> Self {
        Self(founder.0)
    }
}

/// Error returned when a `"a,b"` pair key cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pair key: {0:?}")]
pub struct PairKeyError(pub String);

/// Generates an unordered pair key over an id type.
///
/// The pair is normalised so that `low <= high`, and serialises as the
/// string `"low,high"` so it can be used as a JSON object key.
macro_rules! define_pair {
    (
        $(#[$meta:meta])*
        $name:ident over $id:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            low: $id,
            high: $id,
        }

        impl $name {
            /// Build a normalised pair from two ids in any order.
            pub fn new(a: $id, b: $id) -> Self {
                if a <= b {
                    Self { low: a, high: b }
                } else {
                    Self { low: b, high: a }
                }
            }

            /// The smaller id of the pair.
            pub const fn low(self) -> $id {
                self.low
            }

            /// The larger id of the pair.
            pub const fn high(self) -> $id {
                self.high
            }

            /// Whether `id` is one of the two ends.
            pub fn contains(self, id: $id) -> bool {
                self.low == id || self.high == id
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{},{}", self.low, self.high)
            }
        }

        impl FromStr for $name {
            type Err = PairKeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (a, b) = s
                    .split_once(',')
                    .ok_or_else(|| PairKeyError(s.to_owned()))?;
                let a: u64 = a
                    .trim()
                    .parse()
                    .map_err(|e| PairKeyError(format!("{s} ({e})")))?;
                let b: u64 = b
                    .trim()
                    .parse()
                    .map_err(|e| PairKeyError(format!("{s} ({e})")))?;
                Ok(Self::new($id(a), $id(b)))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

define_pair! {
    /// Unordered pair of clusters, the key of the distance memories.
    ClusterPair over ClusterId
}

define_pair! {
    /// Unordered pair of vertices, the key of the ξ–ξ link memory.
    VertexPair over VertexId
}
