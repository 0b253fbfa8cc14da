#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::AnchorError;

/// Per-tag placement state machine.
pub mod manager;

/// Persisted anchor records and key-value stores.
pub mod persistence;

/// Host anchor store capability and its events.
pub mod store;

/// Exclusion zones around placed anchors.
pub mod zone;

pub use manager::{
    AnchorChange, AnchorManager, AnchorSettings, PlacedAnchor, PlacementOutcome, TrackingState,
};
pub use persistence::{AnchorCollection, AnchorRecord, JsonFileStore, KeyValueStore, MemoryStore};
pub use store::{AnchorEvent, AnchorId, AnchorStore, RequestId, SimulatedAnchorStore};
pub use zone::{KeepOutZone, KeepOutZones};
