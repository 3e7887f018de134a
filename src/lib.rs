//! Petek: concurrent open-addressing hash map with per-slot atomic states.
//!
//! Every bucket carries a four-state lifecycle tag (empty, writing,
//! occupied, deleted) in an atomic cell. Lookups, fresh inserts, overwrites
//! and removals coordinate purely through that cell and an atomic value
//! pointer, so the common paths never take a map-wide lock.
//!
//! # Key Features
//!
//! - **Lock-free fast paths**: `get`, `insert` and `remove` use per-slot
//!   CAS and pointer swaps; the only blocking happens while a resize is in
//!   flight.
//! - **Latched resizing**: growing the table is serialized by a
//!   shared/exclusive latch. Regular operations take the latch in shared
//!   mode (one atomic increment); the resizer takes it exclusively and
//!   rebuilds a doubled table single-threaded.
//! - **Deferred reclamation**: values displaced under the shared latch are
//!   parked on a retired list and freed at the next exclusive section, so
//!   a reader can never observe a freed value.
//! - **Snapshot iteration**: an iterator holds the latch exclusively and
//!   walks the table once, yielding a consistent snapshot.
//!
//! # Example
//!
//! ```rust,ignore
//! use petek::HashMap;
//!
//! let map = HashMap::new();
//! map.insert(1, "one").unwrap();
//! assert_eq!(map.get(&1), Some("one"));
//! assert_eq!(map.remove(&1), Some("one"));
//! ```

#![warn(missing_docs)]
#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod error;
mod hashmap;
mod latch;
mod retired;
mod slot;
mod table;

pub use error::MapError;
pub use hashmap::{HashMap, Iter};
