//! Local persistence of the document.
//!
//! The [`RecordStore`] holds the load/save contract on top of a
//! [`KeyValueStore`] backend: a directory of JSON files for normal use, or an
//! in-memory map for tests.

mod kv;
mod record_store;

pub use kv::{FileKvStore, KeyValueStore, KvError, MemoryKvStore};
pub use record_store::{RecordStore, SaveCallback, StoreError, STORAGE_KEY};
