//! Provider-local object storage for Locus.
//!
//! A provider keeps every object it holds as one file named after the object
//! under `<storage root>/objects/`. There is no index and no metadata: the
//! directory listing is the source of truth, which is what lets a provider
//! answer location queries with a plain existence check.
//!
//! # Design Rules
//!
//! 1. Names are validated [`ObjectName`]s, so they can never escape the
//!    objects directory.
//! 2. Reads and writes are streamed; the store never buffers a whole object.
//! 3. Writes replace the existing object. A failed write is not rolled back.
//! 4. All I/O errors are propagated, never silently ignored.
//!
//! [`ObjectName`]: locus_types::ObjectName

pub mod error;
pub mod fs;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use traits::{ObjectReader, ObjectWriter, ProviderStore};
