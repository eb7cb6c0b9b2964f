//! The storage engine: content-addressed artifact store, lookup index,
//! and the single-flight coordination used by concurrent writes.

mod config;
mod content;
mod flight;
mod index;
mod lock;

pub use config::StoreConfig;
pub use content::{ContentStats, ContentStore, PutOutcome, StoreError};
pub use flight::{FlightOutcome, WriteFlight, WriteFlights};
pub use index::LookupIndex;
