//! dispensa: a compilation-artifact caching server.
//!
//! The server speaks a small HTTP/JSON rendition of the build-cache
//! protocol used by compilation caching clients: `get-value` resolves
//! an opaque cache key and returns the whole artifact inline, `save`
//! stores content-addressed artifact bytes, and `put-value`/`load` are
//! the thin compatibility stubs for out-of-band association and
//! by-digest reads.
//!
//! Layering, bottom up: [`domain`] (identifier and artifact types),
//! [`store`] (sharded LRU content store, lookup index, single-flight
//! write coordination), [`service`] (the protocol-facing cache
//! service), [`dispatch`] (admission control and deadlines), and
//! [`infra`] (HTTP surface, telemetry). [`config`] resolves layered
//! deployment settings.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod infra;
pub mod service;
pub mod store;
pub mod util;
