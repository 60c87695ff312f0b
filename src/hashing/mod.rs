//! Hashing primitives shared by the whole compiler.
//!
//! Two pieces live here:
//!
//! 1. [`sip`] - a SipHash-2-4 implementation with a process-global random
//!    key and a streaming interface for hashing composite values (text
//!    graphemes, table keys) without materializing them as byte buffers.
//! 2. [`table`] - an insertion-ordered hash table using a chained-scatter
//!    bucket layout with Brent's variation. It backs the synthetic
//!    grapheme interner, the parse cache, and the build orchestrator's
//!    dependency tables.

pub mod sip;
pub mod table;

pub use sip::{hash_key, siphash24, Sip24Hasher, SipHash};
pub use table::Table;
