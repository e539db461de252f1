//! View Layer Tests
//!
//! Live result sets observed over a real stack: batches arriving per
//! save, the synchronizer mirroring them positionally, layout caches
//! across reopen, and a randomized end-to-end property.

#[path = "../common/mod.rs"]
mod common;

mod layout_cache;
mod observation;
