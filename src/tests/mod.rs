//! Consolidated test modules.
//!
//! End-to-end scenarios that wire the codec, caches, engine and route sync
//! together the way an embedding service would.
