//! Repository layer over the persistent store.
//!
//! # Responsibility
//! - Own every read-modify-write sequence on the note collection.
//! - Return semantic errors (`NotFound`, `Validation`) next to storage errors.
//!
//! # Invariants
//! - Writes validate notes before persistence.
//! - One mutation is one `set` of the whole collection.

pub mod note_repo;
