//! Domain model for captured notes.
//!
//! # Responsibility
//! - Define the note record shared by every context over the wire.
//! - Keep the `hasSummary` flag derivable from `summary`.
//!
//! # Invariants
//! - Every note is identified by a stable, never reused `NoteId`.
//! - Captured text and provenance are immutable after creation.

pub mod note;
