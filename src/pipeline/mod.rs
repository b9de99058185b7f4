//! Pipeline stages for a single conversion.
//!
//! Each submodule implements one step, so each is testable on its own and
//! the orchestration in [`crate::convert`] reads as a list of stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ converter.transform ──▶ output
//! (buffer)    (selected strategy)    (count + flush)
//!                 │
//!              staging (per-call temp files, atomic file output)
//! ```
//!
//! 1. [`input`]   — drain the caller's stream once into a replayable buffer
//! 2. [`output`]  — count bytes on their way to the caller's target
//! 3. [`staging`] — uniquely named temporary files removed on drop

pub mod input;
pub mod output;
pub mod staging;
