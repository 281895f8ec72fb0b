//! Domain model for the normalized board cache.
//!
//! # Responsibility
//! - Define the generic record shape every store holds.
//! - Project reflections, groups and meetings out of records.
//!
//! # Invariants
//! - Every cached entity is identified by a stable `RecordId`.
//! - Relations are stored as id references, never embedded records.

pub mod record;
pub mod retro;
