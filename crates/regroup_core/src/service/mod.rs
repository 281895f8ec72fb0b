//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate record store calls into board-level APIs.
//! - Keep the CLI and the board server decoupled from record layout details.

pub mod board_service;
