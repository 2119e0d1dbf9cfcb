// ABOUTME: Library root for kreezalid-migrator
// ABOUTME: Moves users, categories and listings from MySQL to Kreezalid exactly once

pub mod commands;
pub mod config;
pub mod entity;
pub mod journal;
pub mod models;
pub mod pipeline;
pub mod preflight;
pub mod publisher;
pub mod source;
pub mod transform;
pub mod utils;

pub use entity::EntityKind;
pub use pipeline::{Migrator, RunReport};
