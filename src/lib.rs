// src/lib.rs
// Library interface for ceye
pub mod cache;
pub mod certstream;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod event_loop;
pub mod matcher;
pub mod notifier;
pub mod stats;
pub mod types;
