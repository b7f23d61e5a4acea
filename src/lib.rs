//! `arenad` - Structured competitive match orchestration
//!
//! This library provides the building blocks for hosting structured
//! competitive matches inside a long-lived game server: an arena lifecycle
//! state machine, team and membership management, pluggable victory rules,
//! a synchronous ordered event bus, and a single-elimination tournament
//! orchestrator layered on top.

pub mod arena;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod manager;
pub mod observability;
pub mod registry;
pub mod team;
pub mod tournament;
pub mod victory;
