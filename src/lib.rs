//! Diagnosis Bot Library
//!
//! A Telegram group bot that hands out joke diagnoses to chat members.
//!
//! This crate provides the core functionality for:
//! - Caching per-chat member snapshots with a freshness window
//! - Refreshing them through ranked retrieval strategies
//! - Composing random diagnoses from severity-keyed word tables
//! - Handling user commands via chat messages

pub mod commands;
pub mod config;
pub mod diagnosis;
pub mod directory;
pub mod dispatch;
pub mod platform;
pub mod telegram;
