//! # agentwatch-core
//!
//! Foundation types for the agentwatch progress-synchronization engine.
//!
//! This crate provides the shared vocabulary the sync engine is built on:
//!
//! - **Session model**: [`session::Session`], [`session::AgentState`],
//!   [`session::SessionSnapshot`] mirroring the remote wire format
//! - **Wire events**: [`events::PushEvent`] — the tagged envelope delivered
//!   over the push channel
//! - **Activity log**: [`activity::ActivityLog`] bounded diagnostic ring
//! - **Connectivity**: [`connection::ConnectionState`] and the cause-aware
//!   [`connection::ReconnectPolicy`]
//! - **Retry**: [`retry::RetryConfig`] and backoff calculation
//! - **Errors**: [`errors::FetchError`], [`errors::ChannelError`] via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. No I/O; depended on by `agentwatch-sync` and the CLI.

#![deny(unsafe_code)]

pub mod activity;
pub mod connection;
pub mod errors;
pub mod events;
pub mod logging;
pub mod retry;
pub mod session;
pub mod time;
