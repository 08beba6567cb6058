//! # agentwatch-sync
//!
//! The progress synchronization engine. Keeps a local [`store::SessionStore`]
//! converged with a remote analysis session through two feeds:
//!
//! - **Snapshot fetcher** ([`snapshot`]): pull-based recovery over HTTP,
//!   used at bootstrap and for manual refresh
//! - **Push channel** ([`channel`]): a websocket delivering incremental
//!   events, with cause-aware reconnection and liveness probing
//!
//! Both feeds funnel through the single-writer [`reconciler`] task, so
//! consumers observe one consistent, monotonic view regardless of event
//! ordering, duplication, or connection churn.
//!
//! [`monitor::SessionMonitor`] is the public entry point: it owns the
//! tasks, the cancellation token, and the teardown path.

#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod keepalive;
pub mod monitor;
pub mod reconciler;
pub mod snapshot;
pub mod store;

pub use config::MonitorConfig;
pub use monitor::SessionMonitor;
pub use store::SessionStore;
