//! Application layer for nivelver.
//!
//! Builds the stores and the sync coordinator once from configuration and
//! hands them out by reference. Also hosts the login flow, whose messages
//! depend on network reachability.

pub mod config;
pub mod context;
pub mod login;
pub mod reachability;

pub use config::{default_config_path, AppConfig, CloudConfig, ReachabilityConfig, SyncSettings};
pub use context::{AppContext, Coordinator};
pub use login::{login, LoginOutcome};
pub use reachability::{Reachability, StaticReachability, TcpReachability};
