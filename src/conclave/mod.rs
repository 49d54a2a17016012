// src/conclave/mod.rs

pub mod agent;
pub mod cache;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod group;
pub mod http_client_pool;
pub mod metrics;
pub mod session;

// Let's explicitly export AgentGroup so it is reachable as conclave::AgentGroup
// and not only through conclave::group::AgentGroup
pub use group::AgentGroup;
pub use session::ChatSession;
