pub mod board;
pub mod config;
pub mod error;
pub mod k8s;
pub mod ledger;
pub mod metrics;
pub mod scenario;
pub mod status;

pub use k8s::USER_AGENT;
