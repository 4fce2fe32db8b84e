pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod peer;
pub mod power;
pub mod runner;
pub mod vehicle;

pub use config::AgentConfig;
pub use error::AgentError;
