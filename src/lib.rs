pub mod agent;
pub mod channel;
pub mod client;
pub mod config;
pub mod errors;
pub mod framing;
pub mod queue;
pub mod share;
pub mod worker;

pub use config::Config;
pub use errors::{LinkError, Result};
