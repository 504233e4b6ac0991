//! Node infrastructure for the meshlite binary:
//! - [`args`] - CLI argument groups
//! - [`config`] - assembly of the node configuration from those arguments
//! - [`identity`] - keypair loading or generation
//! - [`logging`] - tracing subscriber initialisation

pub mod args;
pub mod config;
pub mod identity;
pub mod logging;

pub use config::{ConfigError, NodeConfig};
pub use identity::{IdentityError, NodeIdentity};
