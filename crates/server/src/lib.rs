pub mod applications;
pub mod bootstrap;
pub mod health;

pub use bootstrap::{bootstrap, bootstrap_with_config, build_router, Application, BootstrapError};
