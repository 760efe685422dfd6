pub mod api;
pub mod config;
pub mod domain;
pub mod events;
pub mod observability;
pub mod policy;
pub mod storage;

pub use config::Config;
pub use domain::{Policy, PolicyId, Rule};
pub use policy::{PolicyError, PolicyService};
