pub mod cache;
pub mod document;
pub mod error;
pub mod service;
pub mod validator;

pub use cache::{PolicyCache, PolicySnapshot};
pub use document::{DecodeError, PolicyDocument};
pub use error::{PolicyError, SystemError};
pub use service::PolicyService;
pub use validator::{validate, ValidationFailure};
