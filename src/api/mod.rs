pub mod response;
pub mod routes;

pub use response::{ErrorResponse, HealthResponse};
pub use routes::{create_router, AppState};
