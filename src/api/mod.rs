pub mod request;
pub mod response;
pub mod routes;

pub use request::ProtectRequest;
pub use response::{DecisionResponse, ErrorResponse, HealthResponse};
pub use routes::{create_router, AppState};
