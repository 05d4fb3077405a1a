mod response;
mod server;
mod tracing;

pub use response::{ApiError, ApiResponse};
pub use server::{GatewayServer, GatewayState, HealthResponse};
pub use tracing::{TracingState, REQUEST_ID_HEADER, TRACE_ID_HEADER};
