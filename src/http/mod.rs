//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → middleware/admission.rs (resolve client IP, run guard chain)
//!         → rejected: response.rs (status + JSON reason code)
//!         → admitted: context attached as extensions → handler
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{ClientIp, MakeRequestUuid, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
