pub mod auth;
pub mod response;

pub use auth::{AuthUser, BearerToken};
pub use response::{ApiResponse, ApiResult};
