pub mod car_service;
pub mod user_service;

pub use car_service::{CarError, CarService};
pub use user_service::{TokenResponse, UserError, UserService};
