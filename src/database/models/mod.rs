pub mod car;
pub mod user;

pub use car::{Car, CarPatch, FieldErrors, NewCar};
pub use user::{LoginRequest, RegisterUser, User, UserProfile};
