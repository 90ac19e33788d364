// handlers/mod.rs - HTTP handlers, one module per resource
//
// Public: /, /health, /users/register, /users/login, GET /cars[/:car_id]
// Bearer token: POST /cars, GET /users/me
pub mod cars;
pub mod root;
pub mod users;
