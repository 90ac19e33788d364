use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth::AuthHandler;
use crate::background::BackgroundTasks;
use crate::config::{AppConfig, SecurityConfig};
use crate::database::DocumentStore;
use crate::handlers;
use crate::media::{MediaUploader, UploadOptions};
use crate::services::{CarService, UserService};

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub cars: Arc<CarService>,
    pub users: Arc<UserService>,
    pub auth: Arc<AuthHandler>,
    pub store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<AuthHandler>,
        media: Arc<dyn MediaUploader>,
        background: BackgroundTasks,
        upload_options: UploadOptions,
    ) -> Self {
        let cars = CarService::new(
            Arc::clone(&store),
            Arc::clone(&auth),
            media,
            background,
            upload_options,
        );
        let users = UserService::new(Arc::clone(&store), Arc::clone(&auth));

        Self {
            cars: Arc::new(cars),
            users: Arc::new(users),
            auth,
            store,
        }
    }
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health))
        .merge(car_routes())
        .merge(user_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.security))
                .layer(DefaultBodyLimit::max(config.server.max_request_size_bytes)),
        )
        .with_state(state)
}

fn car_routes() -> Router<AppState> {
    use handlers::cars;

    Router::new()
        .route("/cars", get(cars::list).post(cars::create))
        .route(
            "/cars/:car_id",
            get(cars::get).put(cars::update).delete(cars::delete),
        )
}

fn user_routes() -> Router<AppState> {
    use handlers::users;

    Router::new()
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/me", get(users::me))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
