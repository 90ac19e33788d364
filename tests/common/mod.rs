#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use cars_api::app::{self, AppState};
use cars_api::auth::AuthHandler;
use cars_api::background::{BackgroundTasks, EnrichmentError, EnrichmentJob, Enricher};
use cars_api::config::AppConfig;
use cars_api::database::MemoryDocumentStore;
use cars_api::media::{MediaUploader, Picture, UploadError, UploadOptions, UploadedImage};

pub const PICTURE_URL: &str = "https://res.cloudinary.com/demo/image/upload/FARM2/corolla.jpg";
pub const PASSWORD: &str = "correct horse battery";

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Upload {
    Succeeds,
    Fails,
}

struct StubUploader {
    behavior: Upload,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaUploader for StubUploader {
    async fn upload(
        &self,
        picture: Picture,
        _options: &UploadOptions,
    ) -> Result<UploadedImage, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if picture.data.is_empty() {
            return Err(UploadError::EmptyPayload);
        }
        match self.behavior {
            Upload::Succeeds => Ok(UploadedImage {
                url: PICTURE_URL.to_string(),
                public_id: Some("FARM2/corolla".to_string()),
            }),
            Upload::Fails => Err(UploadError::Rejected {
                status: 500,
                message: "cloud is down".to_string(),
            }),
        }
    }
}

struct RecordingEnricher(mpsc::UnboundedSender<EnrichmentJob>);

#[async_trait]
impl Enricher for RecordingEnricher {
    async fn enrich(&self, job: EnrichmentJob) -> Result<(), EnrichmentError> {
        let _ = self.0.send(job);
        Ok(())
    }
}

/// The real router on a free port, backed by the in-memory store with the
/// picture host and the enricher stubbed out.
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub uploads: Arc<AtomicUsize>,
    pub jobs: mpsc::UnboundedReceiver<EnrichmentJob>,
}

impl TestServer {
    pub async fn start(upload: Upload) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = AppConfig::from_env();
        let store = Arc::new(MemoryDocumentStore::new());
        let auth = Arc::new(AuthHandler::new("integration-test-secret", 1)?);
        let uploads = Arc::new(AtomicUsize::new(0));
        let media = Arc::new(StubUploader {
            behavior: upload,
            calls: uploads.clone(),
        });
        let (seen, jobs) = mpsc::unbounded_channel();
        let (background, _worker) = BackgroundTasks::spawn(Arc::new(RecordingEnricher(seen)));

        let state = AppState::new(
            store,
            auth,
            media,
            background,
            UploadOptions::from_config(&config.media),
        );
        let router = app::router(state, &config);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind port {}", port))?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
            uploads,
            jobs,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register `username` and log in; returns the user id and bearer token
    pub async fn register_and_login(&self, username: &str) -> Result<(String, String)> {
        let res = self
            .client
            .post(self.url("/users/register"))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": PASSWORD,
            }))
            .send()
            .await?;
        anyhow::ensure!(
            res.status() == StatusCode::CREATED,
            "register failed: {}",
            res.status()
        );
        let profile: Value = res.json().await?;
        let user_id = profile["id"]
            .as_str()
            .context("profile without id")?
            .to_string();

        let res = self
            .client
            .post(self.url("/users/login"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login failed: {}", res.status());
        let body: Value = res.json().await?;
        let token = body["token"].as_str().context("login without token")?.to_string();

        Ok((user_id, token))
    }

    pub async fn create_car(&self, token: &str, form: Form) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/cars"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?)
    }

    pub async fn car_count(&self) -> Result<usize> {
        let cars: Vec<Value> = self.client.get(self.url("/cars")).send().await?.json().await?;
        Ok(cars.len())
    }
}

/// The reference listing: a 2020 Toyota Corolla
pub fn corolla_form() -> Result<Form> {
    car_form(&[
        ("brand", "Toyota"),
        ("make", "Corolla"),
        ("year", "2020"),
        ("cm3", "1800"),
        ("km", "500"),
        ("price", "18000"),
    ])
}

pub fn car_form(fields: &[(&str, &str)]) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name.to_string(), value.to_string());
    }
    let picture = Part::bytes(b"\xff\xd8\xff\xe0 not really a jpeg".to_vec())
        .file_name("corolla.jpg")
        .mime_str("image/jpeg")?;
    Ok(form.part("picture", picture))
}
