use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{Crop, Gravity, MediaUploader, Picture, Transformation, UploadError, UploadOptions, UploadedImage};
use crate::config::{MediaConfig, SignatureAlgorithm};

/// Signed uploads to the Cloudinary image API.
///
/// The signature digest follows `MediaConfig::signature_algorithm`. The client
/// has no request timeout.
pub struct CloudinaryClient {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    api_base_url: String,
    signature_algorithm: SignatureAlgorithm,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
    public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl Transformation {
    /// Cloudinary transformation string, parameters in alphabetical order
    pub fn to_cloudinary(&self) -> String {
        let crop = match self.crop {
            Crop::Fill => "fill",
        };
        let gravity = match self.gravity {
            Gravity::Auto => "auto",
        };
        format!("c_{},g_{},h_{},w_{}", crop, gravity, self.height, self.width)
    }
}

impl CloudinaryClient {
    pub fn new(config: &MediaConfig) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_base_url: config.api_base_url.clone(),
            signature_algorithm: config.signature_algorithm,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.api_base_url.trim_end_matches('/'),
            self.cloud_name
        )
    }

    /// Sign the request parameters: `k=v` pairs sorted by key, joined with `&`,
    /// the API secret appended, hex digest. `file` and `api_key` are not signed.
    fn sign(params: &[(&str, String)], api_secret: &str, algorithm: SignatureAlgorithm) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);

        let to_sign = sorted
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");

        match algorithm {
            SignatureAlgorithm::Sha1 => hex_digest::<Sha1>(&to_sign, api_secret),
            SignatureAlgorithm::Sha256 => hex_digest::<Sha256>(&to_sign, api_secret),
        }
    }
}

fn hex_digest<D: Digest>(to_sign: &str, api_secret: &str) -> String {
    let mut hasher = D::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

#[async_trait]
impl MediaUploader for CloudinaryClient {
    async fn upload(
        &self,
        picture: Picture,
        options: &UploadOptions,
    ) -> Result<UploadedImage, UploadError> {
        if picture.data.is_empty() {
            return Err(UploadError::EmptyPayload);
        }

        let params = vec![
            ("folder", options.folder.clone()),
            ("timestamp", Utc::now().timestamp().to_string()),
            ("transformation", options.transformation.to_cloudinary()),
        ];
        let signature = Self::sign(&params, &self.api_secret, self.signature_algorithm);

        let size = picture.data.len();
        let file = Part::bytes(picture.data.to_vec())
            .file_name(picture.file_name.unwrap_or_else(|| "picture".to_string()));

        let mut form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value);
        }
        let form = form.part("file", file);

        let response = self
            .http
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let url = body
            .secure_url
            .or(body.url)
            .filter(|url| !url.is_empty())
            .ok_or(UploadError::MissingUrl)?;

        info!("Uploaded picture ({} bytes) to {}", size, url);
        Ok(UploadedImage {
            url,
            public_id: body.public_id,
        })
    }
}
