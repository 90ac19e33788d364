//! Picture hosting.
//!
//! The car workflow only needs "store these bytes somewhere public and give
//! me the URL", so the hosting service sits behind [`MediaUploader`]. The
//! production implementation is [`cloudinary::CloudinaryClient`].

pub mod cloudinary;

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;

use crate::config::MediaConfig;

pub use cloudinary::CloudinaryClient;

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct Picture {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crop {
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    /// Let the host pick the focal point
    Auto,
}

/// Resize applied by the host at upload time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transformation {
    pub crop: Crop,
    pub gravity: Gravity,
    pub width: u32,
    pub height: u32,
}

impl Transformation {
    pub fn fill(width: u32, height: u32) -> Self {
        Self {
            crop: Crop::Fill,
            gravity: Gravity::Auto,
            width,
            height,
        }
    }
}

/// Where and how a picture is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub folder: String,
    pub transformation: Transformation,
}

impl UploadOptions {
    pub fn from_config(config: &MediaConfig) -> Self {
        Self {
            folder: config.folder.clone(),
            transformation: Transformation::fill(config.width, config.height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub url: String,
    pub public_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Picture is empty")]
    EmptyPayload,

    #[error("Media service request failed: {0}")]
    Transport(String),

    #[error("Media service rejected the upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Media service returned no URL")]
    MissingUrl,
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(
        &self,
        picture: Picture,
        options: &UploadOptions,
    ) -> Result<UploadedImage, UploadError>;
}
