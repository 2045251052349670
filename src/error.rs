//! Error taxonomy for the analysis pipeline and the bots.
//!
//! Each stage of a `/summarize` request has its own error type so callers and
//! logs can tell them apart:
//!
//! | Stage | Type | HTTP status |
//! |-------|------|-------------|
//! | Request validation | [`SummarizeError::InvalidUrl`] | 400 |
//! | Article fetch | [`ExtractionError`] | 502 |
//! | Model call | [`GenerationError`] | 502 |
//! | Reply parsing | [`ParseError`] | 500 |
//!
//! Bot-side reply failures use [`DeliveryError`] and never reach HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The article could not be turned into a title and body.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to fetch article: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("failed to extract article content - article is null")]
    NotFound,

    #[error("failed to extract article content - no content found")]
    NoContent,

    #[error("failed to extract article content - no title found")]
    NoTitle,
}

/// The model call failed or produced nothing usable.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("model stream broke off: {0}")]
    Stream(String),

    #[error("model response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("model returned an empty response")]
    Empty,
}

impl GenerationError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GenerationError::Api { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Stream(_) => true,
            GenerationError::Decode(_) | GenerationError::Empty => false,
        }
    }
}

/// The section markers a model reply must contain, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Title,
    Assessment,
    Summary,
    KeyPoints,
    QualityMetrics,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Marker::Title => "Title:",
            Marker::Assessment => "assessment glyph",
            Marker::Summary => "Summary:",
            Marker::KeyPoints => "Key Points:",
            Marker::QualityMetrics => "Quality Metrics:",
        };
        f.write_str(name)
    }
}

/// A model reply did not follow the required block format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid response format (missing {missing})")]
pub struct ParseError {
    /// The first marker the scan failed to reach.
    pub missing: Marker,
}

/// Everything that can end a `/summarize` request.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl SummarizeError {
    pub fn status(&self) -> StatusCode {
        match self {
            SummarizeError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            SummarizeError::Extraction(_) | SummarizeError::Generation(_) => {
                StatusCode::BAD_GATEWAY
            }
            SummarizeError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SummarizeError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

/// A bot could not talk to its social platform.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("platform authentication failed: {0}")]
    Auth(String),
}
