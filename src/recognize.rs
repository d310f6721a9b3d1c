//! One-shot recognition of a local audio file, reduced to a flat JSON summary.
//!
//! [`recognize_audio`] validates the path, asks a [`Recognizer`] exactly
//! once, and turns whatever comes back into a [`RecognitionOutput`].  Every
//! failure is reported in-band as `{"error": "..."}` rather than as a Rust
//! error, so callers always get one printable JSON object.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::shazam::RecognizeResult;

pub const SOURCE: &str = "shazam";
pub const NO_MATCH: &str = "No match found";

/// Anything that can identify a song from an audio file.
pub trait Recognizer {
    fn recognize_file(&self, path: &Path) -> Result<RecognizeResult>;
}

/// Successful recognition, serialized with keys in this order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub success: bool,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: Option<u32>,
    pub source: String,
}

impl From<&RecognizeResult> for TrackSummary {
    fn from(result: &RecognizeResult) -> Self {
        TrackSummary {
            success: true,
            title: result.title.clone().unwrap_or_default(),
            artist: result.artist.clone().unwrap_or_default(),
            album: result.album.clone().unwrap_or_default(),
            genre: result.genre.clone().unwrap_or_default(),
            year: result.year,
            source: SOURCE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecognitionOutput {
    Success(TrackSummary),
    Failure { error: String },
}

impl RecognitionOutput {
    pub fn error(message: impl Into<String>) -> Self {
        RecognitionOutput::Failure {
            error: message.into(),
        }
    }

    /// Error object printed when the program is invoked without a file.
    pub fn usage(program: &str) -> Self {
        Self::error(format!("Usage: {} <audio_file_path>", program))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecognitionOutput::Success(_))
    }

    /// Map a service response: no `track` object means no match.
    pub fn from_result(result: &RecognizeResult) -> Self {
        if !result.has_track() {
            return Self::error(NO_MATCH);
        }
        RecognitionOutput::Success(TrackSummary::from(result))
    }

    /// Single-line JSON, without a trailing newline.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

/// Recognize the audio file at `path` with `recognizer`.
pub fn recognize_audio<R: Recognizer + ?Sized>(path: &Path, recognizer: &R) -> RecognitionOutput {
    if !path.exists() {
        return RecognitionOutput::error(format!("File not found: {}", path.display()));
    }

    match recognizer.recognize_file(path) {
        Ok(result) => {
            debug!(track = %result, "recognition finished");
            RecognitionOutput::from_result(&result)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "recognition failed");
            RecognitionOutput::error(e.to_string())
        }
    }
}
