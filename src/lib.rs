pub mod config;
pub mod error;
pub mod fingerprinting;
pub mod recognize;
pub mod shazam;

pub use config::Config;
pub use error::{Error, Result};
pub use recognize::{recognize_audio, RecognitionOutput, Recognizer, TrackSummary};
pub use shazam::{RecognizeResult, Shazam};
