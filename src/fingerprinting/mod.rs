//! Shazam audio fingerprinting.
//!
//! [`algorithm`] turns 16 kHz mono PCM into spectral peaks,
//! [`signature_format`] serializes them into the binary signature Shazam
//! expects, and [`communication`] wraps that into the request payload.

pub mod algorithm;
pub mod communication;
pub mod signature_format;

pub use algorithm::SignatureGenerator;
pub use communication::{get_signature_json, Signature};
pub use signature_format::{DecodedSignature, FrequencyBand, FrequencyPeak};
