//! Request-side representation of a signature.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::Result;
use crate::fingerprinting::signature_format::DecodedSignature;

const TIMEZONE: &str = "Europe/Paris";

#[derive(Debug, Clone, Serialize)]
pub struct SignatureSong {
    /// Signature duration in milliseconds.
    pub samples: u32,
    /// `data:` URI carrying the base64 encoded binary signature.
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Signature {
    pub timezone: String,
    pub signature: SignatureSong,
    /// Unix time in milliseconds.
    pub timestamp: u64,
}

pub fn get_signature_json(signature: &DecodedSignature) -> Result<Signature> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    Ok(Signature {
        timezone: TIMEZONE.to_string(),
        signature: SignatureSong {
            samples: signature.duration_ms(),
            uri: signature.encode_to_uri()?,
        },
        timestamp,
    })
}
