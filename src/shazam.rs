//! Shazam song recognition API client.
//!
//! Fingerprints audio with [`crate::fingerprinting`] and posts the
//! signature to the reverse-engineered Shazam discovery API.
//!
//! # Example
//! ```no_run
//! use shazam_recognize::shazam::Shazam;
//!
//! let shazam = Shazam::new();
//! let result = shazam.recognize_from_file("song.mp3", None)?;
//! println!("{}", result);
//! # Ok::<(), shazam_recognize::Error>(())
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::fingerprinting::{get_signature_json, Signature, SignatureGenerator};
use crate::recognize::Recognizer;

// ---------------------------------------------------------------------------
// Shazam API
// ---------------------------------------------------------------------------

const SEARCH_FROM_FILE_URL: &str = concat!(
    "https://amp.shazam.com/discovery/v5/{language}/{endpoint_country}/{device}/-/tag",
    "/{uuid_1}/{uuid_2}?sync=true&webv3=true&sampling=true",
    "&connected=&shazamapiversion=v3&sharehub=true&hubv5minorversion=v5.1&hidelb=true&video=v3"
);

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_7_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 14_7_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.2 Mobile/15E148 Safari/604.1",
];

const DEVICES: &[&str] = &["iphone", "android", "web"];

pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_ENDPOINT_COUNTRY: &str = "GB";
pub const DEFAULT_SEGMENT_SECONDS: u32 = 12;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Result type
// ---------------------------------------------------------------------------

/// The result of a song recognition request.
#[derive(Debug, Clone)]
pub struct RecognizeResult {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Primary genre, if Shazam reports one.
    pub genre: Option<String>,
    /// Release year, when the release date starts with four digits.
    pub year: Option<u32>,
    /// Shazam track key.
    pub track_id: Option<String>,
    pub cover_art: Option<String>,
    /// The full raw JSON response from Shazam.
    pub raw: Value,
}

impl fmt::Display for RecognizeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.title, &self.artist) {
            (Some(t), Some(a)) => write!(f, "{} — {}", a, t),
            (Some(t), None) => write!(f, "{}", t),
            _ => write!(f, "(not recognized)"),
        }
    }
}

fn str_at(value: Option<&Value>, key: &str) -> Option<String> {
    value
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

/// Look up `label` (e.g. "Album", "Released") in the SONG section metadata.
fn song_section_entry(track: Option<&Value>, label: &str) -> Option<String> {
    track
        .and_then(|t| t.get("sections"))
        .and_then(|s| s.as_array())
        .and_then(|sections| {
            sections
                .iter()
                .find(|sec| sec.get("type").and_then(|v| v.as_str()) == Some("SONG"))
        })
        .and_then(|sec| sec.get("metadata"))
        .and_then(|m| m.as_array())
        .and_then(|items| {
            items
                .iter()
                .find(|item| item.get("title").and_then(|v| v.as_str()) == Some(label))
        })
        .and_then(|item| item.get("text"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// Year from the first four characters of a release date ("2011-05-13", "2011").
pub fn parse_year(release_date: &str) -> Option<u32> {
    let prefix: String = release_date.chars().take(4).collect();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

impl RecognizeResult {
    /// Returns true if a track was found.
    pub fn is_recognized(&self) -> bool {
        self.title.is_some()
    }

    /// Returns true if the response carries a `track` object at all.
    pub fn has_track(&self) -> bool {
        self.raw.get("track").map_or(false, Value::is_object)
    }

    /// Parse a [`RecognizeResult`] from the raw Shazam JSON response.
    pub fn from_json(raw: Value) -> Self {
        let track = raw.get("track");
        let metadata = track.and_then(|t| t.get("metadata"));

        let title = str_at(track, "title");

        let artist = non_empty(str_at(track, "subtitle"))
            .or_else(|| {
                metadata
                    .and_then(|m| m.get("artists"))
                    .and_then(|a| a.as_array())
                    .and_then(|a| a.first())
                    .and_then(|a| non_empty(str_at(Some(a), "name")))
            })
            .or_else(|| non_empty(song_section_entry(track, "Artist")));

        let album = non_empty(str_at(metadata.and_then(|m| m.get("album")), "name"))
            .or_else(|| non_empty(song_section_entry(track, "Album")));

        let genre = str_at(track.and_then(|t| t.get("genres")), "primary");

        let year = non_empty(str_at(metadata, "release_date"))
            .or_else(|| song_section_entry(track, "Released"))
            .and_then(|date| parse_year(&date));

        let track_id = str_at(track, "key");
        let cover_art = str_at(track.and_then(|t| t.get("images")), "coverarthq");

        RecognizeResult {
            title,
            artist,
            album,
            genre,
            year,
            track_id,
            cover_art,
            raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Shazam client
// ---------------------------------------------------------------------------

/// Shazam API client for song recognition.
pub struct Shazam {
    language: String,
    endpoint_country: String,
    segment_seconds: u32,
    agent: ureq::Agent,
}

impl Default for Shazam {
    fn default() -> Self {
        Self::new()
    }
}

impl Shazam {
    /// Create a new client with default settings (language="en-US", country="GB").
    pub fn new() -> Self {
        Self::with_config(DEFAULT_LANGUAGE, DEFAULT_ENDPOINT_COUNTRY)
    }

    /// Create a new client with custom language and endpoint country.
    pub fn with_config(language: &str, endpoint_country: &str) -> Self {
        Self::build(
            language,
            endpoint_country,
            DEFAULT_SEGMENT_SECONDS,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a client from an effective [`Config`], using built-in defaults
    /// for anything it leaves unset.
    pub fn from_config(config: &Config) -> Self {
        Self::build(
            config.language.as_deref().unwrap_or(DEFAULT_LANGUAGE),
            config.endpoint_country.as_deref().unwrap_or(DEFAULT_ENDPOINT_COUNTRY),
            config.segment_seconds.unwrap_or(DEFAULT_SEGMENT_SECONDS),
            Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        )
    }

    fn build(language: &str, endpoint_country: &str, segment_seconds: u32, timeout: Duration) -> Self {
        Self {
            language: language.to_string(),
            endpoint_country: endpoint_country.to_string(),
            segment_seconds,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    // ------- Recognition ---------------------------------------------------

    /// Recognize a song from an audio file (WAV, MP3, OGG, FLAC).
    ///
    /// The file is decoded, converted to 16 kHz mono, and a centered segment
    /// (the client's configured length unless overridden) is fingerprinted.
    pub fn recognize_from_file<P: AsRef<Path>>(
        &self,
        path: P,
        segment_seconds: Option<u32>,
    ) -> Result<RecognizeResult> {
        let signature = SignatureGenerator::make_signature_from_file(
            path,
            Some(segment_seconds.unwrap_or(self.segment_seconds)),
        )?;
        let sig = get_signature_json(&signature)?;
        self.send_recognize_request(&sig)
    }

    /// Recognize a song from raw file bytes (any supported format).
    pub fn recognize_from_bytes(
        &self,
        bytes: &[u8],
        segment_seconds: Option<u32>,
    ) -> Result<RecognizeResult> {
        let signature = SignatureGenerator::make_signature_from_bytes(
            bytes.to_vec(),
            Some(segment_seconds.unwrap_or(self.segment_seconds)),
        )?;
        let sig = get_signature_json(&signature)?;
        self.send_recognize_request(&sig)
    }

    // ------- Internal helpers ----------------------------------------------

    fn recognize_url(&self, device: &str) -> String {
        let uuid_1 = uuid::Uuid::new_v4().to_string().to_uppercase();
        let uuid_2 = uuid::Uuid::new_v4().to_string().to_uppercase();

        SEARCH_FROM_FILE_URL
            .replace("{language}", &self.language)
            .replace("{endpoint_country}", &self.endpoint_country)
            .replace("{device}", device)
            .replace("{uuid_1}", &uuid_1)
            .replace("{uuid_2}", &uuid_2)
    }

    fn send_recognize_request(&self, sig: &Signature) -> Result<RecognizeResult> {
        let mut rng = rand::thread_rng();

        let device = DEVICES.choose(&mut rng).unwrap_or(&"web");
        let url = self.recognize_url(device);
        let user_agent = USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0]);

        debug!(url = %url, samplems = sig.signature.samples, "sending recognize request");

        let resp: Value = self
            .agent
            .post(&url)
            .set("X-Shazam-Platform", "IPHONE")
            .set("X-Shazam-AppVersion", "14.1.0")
            .set("Accept", "*/*")
            .set("Accept-Language", &self.language)
            .set("Accept-Encoding", "gzip, deflate")
            .set("User-Agent", user_agent)
            .send_json(recognize_payload(sig))?
            .into_json()?;

        let result = RecognizeResult::from_json(resp);
        debug!(track = %result, "recognize response");
        Ok(result)
    }
}

fn recognize_payload(sig: &Signature) -> Value {
    serde_json::json!({
        "timezone": sig.timezone,
        "signature": {
            "uri": sig.signature.uri,
            "samplems": sig.signature.samples,
        },
        "timestamp": sig.timestamp,
        "context": {},
        "geolocation": {},
    })
}

impl Recognizer for Shazam {
    fn recognize_file(&self, path: &Path) -> Result<RecognizeResult> {
        self.recognize_from_file(path, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprinting::communication::SignatureSong;
    use serde_json::json;

    fn full_response() -> Value {
        json!({
            "matches": [{"id": "1"}],
            "track": {
                "key": "54321",
                "title": "Song Title",
                "subtitle": "The Artist",
                "genres": {"primary": "Rock"},
                "images": {"coverarthq": "https://example.com/cover.jpg"},
                "sections": [
                    {"type": "SONG", "metadata": [
                        {"title": "Album", "text": "Section Album"},
                        {"title": "Label", "text": "Some Label"},
                        {"title": "Released", "text": "1999"}
                    ]},
                    {"type": "LYRICS"}
                ]
            }
        })
    }

    #[test]
    fn test_from_json_full() {
        let result = RecognizeResult::from_json(full_response());
        assert!(result.is_recognized());
        assert!(result.has_track());
        assert_eq!(result.title.as_deref(), Some("Song Title"));
        assert_eq!(result.artist.as_deref(), Some("The Artist"));
        assert_eq!(result.album.as_deref(), Some("Section Album"));
        assert_eq!(result.genre.as_deref(), Some("Rock"));
        assert_eq!(result.year, Some(1999));
        assert_eq!(result.track_id.as_deref(), Some("54321"));
        assert_eq!(result.cover_art.as_deref(), Some("https://example.com/cover.jpg"));
        assert_eq!(result.to_string(), "The Artist — Song Title");
    }

    #[test]
    fn test_from_json_metadata_fallbacks() {
        let result = RecognizeResult::from_json(json!({
            "track": {
                "title": "T",
                "subtitle": "",
                "metadata": {
                    "artists": [{"name": "Meta Artist"}, {"name": "Other"}],
                    "album": {"name": "Meta Album"},
                    "release_date": "2011-05-13"
                }
            }
        }));
        assert_eq!(result.artist.as_deref(), Some("Meta Artist"));
        assert_eq!(result.album.as_deref(), Some("Meta Album"));
        assert_eq!(result.year, Some(2011));
        assert_eq!(result.genre, None);
    }

    #[test]
    fn test_from_json_section_artist_and_metadata_precedence() {
        let result = RecognizeResult::from_json(json!({
            "track": {
                "title": "T",
                "metadata": {
                    "album": {"name": "Meta Album"},
                    "release_date": "2004-01-01"
                },
                "sections": [
                    {"type": "SONG", "metadata": [
                        {"title": "Artist", "text": "Section Artist"},
                        {"title": "Album", "text": "Section Album"},
                        {"title": "Released", "text": "1999"}
                    ]}
                ]
            }
        }));
        assert_eq!(result.artist.as_deref(), Some("Section Artist"));
        assert_eq!(result.album.as_deref(), Some("Meta Album"));
        assert_eq!(result.year, Some(2004));
    }

    #[test]
    fn test_from_json_no_match() {
        let result = RecognizeResult::from_json(json!({"matches": [], "tagid": "abc"}));
        assert!(!result.is_recognized());
        assert!(!result.has_track());
        assert_eq!(result.to_string(), "(not recognized)");

        let null_track = RecognizeResult::from_json(json!({"track": null}));
        assert!(!null_track.has_track());
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2011-05-13"), Some(2011));
        assert_eq!(parse_year("1987"), Some(1987));
        assert_eq!(parse_year("19"), Some(19));
        assert_eq!(parse_year("n/a"), None);
        assert_eq!(parse_year("12ab"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn test_from_config_defaults() {
        let mut config = Config::new();
        config.language = Some("it-IT".to_string());
        let shazam = Shazam::from_config(&config);
        assert_eq!(shazam.language, "it-IT");
        assert_eq!(shazam.endpoint_country, DEFAULT_ENDPOINT_COUNTRY);
        assert_eq!(shazam.segment_seconds, DEFAULT_SEGMENT_SECONDS);
    }

    #[test]
    fn test_recognize_url() {
        let shazam = Shazam::with_config("fr-FR", "FR");
        let url = shazam.recognize_url("iphone");
        assert!(url.starts_with("https://amp.shazam.com/discovery/v5/fr-FR/FR/iphone/-/tag/"));
        assert!(!url.contains('{'));

        let path = url.split('?').next().unwrap();
        let uuids: Vec<&str> = path.rsplitn(3, '/').take(2).collect();
        for id in uuids {
            assert_eq!(id.len(), 36);
            assert_eq!(id, id.to_uppercase());
        }
    }

    #[test]
    fn test_recognize_payload() {
        let sig = Signature {
            timezone: "Europe/Paris".to_string(),
            signature: SignatureSong {
                samples: 12000,
                uri: "data:audio/vnd.shazam.sig;base64,AAAA".to_string(),
            },
            timestamp: 1_700_000_000_000,
        };
        let payload = recognize_payload(&sig);
        assert_eq!(payload["signature"]["samplems"], 12000);
        assert_eq!(payload["signature"]["uri"], "data:audio/vnd.shazam.sig;base64,AAAA");
        assert_eq!(payload["timestamp"], 1_700_000_000_000u64);
        assert!(payload["context"].as_object().unwrap().is_empty());
    }
}
