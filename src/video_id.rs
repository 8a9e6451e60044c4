//! Video identifiers and their well-formedness rules.

use crate::error::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());
static WATCH_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.|m\.|music\.)?(?:youtube\.com/(?:watch\?(?:.*&)?v=|embed/|shorts/|live/)|youtu\.be/)(?P<id>[A-Za-z0-9_-]{11})",
    )
    .unwrap()
});

/// The eleven character identifier the platform assigns to every video.
///
/// A [`VideoId`] can be built from the bare identifier or from any of the common watch page /
/// share url shapes pointing to a video. Malformed input is rejected on construction so every
/// instance in circulation is well-formed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoId(String);

impl VideoId {
    /// Build a new [`VideoId`] from a raw id or a video url.
    pub fn new<S: AsRef<str>>(raw: S) -> Result<Self> {
        let raw = raw.as_ref().trim();

        if VIDEO_ID.is_match(raw) {
            return Ok(Self(raw.to_string()));
        }
        if let Some(capture) = WATCH_URL.captures(raw) {
            return Ok(Self(capture["id"].to_string()));
        }

        Err(Error::Input(
            ErrorContext::new(format!("'{raw}' is not a valid video id or video url")),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch page url of this video.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl Display for VideoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VideoId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for VideoId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::VideoId;

    #[test]
    fn accepts_bare_ids() {
        assert_eq!(
            VideoId::new("dQw4w9WgXcQ").unwrap().as_str(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(VideoId::new("_-abc123XyZ").unwrap().as_str(), "_-abc123XyZ");
    }

    #[test]
    fn accepts_common_url_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?list=PL123&v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "www.youtube.com/embed/dQw4w9WgXcQ",
        ] {
            assert_eq!(VideoId::new(url).unwrap().as_str(), "dQw4w9WgXcQ", "{url}");
        }
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in [
            "",
            "tooshort",
            "definitely-too-long",
            "dQw4w9WgXc!",
            "https://example.com/watch?v=dQw4w9WgXcQ",
        ] {
            assert!(VideoId::new(raw).is_err(), "{raw}");
        }
    }
}
