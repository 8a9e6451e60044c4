//! Extraction of the player bootstrap data embedded in the html watch page.

use crate::parse::matched_braces;
use once_cell::sync::Lazy;
use regex::Regex;

static PLAYER_RESPONSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"ytInitialPlayerResponse\s*=\s*"#).unwrap());
static JS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:jsUrl|PLAYER_JS_URL)"\s*:\s*"(?P<path>/s/player/[^"]+?/base\.js)""#).unwrap()
});
static JS_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(/s/player/[\w\d]+/[\w\d_/.]+/base\.js)").unwrap());
static VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""videoId"\s*:\s*"(?P<id>[A-Za-z0-9_-]{11})""#).unwrap());

/// The html watch page of a video. Everything of interest sits in inline script blobs bounded
/// by known sentinel keys; accessors cut the relevant slices out on demand, the page itself is
/// kept as-is.
#[derive(Clone, Debug)]
pub(crate) struct WatchPage {
    html: String,
}

impl WatchPage {
    pub(crate) fn new(html: String) -> Self {
        Self { html }
    }

    /// The inline json player response, if the page embeds one.
    pub(crate) fn player_response(&self) -> Option<&str> {
        let found = PLAYER_RESPONSE.find(&self.html)?;
        matched_braces(self.html[found.end()..].trim_start())
    }

    /// Url of the base player script which defines the descrambling routines.
    pub(crate) fn player_script_url(&self) -> Option<String> {
        let path = JS_URL
            .captures(&self.html)
            .map(|capture| capture["path"].to_string())
            .or_else(|| {
                JS_PATH
                    .find(&self.html)
                    .map(|found| found.as_str().to_string())
            })?;
        Some(format!("https://www.youtube.com{path}"))
    }

    /// The video id as echoed inside the page.
    pub(crate) fn video_id(&self) -> Option<&str> {
        VIDEO_ID
            .captures(&self.html)
            .and_then(|capture| capture.name("id"))
            .map(|id| id.as_str())
    }
}
