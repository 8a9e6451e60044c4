//! Fetching and decoding of player responses, watch pages and manifest documents.

use crate::error::Result;
use crate::parse::player::{parse_player_response, PlayerResponse};
use crate::parse::watch_page::WatchPage;
use crate::parse::{dash, hls};
use crate::persona::{ClientPersona, PersonaName};
use crate::stream::StreamDescriptor;
use crate::transport::Transport;
use crate::video_id::VideoId;
use http::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE, ORIGIN, USER_AGENT};
use serde_json::json;

const PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player";
const WATCH_ENDPOINT: &str = "https://www.youtube.com/watch";
const ORIGIN_URL: &str = "https://www.youtube.com";

/// Cookie which waves away the interstitial consent page some regions are served.
const CONSENT_COOKIE: &str = "CONSENT=YES+cb.20210328-17-p0.en+FX+999; SOCS=CAI";

/// Thin client around the [`Transport`] for everything the resolver fetches.
pub(crate) struct PlayerClient<'a> {
    transport: &'a Transport,
}

impl<'a> PlayerClient<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Query the player endpoint for `video_id` through the given persona.
    ///
    /// The request body embeds the persona's payload template verbatim, extended by the video
    /// id, the content check flags and the playback context. Headers impersonate the persona's
    /// client.
    pub(crate) async fn get_player_response(
        &self,
        video_id: &VideoId,
        persona: &ClientPersona,
        signature_timestamp: Option<u64>,
    ) -> Result<PlayerResponse> {
        let mut playback_context = json!({
            "contentPlaybackContext": {
                "html5Preference": "HTML5_PREF_WANTS"
            }
        });
        if let Some(sts) = signature_timestamp {
            playback_context["contentPlaybackContext"]["signatureTimestamp"] = sts.into();
        }

        let body = json!({
            "videoId": video_id.as_str(),
            "context": persona.context(),
            "contentCheckOk": true,
            "racyCheckOk": true,
            "playbackContext": playback_context,
        });

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(persona.user_agent));
        headers.insert(ORIGIN, HeaderValue::from_static(ORIGIN_URL));
        headers.insert(
            "X-YouTube-Client-Name",
            HeaderValue::from_static(persona.client_id),
        );
        headers.insert(
            "X-YouTube-Client-Version",
            HeaderValue::from_static(persona.client_version),
        );

        let url = format!(
            "{PLAYER_ENDPOINT}?key={}&prettyPrint=false",
            persona.api_key
        );
        let raw = self.transport.post_json(&url, headers, &body).await?;

        log::debug!(
            "player response for {video_id} via {}: {} bytes",
            persona.name,
            raw.len()
        );
        parse_player_response(&raw)
    }

    /// Fetch the html watch page of a video. Requested with the age gate bypass parameters and
    /// the consent cookie, the same way the platform's own embeds do.
    pub(crate) async fn get_watch_page(&self, video_id: &VideoId) -> Result<WatchPage> {
        let url = format!(
            "{WATCH_ENDPOINT}?v={}&bpctr=9999999999&has_verified=1",
            video_id.as_str()
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(PersonaName::Web.persona().user_agent),
        );
        headers.insert(COOKIE, HeaderValue::from_static(CONSENT_COOKIE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let html = self.transport.get_text(&url, headers).await?;
        Ok(WatchPage::new(html))
    }

    /// Fetch the base player script referenced by a watch page.
    pub(crate) async fn get_player_script(&self, url: &str) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(PersonaName::Web.persona().user_agent),
        );
        self.transport.get_text(url, headers).await
    }

    /// Fetch and decode an adaptive manifest into raw descriptors.
    pub(crate) async fn get_dash_manifest(&self, url: &str) -> Result<Vec<StreamDescriptor>> {
        let xml = self.transport.get_text(url, HeaderMap::new()).await?;
        dash::parse_dash_manifest(&xml)
    }

    /// Fetch and decode a live stream master playlist into raw descriptors.
    pub(crate) async fn get_hls_manifest(&self, url: &str) -> Result<Vec<StreamDescriptor>> {
        let raw = self.transport.get(url, HeaderMap::new()).await?;
        hls::parse_hls_master(&raw)
    }
}
