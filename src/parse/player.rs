//! Parsing of the json player response into the raw stream model.

use crate::error::{Error, ErrorContext, Result};
use crate::stream::{AudioTrack, Container, Fragment, StreamDescriptor, StreamSource};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static MIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<kind>audio|video)/(?P<container>[\w-]+);\s*codecs="(?P<codecs>[^"]+)""#)
        .unwrap()
});

/// Parsed result of a single persona query. Only lives for the duration of one resolution.
#[derive(Clone, Debug, Default)]
pub(crate) struct PlayerResponse {
    pub(crate) is_playable: bool,
    pub(crate) playability_error: Option<String>,
    /// Set when the primary video is gated behind a purchase and the platform offers a free
    /// preview instead.
    pub(crate) preview_video_id: Option<String>,
    pub(crate) dash_manifest_url: Option<String>,
    pub(crate) hls_manifest_url: Option<String>,
    pub(crate) descriptors: Vec<StreamDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawPlayerResponse {
    playability_status: RawPlayabilityStatus,
    streaming_data: RawStreamingData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawPlayabilityStatus {
    status: String,
    reason: Option<String>,
    error_screen: RawErrorScreen,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawErrorScreen {
    player_legacy_desktop_ypc_trailer_renderer: Option<RawLegacyTrailer>,
    ypc_trailer_renderer: Option<RawYpcTrailer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawLegacyTrailer {
    trailer_video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawYpcTrailer {
    player_vars: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawStreamingData {
    formats: Vec<RawFormat>,
    adaptive_formats: Vec<RawFormat>,
    dash_manifest_url: Option<String>,
    hls_manifest_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawFormat {
    itag: u64,
    url: Option<String>,
    #[serde(alias = "cipher")]
    signature_cipher: Option<String>,
    mime_type: String,
    bitrate: u64,
    average_bitrate: Option<u64>,
    content_length: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    quality_label: Option<String>,
    fps: Option<f64>,
    audio_track: Option<RawAudioTrack>,
    #[serde(rename = "type")]
    format_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawAudioTrack {
    display_name: String,
    id: String,
    audio_is_default: bool,
}

/// Turn a raw json player response into a [`PlayerResponse`].
///
/// Field extraction is best effort: unknown fields are ignored, a missing playability status
/// means "not playable" and a missing stream array is simply empty. Only a body which is not
/// json at all is an error.
pub(crate) fn parse_player_response(raw: &[u8]) -> Result<PlayerResponse> {
    let parsed: RawPlayerResponse = serde_json::from_slice(raw).map_err(|e| {
        Error::Decode(
            ErrorContext::new(format!("unparsable player response: {e}"))
                .excerpt(raw),
        )
    })?;

    let mut descriptors = Vec::new();
    for format in parsed.streaming_data.formats {
        if let Some(descriptor) = descriptor_from_format(format, StreamSource::Progressive) {
            descriptors.push(descriptor);
        }
    }
    for format in parsed.streaming_data.adaptive_formats {
        if let Some(descriptor) = descriptor_from_format(format, StreamSource::Adaptive) {
            descriptors.push(descriptor);
        }
    }

    let status = parsed.playability_status;
    let preview_video_id = status
        .error_screen
        .player_legacy_desktop_ypc_trailer_renderer
        .and_then(|renderer| renderer.trailer_video_id)
        .or_else(|| {
            status
                .error_screen
                .ypc_trailer_renderer
                .and_then(|renderer| renderer.player_vars)
                .and_then(|vars| {
                    url::form_urlencoded::parse(vars.as_bytes())
                        .find(|(key, _)| key == "video_id")
                        .map(|(_, value)| value.into_owned())
                })
        });

    Ok(PlayerResponse {
        is_playable: status.status == "OK",
        playability_error: status.reason,
        preview_video_id,
        dash_manifest_url: parsed.streaming_data.dash_manifest_url,
        hls_manifest_url: parsed.streaming_data.hls_manifest_url,
        descriptors,
    })
}

fn descriptor_from_format(format: RawFormat, source: StreamSource) -> Option<StreamDescriptor> {
    // Segmented OTF renditions have no addressable whole resource behind their url; skip them
    // like the web player does for plain playback.
    if format.format_type.as_deref() == Some("FORMAT_STREAM_TYPE_OTF") {
        log::debug!("skipping otf rendition (itag {})", format.itag);
        return None;
    }

    let url = match (format.url, format.signature_cipher) {
        (Some(url), _) => url,
        (None, Some(cipher)) => {
            let mut url = None;
            let mut protected = false;
            for (key, value) in url::form_urlencoded::parse(cipher.as_bytes()) {
                match key.as_ref() {
                    "url" => url = Some(value.into_owned()),
                    "s" => protected = true,
                    _ => {}
                }
            }
            if protected {
                // A scrambled signature would have to be rewritten through the full cipher
                // chain; such renditions always have an unprotected sibling, so drop this one.
                log::debug!(
                    "skipping signature protected rendition (itag {})",
                    format.itag
                );
                return None;
            }
            url?
        }
        (None, None) => return None,
    };

    let (container, audio_codec, video_codec, kind) = match MIME.captures(&format.mime_type) {
        Some(capture) => {
            let kind = capture["kind"].to_string();
            let container = Container::from(&capture["container"]);
            let codecs: Vec<String> = capture["codecs"]
                .split(',')
                .map(|codec| codec.trim().to_string())
                .collect();

            let (audio, video) = if kind == "audio" {
                (codecs.first().cloned(), None)
            } else if codecs.len() > 1 {
                (codecs.last().cloned(), codecs.first().cloned())
            } else {
                (None, codecs.first().cloned())
            };
            (container, audio, video, kind)
        }
        None => (Container::default(), None, None, String::new()),
    };

    Some(StreamDescriptor {
        itag: format.itag,
        url,
        container,
        audio_only: kind == "audio",
        video_only: kind == "video" && audio_codec.is_none(),
        audio_codec,
        video_codec,
        bitrate: format.average_bitrate.unwrap_or(format.bitrate),
        content_length: format
            .content_length
            .and_then(|length| length.parse().ok()),
        width: format.width,
        height: format.height,
        quality_label: format.quality_label,
        framerate: format.fps,
        fragments: Vec::<Fragment>::new(),
        source,
        audio_track: format.audio_track.map(|track| AudioTrack {
            language: track.display_name,
            id: track.id,
            is_default: track.audio_is_default,
        }),
    })
}
