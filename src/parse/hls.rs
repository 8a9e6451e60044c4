//! Parsing of live stream (HLS) master playlists into raw stream descriptors.

use crate::error::{Error, ErrorContext, Result};
use crate::stream::{AudioTrack, Container, StreamDescriptor, StreamSource};
use m3u8_rs::AlternativeMediaType;
use once_cell::sync::Lazy;
use regex::Regex;

static ITAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"/itag/(?P<itag>\d+)/").unwrap());

const AUDIO_CODEC_PREFIXES: [&str; 5] = ["mp4a", "opus", "vorbis", "ac-3", "ec-3"];

/// Extract one [`StreamDescriptor`] per variant and audio rendition of an HLS master
/// playlist. The platform encodes the itag into the variant uri path; entries without one
/// cannot be correlated and are skipped.
pub(crate) fn parse_hls_master(raw: &[u8]) -> Result<Vec<StreamDescriptor>> {
    let playlist = m3u8_rs::parse_master_playlist_res(raw)
        .map_err(|e| Error::Decode(ErrorContext::new(format!("invalid hls playlist: {e}"))))?;

    let mut descriptors = Vec::new();

    for variant in playlist.variants {
        let Some(itag) = itag_from_uri(&variant.uri) else {
            continue;
        };

        let codecs = variant.codecs.unwrap_or_default();
        let mut audio_codec = None;
        let mut video_codec = None;
        for codec in codecs.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            if AUDIO_CODEC_PREFIXES
                .iter()
                .any(|prefix| codec.starts_with(prefix))
            {
                audio_codec.get_or_insert_with(|| codec.to_string());
            } else {
                video_codec.get_or_insert_with(|| codec.to_string());
            }
        }

        let resolution = variant.resolution;
        descriptors.push(StreamDescriptor {
            itag,
            url: variant.uri,
            container: Container::Ts,
            video_only: video_codec.is_some() && audio_codec.is_none(),
            audio_only: false,
            audio_codec,
            video_codec,
            bitrate: variant.bandwidth,
            content_length: None,
            width: resolution.map(|resolution| resolution.width as u32),
            height: resolution.map(|resolution| resolution.height as u32),
            quality_label: None,
            framerate: variant.frame_rate,
            fragments: vec![],
            source: StreamSource::Hls,
            audio_track: None,
        })
    }

    for alternative in playlist.alternatives {
        if alternative.media_type != AlternativeMediaType::Audio {
            continue;
        }
        let Some(uri) = alternative.uri else {
            continue;
        };
        let Some(itag) = itag_from_uri(&uri) else {
            continue;
        };

        descriptors.push(StreamDescriptor {
            itag,
            url: uri,
            container: Container::Ts,
            audio_codec: Some("mp4a.40.2".to_string()),
            video_codec: None,
            bitrate: 0,
            content_length: None,
            width: None,
            height: None,
            quality_label: None,
            framerate: None,
            fragments: vec![],
            source: StreamSource::Hls,
            audio_only: true,
            video_only: false,
            audio_track: Some(AudioTrack {
                language: alternative.name,
                id: alternative.language.unwrap_or_default(),
                is_default: alternative.default,
            }),
        })
    }

    Ok(descriptors)
}

fn itag_from_uri(uri: &str) -> Option<u64> {
    ITAG.captures(uri)?.name("itag")?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_variants_and_audio_renditions() {
        let raw = include_bytes!("../../tests/fixtures/master.m3u8");
        let descriptors = parse_hls_master(raw).unwrap();

        assert_eq!(descriptors.len(), 4);

        let muxed = &descriptors[0];
        assert_eq!(muxed.itag, 93);
        assert!(!muxed.audio_only && !muxed.video_only);
        assert_eq!(muxed.video_codec.as_deref(), Some("avc1.4d4015"));
        assert_eq!(muxed.audio_codec.as_deref(), Some("mp4a.40.2"));
        assert_eq!((muxed.width, muxed.height), (Some(640), Some(360)));
        assert!(matches!(muxed.source, StreamSource::Hls));

        let hd = &descriptors[1];
        assert_eq!(hd.itag, 95);
        assert_eq!(hd.framerate, Some(30.0));
        assert_eq!(hd.bitrate, 2_962_000);

        let video_only = &descriptors[2];
        assert_eq!(video_only.itag, 301);
        assert!(video_only.video_only && !video_only.audio_only);
        assert!(video_only.audio_codec.is_none());

        let audio = &descriptors[3];
        assert_eq!(audio.itag, 233);
        assert!(audio.audio_only);
        let track = audio.audio_track.as_ref().expect("audio track");
        assert_eq!(track.id, "en");
        assert!(track.is_default);
    }

    #[test]
    fn entries_without_an_itag_are_skipped() {
        let raw = b"#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1000,CODECS=\"avc1.4d4015,mp4a.40.2\"\nhttps://manifest.example/plain.m3u8\n";
        assert!(parse_hls_master(raw).unwrap().is_empty());
    }
}
