//! The normalized stream model a resolved manifest is made of.

use crate::macros::string_enum;
use crate::video_id::VideoId;
use serde::Serialize;
use std::fmt::{Display, Formatter};

string_enum! {
    /// Container format of a stream, as advertised through the rendition's mime type. The
    /// platform occasionally surfaces containers this crate does not know, those end up in
    /// [`Container::Custom`].
    pub enum Container {
        Mp4 => "mp4",
        WebM => "webm",
        Tgpp => "3gpp",
        Ts => "ts",
    }
}

/// Pixel dimensions of a video rendition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Canonical video quality steps the platform serves.
///
/// Derived from the rendition's quality label; the label may carry a framerate or HDR suffix
/// ("1080p60 HDR") which is ignored for the quality itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VideoQuality {
    P144,
    P240,
    P360,
    P480,
    P720,
    P1080,
    P1440,
    P2160,
    P4320,
}

impl VideoQuality {
    pub(crate) fn from_label(label: &str) -> Option<Self> {
        let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
        match digits.parse::<u32>().ok()? {
            144 => Some(VideoQuality::P144),
            240 => Some(VideoQuality::P240),
            360 => Some(VideoQuality::P360),
            480 => Some(VideoQuality::P480),
            720 => Some(VideoQuality::P720),
            1080 => Some(VideoQuality::P1080),
            1440 => Some(VideoQuality::P1440),
            2160 | 3072 => Some(VideoQuality::P2160),
            4320 => Some(VideoQuality::P4320),
            _ => None,
        }
    }

    /// The typical 16:9 resolution of this quality step. Used when a rendition does not report
    /// its own dimensions.
    pub fn canonical_resolution(self) -> Resolution {
        let (width, height) = match self {
            VideoQuality::P144 => (256, 144),
            VideoQuality::P240 => (426, 240),
            VideoQuality::P360 => (640, 360),
            VideoQuality::P480 => (854, 480),
            VideoQuality::P720 => (1280, 720),
            VideoQuality::P1080 => (1920, 1080),
            VideoQuality::P1440 => (2560, 1440),
            VideoQuality::P2160 => (3840, 2160),
            VideoQuality::P4320 => (7680, 4320),
        };
        Resolution { width, height }
    }

    pub fn label(self) -> &'static str {
        match self {
            VideoQuality::P144 => "144p",
            VideoQuality::P240 => "240p",
            VideoQuality::P360 => "360p",
            VideoQuality::P480 => "480p",
            VideoQuality::P720 => "720p",
            VideoQuality::P1080 => "1080p",
            VideoQuality::P1440 => "1440p",
            VideoQuality::P2160 => "2160p",
            VideoQuality::P4320 => "4320p",
        }
    }
}

impl Display for VideoQuality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Framerate assumed when the platform does not report one for a video rendition.
pub(crate) const DEFAULT_FRAMERATE: f64 = 24.0;

/// Container and quality of the classic muxed itags. Old progressive renditions come without a
/// quality label, the platform never changed the meaning of their tags though.
pub(crate) fn muxed_defaults_from_itag(itag: u64) -> Option<(Container, VideoQuality)> {
    match itag {
        17 => Some((Container::Tgpp, VideoQuality::P144)),
        36 => Some((Container::Tgpp, VideoQuality::P240)),
        18 => Some((Container::Mp4, VideoQuality::P360)),
        59 | 78 => Some((Container::Mp4, VideoQuality::P480)),
        22 => Some((Container::Mp4, VideoQuality::P720)),
        37 => Some((Container::Mp4, VideoQuality::P1080)),
        38 => Some((Container::Mp4, VideoQuality::P2160)),
        43 => Some((Container::WebM, VideoQuality::P360)),
        44 => Some((Container::WebM, VideoQuality::P480)),
        45 => Some((Container::WebM, VideoQuality::P720)),
        46 => Some((Container::WebM, VideoQuality::P1080)),
        _ => None,
    }
}

/// Descriptor of an alternative audio rendition (dubs, audio descriptions, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AudioTrack {
    /// Human readable language name as reported upstream, e.g. "English (United States)".
    pub language: String,
    /// Opaque track id, e.g. "en-US.4".
    pub id: String,
    /// Whether the platform marks this track as the default for the video.
    pub is_default: bool,
}

/// A single addressable media fragment of a segmented rendition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub path: String,
}

/// Delivery mode a raw descriptor was reported through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum StreamSource {
    #[default]
    Progressive,
    Adaptive,
    Hls,
}

/// Raw per-rendition metadata as reported by the platform, before normalization. Exists only
/// while a manifest is being resolved.
#[derive(Clone, Debug, Default)]
pub(crate) struct StreamDescriptor {
    pub(crate) itag: u64,
    pub(crate) url: String,
    pub(crate) container: Container,
    pub(crate) audio_codec: Option<String>,
    pub(crate) video_codec: Option<String>,
    pub(crate) bitrate: u64,
    pub(crate) content_length: Option<u64>,
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
    pub(crate) quality_label: Option<String>,
    pub(crate) framerate: Option<f64>,
    pub(crate) fragments: Vec<Fragment>,
    pub(crate) source: StreamSource,
    pub(crate) audio_only: bool,
    pub(crate) video_only: bool,
    pub(crate) audio_track: Option<AudioTrack>,
}

/// Fields shared by every stream variant.
#[derive(Clone, Debug, Serialize)]
pub struct StreamBase {
    pub video_id: VideoId,
    /// Rendition tag assigned by the platform, stable within a short time window.
    pub itag: u64,
    /// Signed url, directly playable by a conforming http media client.
    pub url: String,
    pub container: Container,
    /// File size in bytes. Always strictly positive in a resolved manifest.
    pub size: u64,
    /// Bitrate in bits per second.
    pub bitrate: u64,
}

/// A rendition carrying audio and video in one file.
#[derive(Clone, Debug, Serialize)]
pub struct MuxedStream {
    pub base: StreamBase,
    pub video_codec: String,
    pub audio_codec: String,
    pub quality_label: String,
    pub quality: VideoQuality,
    pub resolution: Resolution,
    pub framerate: f64,
}

/// The video half of an adaptive rendition pair.
#[derive(Clone, Debug, Serialize)]
pub struct VideoOnlyStream {
    pub base: StreamBase,
    pub video_codec: String,
    pub quality_label: String,
    pub quality: VideoQuality,
    pub resolution: Resolution,
    pub framerate: f64,
    /// Fragment list of segmented renditions. Empty for renditions served as one resource.
    pub fragments: Vec<Fragment>,
}

/// The audio half of an adaptive rendition pair.
#[derive(Clone, Debug, Serialize)]
pub struct AudioOnlyStream {
    pub base: StreamBase,
    pub audio_codec: String,
    pub audio_track: Option<AudioTrack>,
    /// Fragment list of segmented renditions. Empty for renditions served as one resource.
    pub fragments: Vec<Fragment>,
}

/// A normalized, playable stream rendition.
#[derive(Clone, Debug, Serialize)]
pub enum StreamInfo {
    MuxedProgressive(MuxedStream),
    VideoOnlyAdaptive(VideoOnlyStream),
    AudioOnlyAdaptive(AudioOnlyStream),
    HlsMuxed(MuxedStream),
    HlsVideoOnly(VideoOnlyStream),
    HlsAudio(AudioOnlyStream),
}

/// Uniqueness key of a stream inside a manifest: the itag, extended by the audio track id for
/// audio streams as one itag can carry multiple language tracks.
pub(crate) type StreamKey = (u64, Option<String>);

impl StreamInfo {
    pub fn base(&self) -> &StreamBase {
        match self {
            StreamInfo::MuxedProgressive(stream) | StreamInfo::HlsMuxed(stream) => &stream.base,
            StreamInfo::VideoOnlyAdaptive(stream) | StreamInfo::HlsVideoOnly(stream) => {
                &stream.base
            }
            StreamInfo::AudioOnlyAdaptive(stream) | StreamInfo::HlsAudio(stream) => &stream.base,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        &self.base().video_id
    }

    pub fn itag(&self) -> u64 {
        self.base().itag
    }

    pub fn url(&self) -> &str {
        &self.base().url
    }

    pub fn container(&self) -> &Container {
        &self.base().container
    }

    pub fn size(&self) -> u64 {
        self.base().size
    }

    pub fn bitrate(&self) -> u64 {
        self.base().bitrate
    }

    /// The audio track descriptor, if this is an audio stream with one.
    pub fn audio_track(&self) -> Option<&AudioTrack> {
        match self {
            StreamInfo::AudioOnlyAdaptive(stream) | StreamInfo::HlsAudio(stream) => {
                stream.audio_track.as_ref()
            }
            _ => None,
        }
    }

    /// Whether this rendition belongs to a live stream.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            StreamInfo::HlsMuxed(_) | StreamInfo::HlsVideoOnly(_) | StreamInfo::HlsAudio(_)
        )
    }

    /// Whether this rendition carries an audio track.
    pub fn has_audio(&self) -> bool {
        !matches!(
            self,
            StreamInfo::VideoOnlyAdaptive(_) | StreamInfo::HlsVideoOnly(_)
        )
    }

    /// Whether this rendition carries a video track.
    pub fn has_video(&self) -> bool {
        !matches!(
            self,
            StreamInfo::AudioOnlyAdaptive(_) | StreamInfo::HlsAudio(_)
        )
    }

    pub(crate) fn key(&self) -> StreamKey {
        match self {
            StreamInfo::AudioOnlyAdaptive(stream) | StreamInfo::HlsAudio(stream) => (
                stream.base.itag,
                stream.audio_track.as_ref().map(|track| track.id.clone()),
            ),
            _ => (self.itag(), None),
        }
    }
}

/// The deduplicated set of every distinct rendition available for a video.
///
/// Entries keep the order they were discovered in, but no meaning is attached to it; pick a
/// stream by filtering on the properties you care about.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StreamManifest {
    streams: Vec<StreamInfo>,
}

impl StreamManifest {
    pub(crate) fn new(streams: Vec<StreamInfo>) -> Self {
        Self { streams }
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StreamInfo> {
        self.streams.iter()
    }

    /// All muxed renditions (progressive and live).
    pub fn muxed_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.iter()
            .filter(|stream| stream.has_audio() && stream.has_video())
    }

    /// All video-only renditions.
    pub fn video_only_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.iter()
            .filter(|stream| stream.has_video() && !stream.has_audio())
    }

    /// All audio-only renditions.
    pub fn audio_only_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.iter()
            .filter(|stream| stream.has_audio() && !stream.has_video())
    }

    /// All live stream renditions.
    pub fn live_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.iter().filter(|stream| stream.is_live())
    }
}

impl IntoIterator for StreamManifest {
    type Item = StreamInfo;
    type IntoIter = std::vec::IntoIter<StreamInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.streams.into_iter()
    }
}

impl<'a> IntoIterator for &'a StreamManifest {
    type Item = &'a StreamInfo;
    type IntoIter = std::slice::Iter<'a, StreamInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.streams.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_from_label() {
        assert_eq!(VideoQuality::from_label("720p"), Some(VideoQuality::P720));
        assert_eq!(VideoQuality::from_label("720p60"), Some(VideoQuality::P720));
        assert_eq!(
            VideoQuality::from_label("2160p60 HDR"),
            Some(VideoQuality::P2160)
        );
        assert_eq!(VideoQuality::from_label("144p 15fps"), Some(VideoQuality::P144));
        assert_eq!(VideoQuality::from_label("audio only"), None);
        assert_eq!(VideoQuality::from_label("999p"), None);
    }

    #[test]
    fn quality_orders_by_pixel_count() {
        assert!(VideoQuality::P144 < VideoQuality::P720);
        assert!(VideoQuality::P1080 < VideoQuality::P4320);
    }

    #[test]
    fn canonical_resolutions_match_labels() {
        assert_eq!(
            VideoQuality::P720.canonical_resolution(),
            Resolution {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(VideoQuality::P4320.canonical_resolution().height, 4320);
    }

    #[test]
    fn container_falls_back_to_custom() {
        assert_eq!(Container::from("mp4"), Container::Mp4);
        assert_eq!(Container::from("webm"), Container::WebM);
        assert_eq!(Container::WebM.as_str(), "webm");
        assert_eq!(
            Container::from("mkv"),
            Container::Custom("mkv".to_string())
        );
        assert_eq!(Container::Custom("mkv".to_string()).to_string(), "mkv");
    }

    #[test]
    fn classic_itags_have_defaults() {
        assert_eq!(
            muxed_defaults_from_itag(18),
            Some((Container::Mp4, VideoQuality::P360))
        );
        assert_eq!(
            muxed_defaults_from_itag(22),
            Some((Container::Mp4, VideoQuality::P720))
        );
        assert_eq!(muxed_defaults_from_itag(999), None);
    }

    fn base(itag: u64) -> StreamBase {
        StreamBase {
            video_id: crate::VideoId::new("dQw4w9WgXcQ").unwrap(),
            itag,
            url: "https://example.invalid/video".to_string(),
            container: Container::Mp4,
            size: 1,
            bitrate: 1,
        }
    }

    #[test]
    fn audio_streams_key_on_track_id() {
        let plain = StreamInfo::AudioOnlyAdaptive(AudioOnlyStream {
            base: base(140),
            audio_codec: "mp4a.40.2".to_string(),
            audio_track: None,
            fragments: vec![],
        });
        let dubbed = StreamInfo::AudioOnlyAdaptive(AudioOnlyStream {
            base: base(140),
            audio_codec: "mp4a.40.2".to_string(),
            audio_track: Some(AudioTrack {
                language: "Deutsch".to_string(),
                id: "de-DE.3".to_string(),
                is_default: false,
            }),
            fragments: vec![],
        });

        assert_ne!(plain.key(), dubbed.key());
        assert_eq!(plain.key(), (140, None));
        assert_eq!(dubbed.key(), (140, Some("de-DE.3".to_string())));
    }

    #[test]
    fn video_streams_key_on_itag_alone() {
        let video = StreamInfo::VideoOnlyAdaptive(VideoOnlyStream {
            base: base(248),
            video_codec: "vp9".to_string(),
            quality_label: "1080p".to_string(),
            quality: VideoQuality::P1080,
            resolution: VideoQuality::P1080.canonical_resolution(),
            framerate: DEFAULT_FRAMERATE,
            fragments: vec![],
        });
        assert_eq!(video.key(), (248, None));
        assert!(video.has_video() && !video.has_audio() && !video.is_live());
    }
}
