//! Orchestration of personas into a deduplicated stream manifest.

use crate::cipher::{extract_descramble_function, extract_signature_timestamp, NCache};
use crate::error::{Error, ErrorContext, Result};
use crate::evaluator::ScriptEvaluator;
use crate::parse::player::{parse_player_response, PlayerResponse};
use crate::parse::watch_page::WatchPage;
use crate::persona::{ClientPersona, PersonaName, DEFAULT_PERSONAS, FALLBACK_PERSONAS};
use crate::player::PlayerClient;
use crate::stream::{
    muxed_defaults_from_itag, AudioOnlyStream, Container, MuxedStream, Resolution,
    StreamDescriptor, StreamInfo, StreamKey, StreamManifest, StreamSource, VideoOnlyStream,
    VideoQuality, DEFAULT_FRAMERATE,
};
use crate::transport::{Transport, TransportConfig};
use crate::video_id::VideoId;
use bytes::Bytes;
use futures_util::Stream;
use http::StatusCode;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Resolves the stream manifest of a video by probing it through a list of client personas,
/// repairing signed urls and reconciling the per-persona results.
///
/// A resolver is cheap to share: the underlying http client pools its connections and all
/// per-resolution state lives in the call itself, so any number of lookups may run
/// concurrently on one instance.
///
/// ```no_run
/// use innertube_rs::StreamResolver;
///
/// # async fn run() -> anyhow::Result<()> {
/// let resolver = StreamResolver::new()?;
/// let manifest = resolver.get_manifest("dQw4w9WgXcQ").await?;
///
/// for stream in &manifest {
///     println!("itag {}: {} bytes", stream.itag(), stream.size());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StreamResolver {
    transport: Transport,
    evaluator: ScriptEvaluator,
    personas: Vec<PersonaName>,
    explicit_personas: bool,
    require_watch_page: bool,
    deadline: Duration,
    cancel: CancellationToken,
}

impl StreamResolver {
    /// A resolver with the default persona order and timeouts.
    pub fn new() -> Result<Self> {
        StreamResolverBuilder::default().build()
    }

    pub fn builder() -> StreamResolverBuilder {
        StreamResolverBuilder::default()
    }

    /// Resolve the manifest of every distinct rendition available for `video_id`, using the
    /// configured persona order.
    pub async fn get_manifest<S: AsRef<str>>(&self, video_id: S) -> Result<StreamManifest> {
        let video_id = VideoId::new(video_id)?;
        self.with_deadline(self.resolve_manifest(video_id, &self.personas, !self.explicit_personas))
            .await
    }

    /// Like [`StreamResolver::get_manifest`] with an explicit persona order for this one call.
    /// An explicit list is authoritative: the secondary fallback stays disarmed.
    pub async fn get_manifest_with_personas<S: AsRef<str>>(
        &self,
        video_id: S,
        personas: &[PersonaName],
    ) -> Result<StreamManifest> {
        let video_id = VideoId::new(video_id)?;
        self.with_deadline(self.resolve_manifest(video_id, personas, false))
            .await
    }

    /// The url of the live stream manifest of `video_id`. Fails with
    /// [`Error::NotLiveStream`] when the video is not a live stream.
    pub async fn get_hls_url<S: AsRef<str>>(&self, video_id: S) -> Result<String> {
        let video_id = VideoId::new(video_id)?;
        self.with_deadline(self.guard(async {
            let client = PlayerClient::new(&self.transport);
            let page = client.get_watch_page(&video_id).await?;
            let raw = page.player_response().ok_or_else(|| {
                Error::Decode(ErrorContext::new("watch page carries no player response"))
            })?;
            let response = parse_player_response(raw.as_bytes())?;
            classify_playability(&response)?;

            response.hls_manifest_url.ok_or_else(|| {
                Error::NotLiveStream(ErrorContext::new(format!(
                    "'{video_id}' is not a live stream"
                )))
            })
        }))
        .await
    }

    /// Stream the media bytes behind a resolved rendition.
    pub async fn get_stream(
        &self,
        stream: &StreamInfo,
    ) -> Result<impl Stream<Item = Result<Bytes>> + '_> {
        self.transport.stream(stream.url(), None).await
    }

    async fn resolve_manifest(
        &self,
        video_id: VideoId,
        personas: &[PersonaName],
        fallback_armed: bool,
    ) -> Result<StreamManifest> {
        let mut session = ResolveSession::new(video_id);

        self.run_personas(&mut session, personas).await?;
        if session.accumulator.is_empty() && fallback_armed {
            log::debug!(
                "no streams for {} after {:?}, retrying with {:?}",
                session.video_id,
                personas,
                FALLBACK_PERSONAS
            );
            self.run_personas(&mut session, &FALLBACK_PERSONAS).await?;
        }

        if session.accumulator.is_empty() {
            return Err(session.last_error.take().unwrap_or_else(|| {
                Error::VideoUnavailable(ErrorContext::new(format!(
                    "no persona produced any stream for '{}'",
                    session.video_id
                )))
            }));
        }

        Ok(session.accumulator.into_manifest())
    }

    /// Try every persona in order. Persona scoped failures are recorded and the next persona
    /// is tried; only fatal outcomes abort the whole resolution.
    async fn run_personas(
        &self,
        session: &mut ResolveSession,
        personas: &[PersonaName],
    ) -> Result<()> {
        for name in personas {
            let persona = name.persona();
            let mark = session.accumulator.len();

            match self.guard(self.resolve_persona(session, persona)).await {
                Ok(()) => {}
                Err(error) if is_fatal(&error) => return Err(error),
                Err(error) => {
                    session.accumulator.truncate(mark);
                    log::error!(
                        "persona {} failed for {}: {error}",
                        persona.name,
                        session.video_id
                    );
                    session.last_error = Some(error);
                }
            }
        }

        Ok(())
    }

    async fn resolve_persona(
        &self,
        session: &mut ResolveSession,
        persona: &ClientPersona,
    ) -> Result<()> {
        let client = PlayerClient::new(&self.transport);

        if self.require_watch_page || persona.requires_descrambling {
            session.ensure_watch_page(&client).await?;
        }
        let signature_timestamp = if persona.requires_descrambling {
            session.ensure_player_script(&client).await?;
            session.signature_timestamp
        } else {
            None
        };

        let response = client
            .get_player_response(&session.video_id, persona, signature_timestamp)
            .await?;
        classify_playability(&response)?;

        let mark = session.accumulator.len();

        let mut descriptors = response.descriptors;
        if let Some(url) = &response.dash_manifest_url {
            descriptors.extend(client.get_dash_manifest(url).await?);
        }
        if let Some(url) = &response.hls_manifest_url {
            descriptors.extend(client.get_hls_manifest(url).await?);
        }

        for descriptor in descriptors {
            if let Some(info) = self
                .normalize_descriptor(session, &client, descriptor)
                .await?
            {
                session.accumulator.insert(info);
            }
        }

        // One HEAD against the first accumulated url tells whether the persona's signatures
        // are accepted at all; a 403 condemns everything it contributed.
        if session.accumulator.len() > mark {
            if let Some(url) = session.accumulator.first_url().map(str::to_string) {
                let status = self.transport.head(&url).await?;
                if status == StatusCode::FORBIDDEN {
                    return Err(Error::Request(
                        ErrorContext::new(format!(
                            "media server rejected the signatures of persona {}",
                            persona.name
                        ))
                        .at(url)
                        .detail(status),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Repair a descriptor's url, settle its content length and lift it into the normalized
    /// model. [`None`] means the descriptor is silently dropped.
    async fn normalize_descriptor(
        &self,
        session: &mut ResolveSession,
        client: &PlayerClient<'_>,
        descriptor: StreamDescriptor,
    ) -> Result<Option<StreamInfo>> {
        let mut url = Url::parse(&descriptor.url).map_err(|e| {
            Error::Decode(
                ErrorContext::new(format!("invalid stream url: {e}")).at(&descriptor.url),
            )
        })?;

        if let Some(ciphertext) = url
            .query_pairs()
            .find(|(key, _)| key == "n")
            .map(|(_, value)| value.into_owned())
        {
            let plaintext = session
                .descramble(&self.evaluator, client, &ciphertext)
                .await?;
            set_query_param(&mut url, "n", &plaintext);
        }
        if !matches!(descriptor.source, StreamSource::Hls)
            && !url.query_pairs().any(|(key, _)| key == "ratebypass")
        {
            url.query_pairs_mut().append_pair("ratebypass", "yes");
        }

        let size = match descriptor.content_length {
            Some(length) if length > 0 => Some(length),
            _ => self
                .transport
                .probe_content_length(url.as_str())
                .await
                .filter(|length| *length > 0),
        };
        let Some(size) = size else {
            log::debug!(
                "dropping rendition without a positive content length (itag {})",
                descriptor.itag
            );
            return Ok(None);
        };

        if descriptor.audio_codec.is_none() && descriptor.video_codec.is_none() {
            return Err(Error::CodecExtraction(
                ErrorContext::new(format!(
                    "rendition {} carries neither an audio nor a video codec",
                    descriptor.itag
                ))
                .at(url.as_str()),
            ));
        }

        Ok(build_stream_info(
            session.video_id.clone(),
            descriptor,
            url.to_string(),
            size,
        ))
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Request(ErrorContext::new(format!(
                "resolution did not finish within its {:?} deadline",
                self.deadline
            )))),
        }
    }

    async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled(ErrorContext::new(
                "resolution cancelled",
            ))),
            result = fut => result,
        }
    }
}

/// A builder to construct a new [`StreamResolver`] instance. To create it, call
/// [`StreamResolver::builder`].
pub struct StreamResolverBuilder {
    client: Option<reqwest::Client>,
    transport_config: TransportConfig,
    personas: Option<Vec<PersonaName>>,
    require_watch_page: bool,
    deadline: Duration,
    instruction_budget: u64,
    cancellation_token: CancellationToken,
}

impl Default for StreamResolverBuilder {
    fn default() -> Self {
        Self {
            client: None,
            transport_config: TransportConfig::default(),
            personas: None,
            require_watch_page: true,
            deadline: Duration::from_secs(60),
            instruction_budget: 100_000,
            cancellation_token: CancellationToken::new(),
        }
    }
}

impl StreamResolverBuilder {
    /// Set a custom [`reqwest::Client`] (e.g. one with a proxy or a pinned local address) that
    /// will be used for all requests. The retry policy is layered on top either way.
    pub fn client(mut self, client: reqwest::Client) -> StreamResolverBuilder {
        self.client = Some(client);
        self
    }

    /// Tune retry and per-request timeout behavior.
    pub fn transport_config(mut self, config: TransportConfig) -> StreamResolverBuilder {
        self.transport_config = config;
        self
    }

    /// Set the persona order used by [`StreamResolver::get_manifest`]. Setting an explicit
    /// order disarms the secondary fallback.
    pub fn personas(mut self, personas: Vec<PersonaName>) -> StreamResolverBuilder {
        self.personas = Some(personas);
        self
    }

    /// Whether the watch page is fetched up front for every persona instead of lazily on the
    /// first url which needs descrambling.
    pub fn require_watch_page(mut self, require: bool) -> StreamResolverBuilder {
        self.require_watch_page = require;
        self
    }

    /// Overall deadline of a single resolution.
    pub fn deadline(mut self, deadline: Duration) -> StreamResolverBuilder {
        self.deadline = deadline;
        self
    }

    /// Budget of the script evaluator running descrambling snippets.
    pub fn instruction_budget(mut self, budget: u64) -> StreamResolverBuilder {
        self.instruction_budget = budget;
        self
    }

    /// Attach an external cancellation signal. Cancelling it aborts in-flight resolutions at
    /// their next suspension point with [`Error::Cancelled`].
    pub fn cancellation_token(mut self, token: CancellationToken) -> StreamResolverBuilder {
        self.cancellation_token = token;
        self
    }

    pub fn build(self) -> Result<StreamResolver> {
        let transport = match self.client {
            Some(client) => Transport::with_client(client, &self.transport_config),
            None => Transport::new(&self.transport_config)?,
        };

        Ok(StreamResolver {
            transport,
            evaluator: ScriptEvaluator::new(self.instruction_budget),
            explicit_personas: self.personas.is_some(),
            personas: self
                .personas
                .unwrap_or_else(|| DEFAULT_PERSONAS.to_vec()),
            require_watch_page: self.require_watch_page,
            deadline: self.deadline,
            cancel: self.cancellation_token,
        })
    }
}

/// State owned by one resolution call: the watch page, the extracted descrambling routine,
/// the ciphertext cache and the deduplicating accumulator. Dropped as a whole when the call
/// returns, nothing is shared across calls.
struct ResolveSession {
    video_id: VideoId,
    watch_page: Option<WatchPage>,
    descramble_fn: Option<String>,
    signature_timestamp: Option<u64>,
    n_cache: NCache,
    accumulator: Accumulator,
    last_error: Option<Error>,
}

impl ResolveSession {
    fn new(video_id: VideoId) -> Self {
        Self {
            video_id,
            watch_page: None,
            descramble_fn: None,
            signature_timestamp: None,
            n_cache: NCache::default(),
            accumulator: Accumulator::default(),
            last_error: None,
        }
    }

    async fn ensure_watch_page(&mut self, client: &PlayerClient<'_>) -> Result<()> {
        if self.watch_page.is_none() {
            let page = client.get_watch_page(&self.video_id).await?;
            if let Some(echoed) = page.video_id() {
                if echoed != self.video_id.as_str() {
                    // a consent or region interstitial echoes a different id
                    log::warn!(
                        "watch page for {} echoes video id {echoed}",
                        self.video_id
                    );
                }
            }
            self.watch_page = Some(page);
        }
        Ok(())
    }

    /// Fetch the base player script and extract the descrambling routine plus the signature
    /// timestamp from it. Cached for the rest of the call.
    async fn ensure_player_script(&mut self, client: &PlayerClient<'_>) -> Result<()> {
        if self.descramble_fn.is_some() {
            return Ok(());
        }

        self.ensure_watch_page(client).await?;
        let script_url = self
            .watch_page
            .as_ref()
            .and_then(|page| page.player_script_url())
            .ok_or_else(|| {
                Error::Decode(ErrorContext::new(
                    "watch page carries no base player script url",
                ))
            })?;

        let player_js = client.get_player_script(&script_url).await?;
        self.signature_timestamp = extract_signature_timestamp(&player_js);
        self.descramble_fn = Some(extract_descramble_function(&player_js)?);
        Ok(())
    }

    async fn descramble(
        &mut self,
        evaluator: &ScriptEvaluator,
        client: &PlayerClient<'_>,
        ciphertext: &str,
    ) -> Result<String> {
        self.ensure_player_script(client).await?;
        let source = self.descramble_fn.as_deref().ok_or_else(|| {
            Error::Internal(ErrorContext::new("descrambling routine missing after load"))
        })?;
        self.n_cache.resolve(evaluator, source, ciphertext)
    }
}

/// Insertion ordered set of streams, deduplicated by [`StreamInfo::key`].
#[derive(Default)]
struct Accumulator {
    streams: Vec<StreamInfo>,
    keys: HashSet<StreamKey>,
}

impl Accumulator {
    fn insert(&mut self, info: StreamInfo) -> bool {
        if self.keys.insert(info.key()) {
            self.streams.push(info);
            true
        } else {
            false
        }
    }

    fn len(&self) -> usize {
        self.streams.len()
    }

    fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Drop everything inserted after the first `len` entries.
    fn truncate(&mut self, len: usize) {
        while self.streams.len() > len {
            if let Some(info) = self.streams.pop() {
                self.keys.remove(&info.key());
            }
        }
    }

    fn first_url(&self) -> Option<&str> {
        self.streams.first().map(|info| info.url())
    }

    fn into_manifest(self) -> StreamManifest {
        StreamManifest::new(self.streams)
    }
}

fn is_fatal(error: &Error) -> bool {
    matches!(
        error,
        Error::RequiresPurchase(_) | Error::Cancelled(_) | Error::Input(_)
    )
}

/// The three outcomes which make further personas pointless or the call itself fail: a paid
/// preview, a "payment required" reason and a plain unplayable report. The latter is persona
/// scoped (another persona may well succeed, e.g. on age restricted videos), the former two
/// are fatal.
fn classify_playability(response: &PlayerResponse) -> Result<()> {
    if let Some(preview) = &response.preview_video_id {
        let mut context = ErrorContext::new("the video requires a purchase to be watched");
        if let Ok(preview) = VideoId::new(preview) {
            context = context.detail(preview);
        }
        return Err(Error::RequiresPurchase(context));
    }

    if let Some(reason) = &response.playability_error {
        if reason.to_ascii_lowercase().contains("payment") {
            return Err(Error::RequiresPurchase(ErrorContext::new(reason.clone())));
        }
    }

    if !response.is_playable {
        let reason = response
            .playability_error
            .clone()
            .unwrap_or_else(|| "the platform reports this video as not playable".to_string());
        return Err(Error::VideoUnplayable(ErrorContext::new(reason)));
    }

    Ok(())
}

/// Pure tail of the normalization: pick the variant shape and derive quality, resolution and
/// framerate. [`None`] when a video bearing descriptor lacks everything a quality could be
/// derived from.
fn build_stream_info(
    video_id: VideoId,
    descriptor: StreamDescriptor,
    url: String,
    size: u64,
) -> Option<StreamInfo> {
    let container = if descriptor.container == Container::default() {
        muxed_defaults_from_itag(descriptor.itag)
            .map(|(container, _)| container)
            .unwrap_or_default()
    } else {
        descriptor.container.clone()
    };

    let base = crate::stream::StreamBase {
        video_id,
        itag: descriptor.itag,
        url,
        container,
        size,
        bitrate: descriptor.bitrate,
    };

    let audio_shaped = descriptor.audio_only
        || (descriptor.video_codec.is_none() && descriptor.audio_codec.is_some());

    let info = match descriptor.source {
        StreamSource::Hls if audio_shaped => StreamInfo::HlsAudio(AudioOnlyStream {
            base,
            audio_codec: descriptor.audio_codec?,
            audio_track: descriptor.audio_track,
            fragments: descriptor.fragments,
        }),
        StreamSource::Hls if descriptor.video_only => {
            let (quality_label, quality, resolution, framerate) = video_fields(&descriptor)?;
            StreamInfo::HlsVideoOnly(VideoOnlyStream {
                base,
                video_codec: descriptor.video_codec?,
                quality_label,
                quality,
                resolution,
                framerate,
                fragments: descriptor.fragments,
            })
        }
        StreamSource::Hls => {
            let (quality_label, quality, resolution, framerate) = video_fields(&descriptor)?;
            StreamInfo::HlsMuxed(MuxedStream {
                base,
                video_codec: descriptor.video_codec?,
                audio_codec: descriptor.audio_codec?,
                quality_label,
                quality,
                resolution,
                framerate,
            })
        }
        StreamSource::Progressive
            if descriptor.video_codec.is_some() && descriptor.audio_codec.is_some() =>
        {
            let (quality_label, quality, resolution, framerate) = video_fields(&descriptor)?;
            StreamInfo::MuxedProgressive(MuxedStream {
                base,
                video_codec: descriptor.video_codec?,
                audio_codec: descriptor.audio_codec?,
                quality_label,
                quality,
                resolution,
                framerate,
            })
        }
        _ if audio_shaped => StreamInfo::AudioOnlyAdaptive(AudioOnlyStream {
            base,
            audio_codec: descriptor.audio_codec?,
            audio_track: descriptor.audio_track,
            fragments: descriptor.fragments,
        }),
        _ => {
            let (quality_label, quality, resolution, framerate) = video_fields(&descriptor)?;
            StreamInfo::VideoOnlyAdaptive(VideoOnlyStream {
                base,
                video_codec: descriptor.video_codec?,
                quality_label,
                quality,
                resolution,
                framerate,
                fragments: descriptor.fragments,
            })
        }
    };

    Some(info)
}

fn video_fields(descriptor: &StreamDescriptor) -> Option<(String, VideoQuality, Resolution, f64)> {
    let label = descriptor
        .quality_label
        .clone()
        .or_else(|| descriptor.height.map(|height| format!("{height}p")))
        .or_else(|| {
            muxed_defaults_from_itag(descriptor.itag)
                .map(|(_, quality)| quality.label().to_string())
        })?;
    let quality = VideoQuality::from_label(&label)
        .or_else(|| muxed_defaults_from_itag(descriptor.itag).map(|(_, quality)| quality))?;

    let resolution = match (descriptor.width, descriptor.height) {
        (Some(width), Some(height)) => Resolution { width, height },
        _ => quality.canonical_resolution(),
    };

    Some((
        label,
        quality,
        resolution,
        descriptor.framerate.unwrap_or(DEFAULT_FRAMERATE),
    ))
}

/// Replace the value of a query parameter in place, preserving the order of all others.
fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, val)| (key.into_owned(), val.into_owned()))
        .collect();

    let mut mutator = url.query_pairs_mut();
    mutator.clear();
    for (key, val) in pairs {
        if key == name {
            mutator.append_pair(&key, value);
        } else {
            mutator.append_pair(&key, &val);
        }
    }
    drop(mutator);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::AudioTrack;

    fn video_id() -> VideoId {
        VideoId::new("dQw4w9WgXcQ").unwrap()
    }

    fn descriptor(itag: u64) -> StreamDescriptor {
        StreamDescriptor {
            itag,
            url: format!("https://rr1.example/videoplayback?itag={itag}"),
            container: Container::Mp4,
            audio_codec: Some("mp4a.40.2".to_string()),
            video_codec: Some("avc1.42001E".to_string()),
            bitrate: 635_291,
            content_length: Some(5_242_880),
            width: Some(640),
            height: Some(360),
            quality_label: Some("360p".to_string()),
            framerate: Some(24.0),
            fragments: vec![],
            source: StreamSource::Progressive,
            audio_only: false,
            video_only: false,
            audio_track: None,
        }
    }

    #[test]
    fn progressive_with_both_codecs_becomes_muxed() {
        let info = build_stream_info(video_id(), descriptor(18), "https://u".into(), 1).unwrap();
        match info {
            StreamInfo::MuxedProgressive(muxed) => {
                assert_eq!(muxed.quality, VideoQuality::P360);
                assert_eq!(muxed.resolution.width, 640);
                assert_eq!(muxed.framerate, 24.0);
            }
            other => panic!("expected muxed progressive, got {other:?}"),
        }
    }

    #[test]
    fn adaptive_splits_by_media_kind() {
        let mut video = descriptor(248);
        video.source = StreamSource::Adaptive;
        video.audio_codec = None;
        video.video_only = true;
        video.quality_label = Some("1080p".to_string());
        video.width = Some(1920);
        video.height = Some(1080);
        let info = build_stream_info(video_id(), video, "https://u".into(), 1).unwrap();
        assert!(matches!(info, StreamInfo::VideoOnlyAdaptive(_)));

        let mut audio = descriptor(140);
        audio.source = StreamSource::Adaptive;
        audio.video_codec = None;
        audio.audio_only = true;
        audio.audio_track = Some(AudioTrack {
            language: "German".to_string(),
            id: "de-DE.3".to_string(),
            is_default: false,
        });
        let info = build_stream_info(video_id(), audio, "https://u".into(), 1).unwrap();
        match info {
            StreamInfo::AudioOnlyAdaptive(audio) => {
                assert_eq!(audio.audio_track.unwrap().id, "de-DE.3")
            }
            other => panic!("expected audio only, got {other:?}"),
        }
    }

    #[test]
    fn hls_variants_split_by_flags() {
        let mut muxed = descriptor(93);
        muxed.source = StreamSource::Hls;
        muxed.quality_label = None;
        let info = build_stream_info(video_id(), muxed, "https://u".into(), 1).unwrap();
        match &info {
            StreamInfo::HlsMuxed(stream) => {
                // label derived from the descriptor height
                assert_eq!(stream.quality_label, "360p");
            }
            other => panic!("expected hls muxed, got {other:?}"),
        }
        assert!(info.is_live());

        let mut audio = descriptor(233);
        audio.source = StreamSource::Hls;
        audio.video_codec = None;
        audio.audio_only = true;
        let info = build_stream_info(video_id(), audio, "https://u".into(), 1).unwrap();
        assert!(matches!(info, StreamInfo::HlsAudio(_)));

        let mut video = descriptor(301);
        video.source = StreamSource::Hls;
        video.audio_codec = None;
        video.video_only = true;
        let info = build_stream_info(video_id(), video, "https://u".into(), 1).unwrap();
        assert!(matches!(info, StreamInfo::HlsVideoOnly(_)));
    }

    #[test]
    fn classic_itags_fill_missing_quality_and_container() {
        let mut classic = descriptor(22);
        classic.quality_label = None;
        classic.width = None;
        classic.height = None;
        classic.container = Container::default();
        let info = build_stream_info(video_id(), classic, "https://u".into(), 1).unwrap();
        match info {
            StreamInfo::MuxedProgressive(muxed) => {
                assert_eq!(muxed.quality, VideoQuality::P720);
                assert_eq!(muxed.base.container, Container::Mp4);
                assert_eq!(muxed.resolution, VideoQuality::P720.canonical_resolution());
            }
            other => panic!("expected muxed progressive, got {other:?}"),
        }
    }

    #[test]
    fn underivable_video_quality_drops_the_descriptor() {
        let mut odd = descriptor(999);
        odd.quality_label = None;
        odd.width = None;
        odd.height = None;
        assert!(build_stream_info(video_id(), odd, "https://u".into(), 1).is_none());
    }

    #[test]
    fn framerate_defaults_when_unreported() {
        let mut unreported = descriptor(18);
        unreported.framerate = None;
        let info = build_stream_info(video_id(), unreported, "https://u".into(), 1).unwrap();
        match info {
            StreamInfo::MuxedProgressive(muxed) => assert_eq!(muxed.framerate, DEFAULT_FRAMERATE),
            other => panic!("expected muxed progressive, got {other:?}"),
        }
    }

    #[test]
    fn accumulator_deduplicates_and_preserves_order() {
        let mut accumulator = Accumulator::default();

        let first = build_stream_info(video_id(), descriptor(18), "https://a".into(), 1).unwrap();
        let duplicate =
            build_stream_info(video_id(), descriptor(18), "https://b".into(), 1).unwrap();
        let second = build_stream_info(video_id(), descriptor(22), "https://c".into(), 1).unwrap();

        assert!(accumulator.insert(first));
        assert!(!accumulator.insert(duplicate));
        assert!(accumulator.insert(second));

        assert_eq!(accumulator.len(), 2);
        assert_eq!(accumulator.first_url(), Some("https://a"));

        let manifest = accumulator.into_manifest();
        let itags: Vec<u64> = manifest.iter().map(|stream| stream.itag()).collect();
        assert_eq!(itags, vec![18, 22]);
    }

    #[test]
    fn accumulator_rollback_reopens_the_keys() {
        let mut accumulator = Accumulator::default();
        let info = build_stream_info(video_id(), descriptor(18), "https://a".into(), 1).unwrap();
        accumulator.insert(info.clone());

        let mark = accumulator.len();
        let late = build_stream_info(video_id(), descriptor(22), "https://b".into(), 1).unwrap();
        accumulator.insert(late.clone());
        accumulator.truncate(mark);

        assert_eq!(accumulator.len(), 1);
        assert!(accumulator.insert(late));
    }

    #[test]
    fn purchase_preview_is_fatal() {
        let response = PlayerResponse {
            preview_video_id: Some("abc12345678".to_string()),
            ..Default::default()
        };
        match classify_playability(&response) {
            Err(Error::RequiresPurchase(context)) => {
                assert_eq!(context.detail.unwrap().as_str(), "abc12345678")
            }
            other => panic!("expected requires purchase, got {other:?}"),
        }
    }

    #[test]
    fn payment_reason_is_fatal() {
        let response = PlayerResponse {
            is_playable: false,
            playability_error: Some("This video requires payment to watch.".to_string()),
            ..Default::default()
        };
        let error = classify_playability(&response).unwrap_err();
        assert!(matches!(error, Error::RequiresPurchase(_)));
        assert!(is_fatal(&error));
    }

    #[test]
    fn unplayable_is_persona_scoped() {
        let response = PlayerResponse {
            is_playable: false,
            playability_error: Some("Sign in to confirm your age".to_string()),
            ..Default::default()
        };
        let error = classify_playability(&response).unwrap_err();
        assert!(matches!(error, Error::VideoUnplayable(_)));
        assert!(!is_fatal(&error));
    }

    #[test]
    fn playable_responses_pass() {
        let response = PlayerResponse {
            is_playable: true,
            ..Default::default()
        };
        assert!(classify_playability(&response).is_ok());
    }

    #[test]
    fn query_param_replacement_keeps_the_rest() {
        let mut url =
            Url::parse("https://rr1.example/videoplayback?itag=18&n=SCRAMBLED&sig=AAA").unwrap();
        set_query_param(&mut url, "n", "plain");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("itag".to_string(), "18".to_string()),
                ("n".to_string(), "plain".to_string()),
                ("sig".to_string(), "AAA".to_string()),
            ]
        );
    }

    #[test]
    fn builder_defaults() {
        let resolver = StreamResolver::new().unwrap();
        assert_eq!(resolver.personas, DEFAULT_PERSONAS.to_vec());
        assert!(!resolver.explicit_personas);
        assert!(resolver.require_watch_page);
        assert_eq!(resolver.deadline, Duration::from_secs(60));
    }

    #[test]
    fn explicit_personas_disarm_the_fallback() {
        let resolver = StreamResolver::builder()
            .personas(vec![PersonaName::Web])
            .build()
            .unwrap();
        assert!(resolver.explicit_personas);
        assert_eq!(resolver.personas, vec![PersonaName::Web]);
    }

    /// Runs a captured player response through every offline stage of a resolution: parse,
    /// playability classification, url repair with the captured player script, normalization
    /// and accumulation.
    fn resolve_fixture() -> (StreamManifest, usize) {
        let raw = include_bytes!("../tests/fixtures/player_response.json");
        let player_js = include_str!("../tests/fixtures/base_player.js");

        let response = parse_player_response(raw).unwrap();
        classify_playability(&response).unwrap();

        let descramble_fn = extract_descramble_function(player_js).unwrap();
        let evaluator = ScriptEvaluator::default();
        let mut n_cache = NCache::default();
        let mut accumulator = Accumulator::default();

        for descriptor in response.descriptors {
            let mut url = Url::parse(&descriptor.url).unwrap();
            let ciphertext = url
                .query_pairs()
                .find(|(key, _)| key == "n")
                .map(|(_, value)| value.into_owned());
            if let Some(ciphertext) = &ciphertext {
                let plaintext = n_cache
                    .resolve(&evaluator, &descramble_fn, ciphertext)
                    .unwrap();
                assert_ne!(&plaintext, ciphertext);
                set_query_param(&mut url, "n", &plaintext);
            }

            let size = descriptor.content_length.unwrap();
            if let Some(info) = build_stream_info(video_id(), descriptor, url.to_string(), size)
            {
                accumulator.insert(info);
            }
        }

        (accumulator.into_manifest(), n_cache.len())
    }

    #[test]
    fn fixture_response_resolves_to_a_valid_manifest() {
        let (manifest, distinct_ciphertexts) = resolve_fixture();

        assert_eq!(manifest.len(), 5);
        // every rendition of the capture shares one ciphertext, one evaluation serves all
        assert_eq!(distinct_ciphertexts, 1);

        let mut keys = std::collections::HashSet::new();
        for stream in &manifest {
            assert!(stream.size() > 0, "itag {} has no size", stream.itag());
            assert!(keys.insert(stream.key()), "duplicate key for {}", stream.itag());

            let url = Url::parse(stream.url()).unwrap();
            let n = url
                .query_pairs()
                .find(|(key, _)| key == "n")
                .map(|(_, value)| value.into_owned())
                .expect("repaired urls keep their n parameter");
            assert_ne!(n, "Rmlyc3RDaXBoZXI", "itag {} kept the ciphertext", stream.itag());
        }

        assert_eq!(manifest.muxed_streams().count(), 2);
        assert_eq!(manifest.video_only_streams().count(), 1);
        assert_eq!(manifest.audio_only_streams().count(), 2);
        assert_eq!(manifest.live_streams().count(), 0);
    }

    #[test]
    fn fixture_resolution_is_idempotent() {
        let (first, _) = resolve_fixture();
        let (second, _) = resolve_fixture();

        let snapshot = |manifest: &StreamManifest| -> Vec<(u64, String, u64)> {
            manifest
                .iter()
                .map(|stream| (stream.itag(), stream.url().to_string(), stream.size()))
                .collect()
        };
        assert_eq!(snapshot(&first), snapshot(&second));
    }

    #[test]
    fn live_fixture_yields_an_hls_only_manifest() {
        let raw = include_bytes!("../tests/fixtures/master.m3u8");
        let descriptors = crate::parse::hls::parse_hls_master(raw).unwrap();
        assert!(!descriptors.is_empty());

        let mut accumulator = Accumulator::default();
        for descriptor in descriptors {
            let url = descriptor.url.clone();
            // live playlist documents answer length probes with their own document size
            if let Some(info) = build_stream_info(video_id(), descriptor, url, 1_464) {
                accumulator.insert(info);
            }
        }

        let manifest = accumulator.into_manifest();
        assert!(!manifest.is_empty());
        assert_eq!(manifest.live_streams().count(), manifest.len());
        assert!(manifest.iter().all(|stream| stream.is_live()));
    }
}
