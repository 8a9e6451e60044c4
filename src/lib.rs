//! # innertube-rs
//!
//! A batteries-included stream manifest resolver for the undocumented
//! [YouTube](https://www.youtube.com/) player api, completely written in Rust.
//!
//! Given a video id (or url) the resolver probes the video through several synthetic client
//! personas, repairs throttled signed urls by evaluating the platform's own descrambling
//! routine, reconciles the per-persona results and hands back a deduplicated manifest of every
//! distinct audio, video, muxed and live rendition — with urls a plain http media client can
//! play directly.
//!
//! The library has some features to ensure a flawless experience in a ⚡🦀 blazingly fast
//! environment.
//! - Full [Tokio](https://tokio.rs/) compatibility.
//! - Automatic retry with exponential backoff on transient platform hiccups.
//! - Fixture-tested parsers for the watch page, player responses and adaptive / live
//!   manifests.
//!
//! # Getting started
//!
//! Everything goes through a [`StreamResolver`]. The default configuration probes the `ios`
//! and `android` personas and falls back to `tvEmbedded` when neither produces streams:
//!
//! ```no_run
//! use innertube_rs::StreamResolver;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let resolver = StreamResolver::new()?;
//! let manifest = resolver.get_manifest("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//!
//! // pick the best muxed rendition
//! let best = manifest
//!     .muxed_streams()
//!     .max_by_key(|stream| stream.bitrate());
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming
//!
//! A resolved [`StreamInfo`] can be turned into its media bytes with
//! [`StreamResolver::get_stream`]:
//!
//! ```no_run
//! # use innertube_rs::StreamResolver;
//! use futures_util::StreamExt;
//!
//! # async fn run(resolver: StreamResolver, stream: &innertube_rs::StreamInfo) -> anyhow::Result<()> {
//! let mut bytes = resolver.get_stream(stream).await?;
//! while let Some(chunk) = bytes.next().await {
//!     let chunk = chunk?;
//!     // write the chunk to a file, a pipe, ...
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Live streams
//!
//! Live videos are delivered as HLS. [`StreamResolver::get_hls_url`] returns the master
//! playlist url straight away, [`StreamResolver::get_manifest`] enumerates the individual
//! live renditions as [`StreamInfo`] variants.
//!
//! # Breakage
//!
//! The platform rotates its player script, payload expectations and url signing continuously.
//! This crate makes no stability promise against such changes; it confines the moving parts
//! (persona payload templates, the descrambling function scan) to single modules and surfaces
//! breakage as clean extraction errors instead of mangled manifests.

pub mod error;
pub mod persona;
pub mod resolver;
pub mod stream;
pub mod transport;

mod cipher;
mod evaluator;
mod macros;
mod parse;
mod player;
mod video_id;

pub use error::{Error, ErrorContext};
pub use evaluator::ScriptEvaluator;
pub use persona::{ClientPersona, PersonaName};
pub use resolver::{StreamResolver, StreamResolverBuilder};
pub use stream::{
    AudioOnlyStream, AudioTrack, Container, Fragment, MuxedStream, Resolution, StreamBase,
    StreamInfo, StreamManifest, VideoOnlyStream, VideoQuality,
};
pub use transport::{Transport, TransportConfig};
pub use video_id::VideoId;
