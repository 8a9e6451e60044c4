//! Library specific errors.

use crate::video_id::VideoId;
use http::StatusCode;
use reqwest::Response;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

pub(crate) type Result<T, E = Error> = core::result::Result<T, E>;

/// Crate specific error types.
#[derive(Clone, Debug)]
pub enum Error {
    /// Error was caused by something library internal. This only happens if something was
    /// implemented incorrectly (which hopefully should never be the case) or if the platform
    /// surprisingly changed specific parts of their api which broke a part of this crate.
    Internal(ErrorContext),

    /// Generally malformed or invalid caller input, e.g. a video id which fails the
    /// well-formedness check.
    Input(ErrorContext),

    /// Some sort of error occurred while requesting the platform api. Transient failures
    /// (network errors, 5xx, 429) are retried by the transport before this surfaces. Carries
    /// the answering status code as its detail when one was received.
    Request(ErrorContext<StatusCode>),
    /// While decoding an api response body something went wrong.
    Decode(ErrorContext),

    /// Every persona was exhausted without producing a single stream and no more specific
    /// cause was captured along the way.
    VideoUnavailable(ErrorContext),
    /// The platform reports the video as not playable. The context message carries the reason
    /// as reported upstream.
    VideoUnplayable(ErrorContext),
    /// The video is behind a purchase. If the platform exposes a free preview video, its id is
    /// carried as the context detail.
    RequiresPurchase(ErrorContext<VideoId>),
    /// A live stream url was requested for a video which is not a live stream.
    NotLiveStream(ErrorContext),

    /// A stream descriptor carried neither an audio nor a video codec and could not be
    /// normalized.
    CodecExtraction(ErrorContext),
    /// A descrambling snippet exceeded its instruction budget while being evaluated.
    ScriptTimeout(ErrorContext),

    /// The operation was cancelled from the outside.
    Cancelled(ErrorContext),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(context)
            | Error::Input(context)
            | Error::Decode(context)
            | Error::VideoUnavailable(context)
            | Error::VideoUnplayable(context)
            | Error::NotLiveStream(context)
            | Error::CodecExtraction(context)
            | Error::ScriptTimeout(context)
            | Error::Cancelled(context) => Display::fmt(context, f),
            Error::Request(context) => Display::fmt(context, f),
            Error::RequiresPurchase(context) => Display::fmt(context, f),
        }
    }
}

impl StdError for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(ErrorContext::new(err.to_string()))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Decode(ErrorContext::new(err.to_string()))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|url| url.to_string());

        if err.is_decode() {
            let mut context = ErrorContext::new(err.to_string());
            context.url = url;
            Error::Decode(context)
        } else if err.is_builder() {
            Error::Internal(ErrorContext::new(err.to_string()))
        } else {
            // everything else (connect, timeout, redirect, body, status) happened while
            // talking to the platform
            let mut context: ErrorContext<StatusCode> = ErrorContext::new(err.to_string());
            context.url = url;
            context.detail = err.status();
            Error::Request(context)
        }
    }
}

impl From<reqwest_middleware::Error> for Error {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => {
                Error::Request(ErrorContext::new(e.to_string()))
            }
        }
    }
}

/// What went wrong, where, and — depending on the [`Error`] variant — a typed detail such as
/// the http status or a preview video id.
#[derive(Clone, Debug)]
pub struct ErrorContext<T: Clone = ()> {
    pub message: String,
    /// Url the failing operation was talking to, when one was involved.
    pub url: Option<String>,
    /// Short excerpt of the offending payload, for diagnosis.
    pub body: Option<String>,
    pub detail: Option<T>,
}

impl<T: Clone> Display for ErrorContext<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)?;
        if let Some(url) = &self.url {
            write!(f, " ({url})")?;
        }
        if let Some(body) = &self.body {
            write!(f, ": {body}")?;
        }
        Ok(())
    }
}

impl<T: Clone> ErrorContext<T> {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            url: None,
            body: None,
            detail: None,
        }
    }

    pub(crate) fn at(mut self, url: impl AsRef<str>) -> Self {
        self.url = Some(url.as_ref().to_owned());
        self
    }

    /// Keep the first 256 bytes of the offending payload alongside the message.
    pub(crate) fn excerpt(mut self, raw: &[u8]) -> Self {
        let cut = &raw[..raw.len().min(256)];
        self.body = Some(String::from_utf8_lossy(cut).into_owned());
        self
    }

    pub(crate) fn detail(mut self, detail: T) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Check the status of a response and return its body when the platform answered in the 2xx
/// range. Everything else is turned into an [`Error::Request`] carrying the status code, the
/// requested url and a body snippet for diagnosis.
pub(crate) async fn check_response(url: String, resp: Response) -> Result<bytes::Bytes> {
    let status = resp.status();

    match status.as_u16() {
        200..=299 => Ok(resp.bytes().await?),
        429 => {
            let retry_secs = resp
                .headers()
                .get(http::header::RETRY_AFTER)
                .and_then(|retry_after| retry_after.to_str().ok())
                .and_then(|retry_after_secs| retry_after_secs.parse::<u32>().ok());

            Err(Error::Request(
                ErrorContext::new(format!(
                    "Rate limit detected. {}",
                    retry_secs.map_or("Try again later".to_string(), |secs| format!(
                        "Try again in {secs} seconds"
                    ))
                ))
                .at(url)
                .detail(status),
            ))
        }
        _ => {
            let raw = resp.bytes().await.unwrap_or_default();
            Err(Error::Request(
                ErrorContext::new(format!("Request failed with status {status}"))
                    .at(url)
                    .excerpt(&raw)
                    .detail(status),
            ))
        }
    }
}
