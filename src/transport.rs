//! Http plumbing every other component goes through.

use crate::error::{check_response, Error, ErrorContext, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use http::StatusCode;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
    default_on_request_failure, policies::ExponentialBackoff, RetryTransientMiddleware, Retryable,
    RetryableStrategy,
};
use serde_json::Value;
use std::time::Duration;

/// Tunables of the [`Transport`].
#[derive(Clone, Debug, smart_default::SmartDefault)]
pub struct TransportConfig {
    /// Retries after the initial attempt of a transiently failed request.
    #[default(4)]
    pub max_retries: u32,
    /// First backoff delay; doubles per retry with bounded jitter applied on top.
    #[default(Duration::from_millis(250))]
    pub backoff_base: Duration,
    /// Upper bound a single backoff delay never exceeds.
    #[default(Duration::from_secs(8))]
    pub backoff_cap: Duration,
    /// Deadline of a single http operation.
    #[default(Duration::from_secs(30))]
    pub request_timeout: Duration,
}

/// Decides which outcomes are worth another attempt: network level failures, 5xx and 429.
/// Every other 4xx is the platform telling us something definitive, repeating the request
/// would not change the answer.
struct TransientStrategy;

impl RetryableStrategy for TransientStrategy {
    fn handle(
        &self,
        res: &core::result::Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> Option<Retryable> {
        match res {
            Ok(response)
                if response.status().is_server_error()
                    || response.status() == StatusCode::TOO_MANY_REQUESTS =>
            {
                Some(Retryable::Transient)
            }
            Ok(_) => None,
            Err(error) => default_on_request_failure(error),
        }
    }
}

/// Shared http client. Pools connections, applies the retry policy to transient failures and
/// enforces the per-request deadline. Safe to use from concurrent resolver calls.
#[derive(Clone, Debug)]
pub struct Transport {
    client: ClientWithMiddleware,
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Wrap a preconfigured [`Client`] (e.g. one with a proxy or local address set) with the
    /// retry policy.
    pub fn with_client(client: Client, config: &TransportConfig) -> Self {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(config.backoff_base, config.backoff_cap)
            .build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                retry_policy,
                TransientStrategy,
            ))
            .build();

        Self { client }
    }

    pub(crate) async fn get(&self, url: &str, headers: HeaderMap) -> Result<Bytes> {
        let resp = self.client.get(url).headers(headers).send().await?;
        check_response(url.to_string(), resp).await
    }

    pub(crate) async fn get_text(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let raw = self.get(url, headers).await?;
        String::from_utf8(raw.to_vec()).map_err(|e| {
            Error::Decode(ErrorContext::new(e.to_string()).at(url))
        })
    }

    pub(crate) async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &Value,
    ) -> Result<Bytes> {
        let resp = self
            .client
            .post(url)
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;
        check_response(url.to_string(), resp).await
    }

    /// Issue a bare `HEAD` and report the status the url answers with.
    pub(crate) async fn head(&self, url: &str) -> Result<StatusCode> {
        let resp = self.client.head(url).send().await?;
        Ok(resp.status())
    }

    /// Best effort length probe: `HEAD` first, a ranged `GET` reading the `Content-Range`
    /// total as fallback. Returns [`None`] when neither reveals a length.
    pub(crate) async fn probe_content_length(&self, url: &str) -> Option<u64> {
        if let Ok(resp) = self.client.head(url).send().await {
            if resp.status().is_success() {
                if let Some(length) = header_u64(resp.headers(), CONTENT_LENGTH) {
                    return Some(length);
                }
            }
        }

        let resp = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let total = resp
            .headers()
            .get(CONTENT_RANGE)?
            .to_str()
            .ok()?
            .rsplit('/')
            .next()?
            .parse()
            .ok()?;
        Some(total)
    }

    /// Stream the body of a (optionally ranged) `GET` as it arrives.
    pub(crate) async fn stream(
        &self,
        url: &str,
        range: Option<(u64, Option<u64>)>,
    ) -> Result<impl Stream<Item = Result<Bytes>>> {
        let mut req = self.client.get(url);
        if let Some((start, end)) = range {
            let range_value = match end {
                Some(end) => format!("bytes={start}-{end}"),
                None => format!("bytes={start}-"),
            };
            req = req.header(RANGE, range_value);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Request(
                ErrorContext::new(format!("Request failed with status {status}"))
                    .at(url)
                    .detail(status),
            ));
        }

        Ok(resp.bytes_stream().map(|chunk| chunk.map_err(Error::from)))
    }
}

fn header_u64(headers: &HeaderMap, name: http::header::HeaderName) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}
