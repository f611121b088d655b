use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use regex::Regex;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use tracing::debug;

use crate::{
    common::{HttpClient, StreamError},
    protocol::tracks::Track,
    sources::{
        plugin::{ResolveOptions, SourceError, SourcePlugin},
        stream::AudioStream,
    },
};

/// HTTP/HTTPS Source Plugin
///
/// Handles direct audio stream URLs.
pub struct HttpSource {
    url_regex: Regex,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(connect_timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            url_regex: Regex::new(r"^(?:https?|icy)://")?,
            client: HttpClient::new(connect_timeout)?,
        })
    }

    fn is_valid_content_type(content_type: &str) -> bool {
        content_type.starts_with("audio/")
            || content_type.starts_with("video/")
            || content_type.starts_with("application/octet-stream")
            || content_type.starts_with("application/ogg")
            || content_type.is_empty()
    }

    fn check_status(status: StatusCode) -> Result<(), SourceError> {
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(SourceError::Forbidden(format!("status {}", status.as_u16())))
            }
            StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => {
                Err(SourceError::Restricted(format!("status {}", status.as_u16())))
            }
            s => Err(SourceError::Status(s.as_u16())),
        }
    }
}

#[async_trait]
impl SourcePlugin for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, url: &str) -> bool {
        self.url_regex.is_match(url)
    }

    async fn resolve(
        &self,
        track: &Track,
        options: ResolveOptions,
    ) -> Result<Option<AudioStream>, SourceError> {
        let url = track.prefetch_resolved.as_deref().unwrap_or(&track.url);
        let url = url.replacen("icy://", "http://", 1);
        debug!("Opening http stream: {}", url);

        let response = self.client.get(&url).send().await?;
        Self::check_status(response.status())?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !Self::is_valid_content_type(&content_type) {
            return Err(SourceError::ContentType(content_type));
        }

        let descriptor = response.url().to_string();
        let body = response
            .bytes_stream()
            .map_err(|e| StreamError::transport(e.to_string()));

        Ok(Some(
            AudioStream::new(descriptor, body).with_offset(options.seek_ms.unwrap_or(0)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StreamErrorKind;

    fn source() -> HttpSource {
        HttpSource::new(Duration::from_secs(5)).expect("http source builds")
    }

    #[test]
    fn test_can_handle() {
        let source = source();
        assert!(source.can_handle("https://cdn.test/a.mp3"));
        assert!(source.can_handle("http://radio.test:8000/live"));
        assert!(source.can_handle("icy://radio.test/stream"));
        assert!(!source.can_handle("ytsearch:never gonna"));
        assert!(!source.can_handle("/music/a.flac"));
    }

    #[test]
    fn test_content_types() {
        assert!(HttpSource::is_valid_content_type("audio/mpeg"));
        assert!(HttpSource::is_valid_content_type("video/webm"));
        assert!(HttpSource::is_valid_content_type(""));
        assert!(!HttpSource::is_valid_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn test_status_classification() {
        assert!(HttpSource::check_status(StatusCode::OK).is_ok());
        assert!(HttpSource::check_status(StatusCode::PARTIAL_CONTENT).is_ok());

        let forbidden = HttpSource::check_status(StatusCode::FORBIDDEN).unwrap_err();
        assert_eq!(forbidden.to_stream_error().kind, StreamErrorKind::Forbidden);

        let legal = HttpSource::check_status(StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS).unwrap_err();
        assert_eq!(legal.to_stream_error().kind, StreamErrorKind::Restricted);

        let missing = HttpSource::check_status(StatusCode::NOT_FOUND).unwrap_err();
        assert!(matches!(missing, SourceError::Status(404)));
        assert_eq!(missing.to_stream_error().kind, StreamErrorKind::Unavailable);
    }
}
