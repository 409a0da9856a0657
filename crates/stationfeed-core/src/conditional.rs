//! Conditional re-fetch: probe upstream change indicators before downloading.
//!
//! A HEAD request returns the feed's `ETag` and `Last-Modified`. The body is
//! only fetched when these differ from what the [`ValidatorStore`] holds, or
//! when the feed sends no validator at all.

use reqwest::header::{ETAG, HeaderMap, HeaderName, LAST_MODIFIED};

use crate::sink::Artifact;
use crate::state::ValidatorStore;
use crate::stream::{
    BodyReader, ByteCounter, SHARED_RUNTIME, StreamError, http_client, open_body_reader,
};

/// Opaque upstream change indicator: strong validator and/or timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeIndicator {
    pub validator: Option<String>,
    pub last_modified: Option<String>,
}

impl ChangeIndicator {
    pub fn new(validator: Option<&str>, last_modified: Option<&str>) -> Self {
        Self {
            validator: validator.map(str::to_owned),
            last_modified: last_modified.map(str::to_owned),
        }
    }

    /// Extract `ETag` / `Last-Modified` from response headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            validator: text(ETAG),
            last_modified: text(LAST_MODIFIED),
        }
    }

    /// Freshness test against the stored indicator.
    ///
    /// Without a validator the feed always counts as changed, even when the
    /// stored indicator is equally empty.
    pub fn is_unchanged_from(&self, stored: Option<&ChangeIndicator>) -> bool {
        self.validator.is_some() && stored == Some(self)
    }
}

impl std::fmt::Display for ChangeIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "etag={} last-modified={}",
            self.validator.as_deref().unwrap_or("-"),
            self.last_modified.as_deref().unwrap_or("-")
        )
    }
}

/// Outcome of [`fetch_if_changed`].
///
/// A `Changed` indicator is staged only; the caller commits it to the
/// [`ValidatorStore`] after the downstream pipeline succeeded.
pub enum FetchDecision {
    /// Carries the artifact committed alongside the matching indicator
    Unchanged {
        indicator: ChangeIndicator,
        artifact: Artifact,
    },
    Changed {
        indicator: ChangeIndicator,
        body: BodyReader,
        counter: ByteCounter,
        content_length: Option<u64>,
    },
}

impl FetchDecision {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    pub fn indicator(&self) -> &ChangeIndicator {
        match self {
            Self::Unchanged { indicator, .. } | Self::Changed { indicator, .. } => indicator,
        }
    }
}

impl std::fmt::Debug for FetchDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged {
                indicator,
                artifact,
            } => f
                .debug_struct("Unchanged")
                .field("indicator", indicator)
                .field("artifact", artifact)
                .finish(),
            Self::Changed {
                indicator,
                content_length,
                ..
            } => f
                .debug_struct("Changed")
                .field("indicator", indicator)
                .field("content_length", content_length)
                .finish_non_exhaustive(),
        }
    }
}

/// Metadata-only probe (HEAD) of the feed URL
pub fn probe(url: &str) -> Result<ChangeIndicator, StreamError> {
    let headers = SHARED_RUNTIME.handle().block_on(async {
        http_client()
            .head(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map(|r| r.headers().clone())
            .map_err(|e| StreamError::from_reqwest(&e))
    })?;
    let indicator = ChangeIndicator::from_headers(&headers);
    log::debug!("Probe {url}: {indicator}");
    Ok(indicator)
}

/// Probe the feed and open the body only if it changed since the stored state
pub fn fetch_if_changed(url: &str, store: &ValidatorStore) -> Result<FetchDecision, StreamError> {
    let indicator = probe(url)?;

    if let Some((stored, artifact)) = store.committed() {
        if indicator.is_unchanged_from(Some(stored)) {
            log::info!("Feed unchanged ({indicator}), skipping download");
            return Ok(FetchDecision::Unchanged {
                indicator,
                artifact: artifact.clone(),
            });
        }
    }

    if indicator.validator.is_none() {
        log::info!("Feed sent no validator, treating as changed");
    } else {
        log::info!("Feed changed ({indicator}), downloading");
    }

    let (body, counter, content_length) = open_body_reader(url)?;
    match content_length {
        Some(n) => log::info!("Receiving {n} bytes from {url}"),
        None => log::info!("Receiving body of unknown length from {url}"),
    }

    Ok(FetchDecision::Changed {
        indicator,
        body,
        counter,
        content_length,
    })
}
