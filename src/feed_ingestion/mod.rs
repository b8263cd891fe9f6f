// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Polls third-party traffic feeds and upserts their incidents as canonical events.
//!
//! A poll never fails its caller. Whatever goes wrong is written to the source's `last_error`
//! and the next source, or the next cycle, carries on.

pub mod five_one_one;
pub mod sources;

use crate::errors::FeedPollError;
use crate::traffic_events::{NormalizedEvent, TrafficEventStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sources::{FeedSourceStore, TrafficFeedSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_CONCURRENT_POLLS: usize = 8;

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FeedPollError>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FeedPollError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FeedPollError::Status(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PollReport {
    pub source_name: String,
    pub polled_at: DateTime<Utc>,
    pub ingested: usize,
    pub created: usize,
    pub error: Option<String>,
}

impl PollReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub fn parse_payload(source_type: &str, body: &str) -> Result<Vec<NormalizedEvent>, FeedPollError> {
    match source_type {
        five_one_one::FORMAT_TAG => five_one_one::parse_feed(body),
        other => Err(FeedPollError::UnsupportedFormat(other.to_string())),
    }
}

pub struct FeedIngestionService {
    fetcher: Arc<dyn FeedFetcher>,
    events: Arc<dyn TrafficEventStore>,
    sources: Arc<dyn FeedSourceStore>,
    max_concurrent_polls: usize,
}

impl FeedIngestionService {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        events: Arc<dyn TrafficEventStore>,
        sources: Arc<dyn FeedSourceStore>,
    ) -> Self {
        FeedIngestionService {
            fetcher,
            events,
            sources,
            max_concurrent_polls: DEFAULT_MAX_CONCURRENT_POLLS,
        }
    }

    pub fn with_max_concurrent_polls(mut self, max_concurrent_polls: usize) -> Self {
        self.max_concurrent_polls = max_concurrent_polls.max(1);
        self
    }

    pub async fn poll_feed(&self, source: &TrafficFeedSource) -> PollReport {
        self.poll_feed_at(source, Utc::now()).await
    }

    pub async fn poll_feed_at(&self, source: &TrafficFeedSource, now: DateTime<Utc>) -> PollReport {
        match self.ingest(source, now).await {
            Ok((ingested, created)) => {
                if let Err(e) = self
                    .sources
                    .record_success(&source.name, now, ingested as i64)
                    .await
                {
                    error!(source = %source.name, error = %e, "could not record feed poll success");
                }

                info!(source = %source.name, ingested, created, "feed polled");

                PollReport {
                    source_name: source.name.clone(),
                    polled_at: now,
                    ingested,
                    created,
                    error: None,
                }
            }
            Err(poll_error) => {
                let message = poll_error.to_string();

                warn!(source = %source.name, url = %source.url, error = %message, "feed poll failed");

                if let Err(e) = self
                    .sources
                    .record_failure(&source.name, now, &message)
                    .await
                {
                    error!(source = %source.name, error = %e, "could not record feed poll failure");
                }

                PollReport {
                    source_name: source.name.clone(),
                    polled_at: now,
                    ingested: 0,
                    created: 0,
                    error: Some(message),
                }
            }
        }
    }

    /// Each upsert commits on its own, so a failure midway keeps what was already written.
    async fn ingest(
        &self,
        source: &TrafficFeedSource,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize), FeedPollError> {
        let body = self.fetcher.fetch(&source.url).await?;
        let normalized = parse_payload(&source.source_type, &body)?;

        let mut created = 0;

        for event in &normalized {
            let outcome = self.events.upsert_event(&source.name, event, now).await?;
            if outcome.created {
                created += 1;
            }
        }

        Ok((normalized.len(), created))
    }

    /// Polls every enabled source whose interval has elapsed.
    pub async fn poll_due_sources(&self, now: DateTime<Utc>) -> Vec<PollReport> {
        let sources = match self.sources.list_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                error!(error = %e, "could not list traffic feed sources");
                return vec![];
            }
        };

        let due: Vec<TrafficFeedSource> = sources
            .into_iter()
            .filter(|source| source.is_due(now))
            .collect();

        futures::stream::iter(due.iter().map(|source| self.poll_feed_at(source, now)))
            .buffer_unordered(self.max_concurrent_polls)
            .collect::<Vec<PollReport>>()
            .await
    }
}
