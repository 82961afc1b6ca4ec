//! Catalog search against the iTunes Search API.
//!
//! [`CatalogClient::search`] performs exactly one blocking GET. The UI never
//! calls it directly; it goes through [`SearchWorker`], which runs requests on
//! a background thread, and [`SearchTracker`], which drops responses that
//! belong to an older query.

use crate::config::Settings;
use crate::model::Track;
use serde::Deserialize;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Transport failure: DNS, connect, timeout, broken body.
    #[error("network error: {0}")]
    Network(String),

    #[error("catalog returned HTTP {0}")]
    Status(u16),

    #[error("malformed catalog response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

pub struct CatalogClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    limit: u8,
}

impl CatalogClient {
    pub fn new(endpoint: impl Into<String>, limit: u8) -> Result<Self, CatalogError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("chime/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            limit: limit.max(1),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CatalogError> {
        Self::new(settings.search_endpoint.clone(), settings.search_limit)
    }

    pub fn search(&self, query: &str) -> Result<Vec<Track>, CatalogError> {
        let term = query.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(term, endpoint = %self.endpoint, "catalog search");
        let limit = self.limit.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("term", term), ("media", "music"), ("limit", limit.as_str())])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let body = response.text()?;
        let tracks = parse_results(&body)?;
        tracing::debug!(term, count = tracks.len(), "catalog search finished");
        Ok(tracks)
    }
}

/// Parses a search envelope. Records that are not playable tracks (no
/// `trackId` or no preview) are skipped rather than failing the whole page.
pub fn parse_results(body: &str) -> Result<Vec<Track>, CatalogError> {
    let envelope: SearchEnvelope = serde_json::from_str(body)?;
    let tracks = envelope
        .results
        .into_iter()
        .filter_map(|record| serde_json::from_value::<Track>(record).ok())
        .filter(|track| !track.preview_url.is_empty())
        .collect();
    Ok(tracks)
}

pub type Ticket = u64;

#[derive(Debug)]
pub struct SearchOutcome {
    pub ticket: Ticket,
    pub query: String,
    pub result: Result<Vec<Track>, CatalogError>,
}

struct SearchRequest {
    ticket: Ticket,
    query: String,
}

/// Runs searches one at a time on a background thread.
pub struct SearchWorker {
    requests: Sender<SearchRequest>,
    outcomes: Receiver<SearchOutcome>,
    next_ticket: Ticket,
}

impl SearchWorker {
    pub fn spawn(client: CatalogClient) -> anyhow::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<SearchRequest>();
        let (outcome_tx, outcome_rx) = mpsc::channel();

        thread::Builder::new()
            .name(String::from("catalog-search"))
            .spawn(move || {
                for request in request_rx {
                    let result = client.search(&request.query);
                    if let Err(err) = &result {
                        tracing::warn!(query = %request.query, error = %err, "catalog search failed");
                    }
                    let outcome = SearchOutcome {
                        ticket: request.ticket,
                        query: request.query,
                        result,
                    };
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            requests: request_tx,
            outcomes: outcome_rx,
            next_ticket: 0,
        })
    }

    pub fn submit(&mut self, query: &str) -> Ticket {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let request = SearchRequest {
            ticket,
            query: query.to_string(),
        };
        if self.requests.send(request).is_err() {
            tracing::warn!(ticket, "search worker has stopped");
        }
        ticket
    }

    pub fn try_recv(&self) -> Option<SearchOutcome> {
        self.outcomes.try_recv().ok()
    }
}

/// Remembers which search the view is waiting for.
#[derive(Debug, Default)]
pub struct SearchTracker {
    latest: Option<Ticket>,
}

impl SearchTracker {
    pub fn expect(&mut self, ticket: Ticket) {
        self.latest = Some(ticket);
    }

    /// Forget any outstanding search, e.g. when the query was cleared.
    pub fn cancel(&mut self) {
        self.latest = None;
    }

    pub fn is_waiting(&self) -> bool {
        self.latest.is_some()
    }

    /// Returns the outcome only if it answers the latest search.
    pub fn accept(&mut self, outcome: SearchOutcome) -> Option<SearchOutcome> {
        if self.latest != Some(outcome.ticket) {
            tracing::debug!(
                ticket = outcome.ticket,
                query = %outcome.query,
                "discarding stale search response"
            );
            return None;
        }
        self.latest = None;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(ticket: Ticket) -> SearchOutcome {
        SearchOutcome {
            ticket,
            query: format!("q{ticket}"),
            result: Ok(Vec::new()),
        }
    }

    #[test]
    fn parse_skips_unplayable_records() {
        let body = r#"{
            "resultCount": 3,
            "results": [
                {"trackId": 1, "trackName": "a", "previewUrl": "https://a.example/1.m4a"},
                {"wrapperType": "collection", "collectionId": 5},
                {"trackId": 2, "trackName": "b"}
            ]
        }"#;
        let tracks = parse_results(body).expect("parse");
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, 1);
    }

    #[test]
    fn parse_missing_results_is_empty() {
        assert!(parse_results(r#"{"resultCount": 0}"#).expect("parse").is_empty());
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = parse_results("<html>busy</html>").expect_err("should fail");
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn empty_query_skips_network() {
        let client = CatalogClient::new("http://127.0.0.1:9/unreachable", 12).expect("client");
        assert!(client.search("   ").expect("empty").is_empty());
    }

    #[test]
    fn tracker_discards_stale_outcomes() {
        let mut tracker = SearchTracker::default();
        tracker.expect(1);
        tracker.expect(2);

        assert!(tracker.accept(outcome(1)).is_none());
        assert!(tracker.is_waiting());
        assert_eq!(tracker.accept(outcome(2)).map(|o| o.ticket), Some(2));
        assert!(!tracker.is_waiting());
        assert!(tracker.accept(outcome(2)).is_none());
    }

    #[test]
    fn cancelled_tracker_accepts_nothing() {
        let mut tracker = SearchTracker::default();
        tracker.expect(4);
        tracker.cancel();
        assert!(tracker.accept(outcome(4)).is_none());
    }
}
