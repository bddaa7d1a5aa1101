// # Twitter Spaces Integration
//
// This crate provides the Twitter-backed implementations of the
// castwatch trait seams:
//
// - `TwitterSessionSource`: fetches Spaces for the watched creators via
//   `GET /2/spaces/by/creator_ids`, including the creator expansion and
//   the `x-rate-limit-*` response headers
// - `TwitterDeliverySink`: posts one status update via `POST /2/tweets`
//
// Both are single-shot: one API call per invocation, full error
// propagation to the engine (which owns scheduling and implicit retry).
// A fetch that fails after response headers were read still hands the
// rate-limit snapshot back to the scheduler.
//
// ## Security
//
// The bearer token never appears in logs; `Debug` implementations
// redact it.
//
// ## API Reference
//
// - Spaces lookup: GET `/2/spaces/by/creator_ids`
// - Create Tweet: POST `/2/tweets`

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use castwatch_core::error::{Error, Result};
use castwatch_core::traits::{
    Creator, DeliveryReceipt, DeliverySink, FetchFailure, RateLimitSnapshot, SessionBatch,
    SessionSnapshot, SessionSource,
};

/// Twitter API v2 base URL
const TWITTER_API_BASE: &str = "https://api.twitter.com/2";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Space fields requested on every fetch
const SPACE_FIELDS: &str = "id,title,creator_id,state,started_at,scheduled_start,created_at";

/// User fields requested for the creator expansion
const USER_FIELDS: &str = "id,name,username";

/// Public URL of a space
pub fn session_url(space_id: &str) -> String {
    format!("https://twitter.com/i/spaces/{space_id}")
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}

fn check_token(bearer_token: &str) -> Result<()> {
    if bearer_token.is_empty() {
        return Err(Error::config("bearer token cannot be empty"));
    }
    Ok(())
}

/// Parse the `x-rate-limit-*` response headers, if present.
///
/// `reset` is unix seconds. `remaining` and `reset` are required for a
/// usable snapshot; a missing `limit` defaults to zero.
fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    fn header_num<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
        headers.get(name)?.to_str().ok()?.trim().parse().ok()
    }

    let remaining: u32 = header_num(headers, "x-rate-limit-remaining")?;
    let reset_unix: i64 = header_num(headers, "x-rate-limit-reset")?;
    let reset_at = Utc.timestamp_opt(reset_unix, 0).single()?;

    Some(RateLimitSnapshot {
        limit: header_num(headers, "x-rate-limit-limit").unwrap_or(0),
        remaining,
        reset_at,
    })
}

// Wire format of the spaces lookup response

#[derive(Debug, Deserialize)]
struct SpacesResponse {
    #[serde(default)]
    data: Vec<SpaceObject>,
    #[serde(default)]
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct SpaceObject {
    id: String,
    creator_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<UserObject>,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
    name: String,
    username: String,
}

fn build_batch(response: SpacesResponse, rate_limit: Option<RateLimitSnapshot>) -> SessionBatch {
    let sessions = response
        .data
        .into_iter()
        .map(|space| SessionSnapshot {
            url: session_url(&space.id),
            id: space.id,
            creator_id: space.creator_id,
            title: space.title.unwrap_or_default(),
            state: space.state,
            scheduled_start: space.scheduled_start,
            started_at: space.started_at,
            created_at: space.created_at,
        })
        .collect();

    let creators: HashMap<String, Creator> = response
        .includes
        .unwrap_or_default()
        .users
        .into_iter()
        .map(|user| {
            (
                user.id.clone(),
                Creator {
                    id: user.id,
                    name: user.name,
                    username: user.username,
                },
            )
        })
        .collect();

    SessionBatch {
        sessions,
        creators,
        rate_limit,
    }
}

/// Session source backed by the Spaces creator lookup endpoint
pub struct TwitterSessionSource {
    /// API bearer token — never log this value
    bearer_token: String,

    /// Creator account ids to watch
    creator_ids: Vec<String>,

    /// HTTP client for API requests
    client: reqwest::Client,
}

impl std::fmt::Debug for TwitterSessionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterSessionSource")
            .field("bearer_token", &"<REDACTED>")
            .field("creator_ids", &self.creator_ids)
            .finish()
    }
}

impl TwitterSessionSource {
    /// Create a new session source
    ///
    /// # Parameters
    ///
    /// - `bearer_token`: API v2 bearer token
    /// - `creator_ids`: the watched creator account ids (non-empty)
    pub fn new(bearer_token: impl Into<String>, creator_ids: Vec<String>) -> Result<Self> {
        let bearer_token = bearer_token.into();
        check_token(&bearer_token)?;

        if creator_ids.is_empty() {
            return Err(Error::config("at least one watched creator id is required"));
        }

        Ok(Self {
            bearer_token,
            creator_ids,
            client: build_client()?,
        })
    }
}

#[async_trait]
impl SessionSource for TwitterSessionSource {
    async fn fetch_batch(&self) -> std::result::Result<SessionBatch, FetchFailure> {
        let url = format!("{TWITTER_API_BASE}/spaces/by/creator_ids");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("user_ids", self.creator_ids.join(",").as_str()),
                ("expansions", "creator_id"),
                ("space.fields", SPACE_FIELDS),
                ("user.fields", USER_FIELDS),
            ])
            .send()
            .await
            .map_err(|e| FetchFailure::bare(Error::fetch(format!("request failed: {e}"))))?;

        // Headers carry the budget even on error responses.
        let rate_limit = parse_rate_limit(response.headers());

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure {
                rate_limit,
                error: Error::fetch(format!("spaces lookup returned {status}")),
            });
        }

        let body: SpacesResponse = response.json().await.map_err(|e| FetchFailure {
            rate_limit: rate_limit.clone(),
            error: Error::fetch(format!("malformed spaces response: {e}")),
        })?;

        debug!(spaces = body.data.len(), "spaces lookup completed");
        Ok(build_batch(body, rate_limit))
    }

    fn source_name(&self) -> &'static str {
        "twitter-spaces"
    }
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

/// Delivery sink that posts a status update
pub struct TwitterDeliverySink {
    /// API bearer token — never log this value
    bearer_token: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

impl std::fmt::Debug for TwitterDeliverySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterDeliverySink")
            .field("bearer_token", &"<REDACTED>")
            .finish()
    }
}

impl TwitterDeliverySink {
    /// Create a new delivery sink
    pub fn new(bearer_token: impl Into<String>) -> Result<Self> {
        let bearer_token = bearer_token.into();
        check_token(&bearer_token)?;

        Ok(Self {
            bearer_token,
            client: build_client()?,
        })
    }
}

#[async_trait]
impl DeliverySink for TwitterDeliverySink {
    async fn deliver(&self, text: &str) -> Result<DeliveryReceipt> {
        let url = format!("{TWITTER_API_BASE}/tweets");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bearer_token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| Error::delivery(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::delivery(format!("tweet create returned {status}")));
        }

        let body: TweetResponse = response
            .json()
            .await
            .map_err(|e| Error::delivery(format!("malformed tweet response: {e}")))?;

        Ok(DeliveryReceipt::Posted { id: body.data.id })
    }

    fn sink_name(&self) -> &'static str {
        "twitter"
    }
}
