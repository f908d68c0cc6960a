//! TikTok Research API client implementation.
//!
//! Handles the client-credentials grant and the research endpoints. Every
//! call is sequential and counted so the run can be logged against the
//! daily quota.

use crate::config::{Config, Credentials};
use crate::error::ExtractorError;
use crate::tiktok::models::{
    AccessToken, ApiResponse, ListPage, MAX_PER_REQUEST, PROFILE_FIELDS, Record, RelatedResource,
    TokenResponse, VIDEO_FIELDS, VideoQuery,
};
use chrono::{Days, NaiveDate, Utc};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const TOKEN_ENDPOINT: &str = "/v2/oauth/token/";
const USER_INFO_ENDPOINT: &str = "/v2/research/user/info/";
const VIDEO_QUERY_ENDPOINT: &str = "/v2/research/video/query/";

/// Longest span, in days, between `start_date` and `end_date` of one video query.
pub const MAX_WINDOW_DAYS: u64 = 30;

/// Upper bound on how far back a video search may reach.
pub const MAX_DAYS_BACK: u64 = 3650;

/// TikTok Research API client.
#[derive(Debug)]
pub struct ResearchClient {
    /// HTTP client for API requests
    client: Client,
    /// API host, without trailing slash
    base_url: String,
    /// Pause before every request after the first
    request_delay: Duration,
    /// Requests issued so far, failed ones included
    request_count: AtomicU32,
}

impl ResearchClient {
    /// Create a new research client from configuration.
    pub fn new(config: &Config) -> Result<Self, ExtractorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_delay: Duration::from_millis(config.request_delay_ms),
            request_count: AtomicU32::new(0),
        })
    }

    /// Number of HTTP requests issued by this client.
    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Sleep between consecutive requests and count the one about to go out.
    async fn begin_request(&self) {
        if self.request_count() > 0 && !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Obtain an access token via the client-credentials grant.
    ///
    /// # Details
    /// TikTok answers bad credentials with HTTP 200 and an `error` body, so
    /// a response without a non-empty `access_token` is an auth failure too.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<AccessToken, ExtractorError> {
        if credentials.client_key.is_empty() || credentials.client_secret.is_empty() {
            return Err(ExtractorError::Auth(
                "client key and secret must not be empty".to_string(),
            ));
        }

        let url = format!("{}{}", self.base_url, TOKEN_ENDPOINT);
        let form = [
            ("client_key", credentials.client_key.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        self.begin_request().await;
        let response = self.client.post(&url).form(&form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, "Token request rejected");
            return Err(ExtractorError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ExtractorError::Decode(format!("token response: {e}")))?;

        let error = token_response.error.clone();
        let description = token_response.error_description.clone();
        match token_response.into_token(Utc::now()) {
            Some(token) => {
                info!(expires_at = %token.expires_at(), "Token obtained");
                Ok(token)
            }
            None => {
                let reason = description
                    .or(error)
                    .unwrap_or_else(|| "no access_token in response".to_string());
                warn!(%reason, "Token request rejected");
                Err(ExtractorError::Auth(reason))
            }
        }
    }

    /// POST to a research endpoint and unwrap the `data` member.
    async fn post<T, B>(
        &self,
        token: &AccessToken,
        endpoint: &str,
        fields: &str,
        body: &B,
    ) -> Result<T, ExtractorError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        if token.is_expired() {
            return Err(ExtractorError::Auth("access token expired".to_string()));
        }

        let url = format!("{}{}", self.base_url, endpoint);

        self.begin_request().await;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token.as_str())
            .query(&[("fields", fields)])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let envelope: Option<ApiResponse<Value>> = serde_json::from_str(&text).ok();

        let api_error = envelope
            .as_ref()
            .and_then(|e| e.error.as_ref())
            .filter(|e| !e.is_ok());

        if !status.is_success() || api_error.is_some() {
            let (code, message, log_id) = match api_error {
                Some(e) => (e.code.as_str(), e.message.as_str(), e.log_id.as_str()),
                None => ("", text.as_str(), ""),
            };
            warn!(%status, code, log_id, endpoint, "Request failed: {message}");
            return Err(ExtractorError::from_api(status, code, message));
        }

        let data = envelope
            .and_then(|e| e.data)
            .ok_or_else(|| ExtractorError::Decode(format!("{endpoint} returned no data")))?;

        serde_json::from_value(data).map_err(|e| ExtractorError::Decode(format!("{endpoint}: {e}")))
    }

    /// Fetch a user's public profile.
    ///
    /// # Details
    /// An empty `data` object is treated as an unknown user.
    pub async fn fetch_profile(
        &self,
        token: &AccessToken,
        username: &str,
    ) -> Result<Record, ExtractorError> {
        let body = json!({ "username": username });
        let profile: Record = self
            .post(token, USER_INFO_ENDPOINT, PROFILE_FIELDS, &body)
            .await?;

        if profile.is_empty() {
            return Err(ExtractorError::NotFound(format!("user {username}")));
        }

        info!(username, "Profile fetched");
        Ok(profile)
    }

    /// Fetch up to `max_videos` videos posted in the last `days_back` days.
    ///
    /// # Details
    /// The window is split into 30-day query windows, newest first. Each
    /// window is paged through with `cursor`/`search_id` until the API
    /// reports no more results or enough videos were collected.
    pub async fn fetch_videos(
        &self,
        token: &AccessToken,
        username: &str,
        max_videos: usize,
        days_back: u64,
    ) -> Result<Vec<Record>, ExtractorError> {
        let mut videos: Vec<Record> = Vec::new();
        if max_videos == 0 {
            return Ok(videos);
        }

        let query = json!({
            "and": [{
                "operation": "EQ",
                "field_name": "username",
                "field_values": [username],
            }]
        });

        let days_back = days_back.min(MAX_DAYS_BACK);
        for (start, end) in date_windows(Utc::now().date_naive(), days_back) {
            let mut cursor: Option<Value> = None;
            let mut search_id: Option<String> = None;

            loop {
                let remaining = max_videos - videos.len();
                let mut page: ListPage = {
                    let body = VideoQuery {
                        query: query.clone(),
                        start_date: start.format("%Y%m%d").to_string(),
                        end_date: end.format("%Y%m%d").to_string(),
                        max_count: remaining.min(MAX_PER_REQUEST),
                        cursor: cursor.as_ref(),
                        search_id: search_id.as_deref(),
                    };
                    self.post(token, VIDEO_QUERY_ENDPOINT, VIDEO_FIELDS, &body)
                        .await?
                };

                let batch = page.take_records("videos");
                let fetched = batch.len();
                videos.extend(batch);
                debug!(%start, %end, fetched, total = videos.len(), "Video page");

                if videos.len() >= max_videos {
                    videos.truncate(max_videos);
                    info!(username, count = videos.len(), "Videos fetched");
                    return Ok(videos);
                }

                if !page.has_more {
                    break;
                }
                // A page may be empty while more remain; only a stuck cursor ends the window.
                match page.cursor.take() {
                    Some(next) if cursor.as_ref() != Some(&next) => cursor = Some(next),
                    _ => {
                        warn!(%start, %end, "Video cursor did not advance, skipping rest of window");
                        break;
                    }
                }
                if page.search_id.is_some() {
                    search_id = page.search_id.take();
                }
            }
        }

        info!(username, count = videos.len(), "Videos fetched");
        Ok(videos)
    }

    /// Fetch up to `max_count` records of a related resource.
    ///
    /// # Arguments
    /// * `target` - Video id for comments, username for every other kind
    pub async fn fetch_related(
        &self,
        token: &AccessToken,
        target: &str,
        kind: RelatedResource,
        max_count: usize,
    ) -> Result<Vec<Record>, ExtractorError> {
        let mut records: Vec<Record> = Vec::new();
        if max_count == 0 {
            return Ok(records);
        }

        let mut body = Map::new();
        match kind {
            RelatedResource::Comments => body.insert("video_id".to_string(), json!(target)),
            _ => body.insert("username".to_string(), json!(target)),
        };

        loop {
            if kind.is_paginated() {
                let remaining = max_count - records.len();
                body.insert(
                    "max_count".to_string(),
                    json!(remaining.min(MAX_PER_REQUEST)),
                );
            }

            let mut page: ListPage = self
                .post(token, kind.endpoint(), kind.fields(), &body)
                .await?;
            let batch = page.take_records(kind.list_key());
            let fetched = batch.len();
            records.extend(batch);
            debug!(%kind, target, fetched, total = records.len(), "Related page");

            if records.len() >= max_count {
                records.truncate(max_count);
                break;
            }
            if !kind.is_paginated() || !page.has_more {
                break;
            }
            match page.cursor.take() {
                Some(cursor) if body.get("cursor") != Some(&cursor) => {
                    body.insert("cursor".to_string(), cursor);
                }
                _ => {
                    warn!(%kind, target, "Cursor did not advance, stopping");
                    break;
                }
            }
        }

        Ok(records)
    }

    /// Fetch up to `max_count` comments of one video.
    pub async fn fetch_comments(
        &self,
        token: &AccessToken,
        video_id: &str,
        max_count: usize,
    ) -> Result<Vec<Record>, ExtractorError> {
        self.fetch_related(token, video_id, RelatedResource::Comments, max_count)
            .await
    }
}

/// Split the `days_back` days ending at `end` into query windows.
///
/// Windows are inclusive `(start, end)` date pairs, newest first, each
/// spanning at most [`MAX_WINDOW_DAYS`] days and not overlapping.
pub fn date_windows(end: NaiveDate, days_back: u64) -> Vec<(NaiveDate, NaiveDate)> {
    let earliest = end.checked_sub_days(Days::new(days_back)).unwrap_or(NaiveDate::MIN);
    let mut windows = Vec::new();
    let mut window_end = end;

    loop {
        let window_start = window_end
            .checked_sub_days(Days::new(MAX_WINDOW_DAYS))
            .map_or(earliest, |d| d.max(earliest));
        windows.push((window_start, window_end));

        match window_start.checked_sub_days(Days::new(1)) {
            Some(next_end) if next_end >= earliest => window_end = next_end,
            _ => break,
        }
    }

    windows
}
