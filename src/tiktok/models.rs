//! TikTok Research API models and data structures.
//!
//! Records are kept as raw JSON objects so every field the API returns ends
//! up in the output file unchanged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Largest `max_count` the research endpoints accept.
pub const MAX_PER_REQUEST: usize = 100;

/// Profile fields requested from `/v2/research/user/info/`.
pub const PROFILE_FIELDS: &str = "display_name,bio_description,avatar_url,is_verified,follower_count,following_count,likes_count,video_count,bio_url";

/// Video fields requested from `/v2/research/video/query/`.
pub const VIDEO_FIELDS: &str = "id,video_description,create_time,username,region_code,like_count,comment_count,share_count,view_count,music_id,hashtag_names,effect_ids,playlist_id,voice_to_text,video_duration,favorites_count,is_stem_verified";

/// Comment fields requested from `/v2/research/video/comment/list/`.
pub const COMMENT_FIELDS: &str = "id,video_id,text,like_count,reply_count,parent_comment_id,create_time";

const USER_LIST_FIELDS: &str = "display_name,username";
const USER_VIDEO_FIELDS: &str =
    "id,video_description,create_time,username,like_count,comment_count,share_count,view_count";

/// A JSON object as returned by the API.
pub type Record = Map<String, Value>;

/// Bearer token from the client-credentials grant.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: String, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body of `/v2/oauth/token/`.
///
/// Bad credentials come back as HTTP 200 with `error` set and no token.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Convert into a token, anchoring the expiry at `now`.
    pub fn into_token(self, now: DateTime<Utc>) -> Option<AccessToken> {
        let value = self.access_token.filter(|t| !t.is_empty())?;
        let expires_in = self.expires_in.unwrap_or(7200);
        Some(AccessToken::new(value, now + Duration::seconds(expires_in)))
    }
}

/// Envelope shared by every research endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// The `error` object of a research response. Code `ok` means success.
#[derive(Debug, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub log_id: String,
}

impl ApiError {
    pub fn is_ok(&self) -> bool {
        self.code.is_empty() || self.code == "ok"
    }
}

/// One page of a paginated list endpoint.
///
/// The list itself sits under an endpoint-specific key, kept in `rest`.
#[derive(Debug, Default, Deserialize)]
pub struct ListPage {
    #[serde(default)]
    pub cursor: Option<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub search_id: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ListPage {
    /// Take the records stored under `key`, skipping anything that is not an object.
    pub fn take_records(&mut self, key: &str) -> Vec<Record> {
        match self.rest.remove(key) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Video id as a string, whether the API sent it as a number or a string.
pub fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Optional resources that can be fetched next to profile and videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelatedResource {
    Comments,
    Followers,
    Following,
    Liked,
    Pinned,
    Reposted,
}

impl RelatedResource {
    pub const ALL: [RelatedResource; 6] = [
        RelatedResource::Comments,
        RelatedResource::Followers,
        RelatedResource::Following,
        RelatedResource::Liked,
        RelatedResource::Pinned,
        RelatedResource::Reposted,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Comments => "comments",
            Self::Followers => "followers",
            Self::Following => "following",
            Self::Liked => "liked",
            Self::Pinned => "pinned",
            Self::Reposted => "reposted",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Comments => "/v2/research/video/comment/list/",
            Self::Followers => "/v2/research/user/followers/",
            Self::Following => "/v2/research/user/following/",
            Self::Liked => "/v2/research/user/liked_videos/",
            Self::Pinned => "/v2/research/user/pinned_videos/",
            Self::Reposted => "/v2/research/user/reposted_videos/",
        }
    }

    pub fn fields(self) -> &'static str {
        match self {
            Self::Comments => COMMENT_FIELDS,
            Self::Followers | Self::Following => USER_LIST_FIELDS,
            Self::Liked | Self::Pinned | Self::Reposted => USER_VIDEO_FIELDS,
        }
    }

    /// Key of the record list inside `data`.
    pub fn list_key(self) -> &'static str {
        match self {
            Self::Comments => "comments",
            Self::Followers => "user_followers",
            Self::Following => "user_following",
            Self::Liked => "user_liked_videos",
            Self::Pinned => "pinned_videos_list",
            Self::Reposted => "user_reposted_videos",
        }
    }

    /// Pinned videos come back in one unpaginated response.
    pub fn is_paginated(self) -> bool {
        !matches!(self, Self::Pinned)
    }
}

impl fmt::Display for RelatedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RelatedResource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown related resource: {s}"))
    }
}

/// Query body for `/v2/research/video/query/`.
#[derive(Debug, Serialize)]
pub struct VideoQuery<'a> {
    pub query: Value,
    pub start_date: String,
    pub end_date: String,
    pub max_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_id: Option<&'a str>,
}
