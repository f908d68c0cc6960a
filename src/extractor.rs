//! Extraction run orchestration.
//!
//! Drives one sequential run: authenticate, profile, videos, then each
//! requested related resource.

use crate::config::Credentials;
use crate::error::ExtractorError;
use crate::tiktok::models::record_id;
use crate::tiktok::{AccessToken, Record, RelatedResource, ResearchClient};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

/// What to extract for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub username: String,
    pub max_videos: usize,
    pub days_back: u64,
    /// Only the first this-many fetched videos get their comments fetched
    pub max_videos_for_comments: usize,
    pub max_comments_per_video: usize,
    /// Cap for each of followers, following, liked, pinned and reposted
    pub max_related: usize,
    pub related: BTreeSet<RelatedResource>,
}

impl ExtractionRequest {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            max_videos: 10,
            days_back: 90,
            max_videos_for_comments: 10,
            max_comments_per_video: 30,
            max_related: 100,
            related: BTreeSet::new(),
        }
    }
}

/// Everything collected during one run, written verbatim to the output file.
///
/// Related lists are `None` when not requested, so the output distinguishes
/// "not fetched" from "fetched, empty".
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub username: String,
    pub extracted_at: DateTime<Utc>,
    pub profile: Record,
    pub videos: Vec<Record>,
    pub comments: Option<Vec<Record>>,
    pub followers: Option<Vec<Record>>,
    pub following: Option<Vec<Record>>,
    pub liked_videos: Option<Vec<Record>>,
    pub pinned_videos: Option<Vec<Record>>,
    pub reposted_videos: Option<Vec<Record>>,
    pub request_count: u32,
}

impl ExtractionResult {
    pub fn new(username: impl Into<String>, profile: Record, videos: Vec<Record>) -> Self {
        Self {
            username: username.into(),
            extracted_at: Utc::now(),
            profile,
            videos,
            comments: None,
            followers: None,
            following: None,
            liked_videos: None,
            pinned_videos: None,
            reposted_videos: None,
            request_count: 0,
        }
    }

    fn slot_mut(&mut self, kind: RelatedResource) -> &mut Option<Vec<Record>> {
        match kind {
            RelatedResource::Comments => &mut self.comments,
            RelatedResource::Followers => &mut self.followers,
            RelatedResource::Following => &mut self.following,
            RelatedResource::Liked => &mut self.liked_videos,
            RelatedResource::Pinned => &mut self.pinned_videos,
            RelatedResource::Reposted => &mut self.reposted_videos,
        }
    }

    pub fn set_related(&mut self, kind: RelatedResource, records: Vec<Record>) {
        *self.slot_mut(kind) = Some(records);
    }

    /// Records of a related resource, `None` when it was not requested.
    pub fn related(&self, kind: RelatedResource) -> Option<&[Record]> {
        let slot = match kind {
            RelatedResource::Comments => &self.comments,
            RelatedResource::Followers => &self.followers,
            RelatedResource::Following => &self.following,
            RelatedResource::Liked => &self.liked_videos,
            RelatedResource::Pinned => &self.pinned_videos,
            RelatedResource::Reposted => &self.reposted_videos,
        };
        slot.as_deref()
    }
}

/// Runs extractions against the research API.
#[derive(Debug)]
pub struct Extractor {
    client: ResearchClient,
}

impl Extractor {
    pub fn new(client: ResearchClient) -> Self {
        Self { client }
    }

    /// Requests issued so far, including those of a failed run.
    pub fn request_count(&self) -> u32 {
        self.client.request_count()
    }

    /// Run a full extraction.
    ///
    /// # Details
    /// Stops at the first error. Related resources are fetched in the order
    /// comments, followers, following, liked, pinned, reposted.
    pub async fn run(
        &self,
        credentials: &Credentials,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractorError> {
        info!(username = %request.username, "Extracting data");

        let token = self.client.authenticate(credentials).await?;
        let profile = self
            .client
            .fetch_profile(&token, &request.username)
            .await?;
        let videos = self
            .client
            .fetch_videos(
                &token,
                &request.username,
                request.max_videos,
                request.days_back,
            )
            .await?;

        let mut result = ExtractionResult::new(&request.username, profile, videos);

        for &kind in &request.related {
            let records = self
                .fetch_related(&token, request, kind, &result.videos)
                .await?;
            info!(%kind, count = records.len(), "Related resource fetched");
            result.set_related(kind, records);
        }

        result.request_count = self.client.request_count();
        info!(requests = result.request_count, "Extraction complete");
        Ok(result)
    }

    /// Fetch one related resource for the requested user.
    ///
    /// # Details
    /// Comments are collected per video, for the first
    /// `max_videos_for_comments` of `videos` that carry an id, and
    /// concatenated in video order.
    pub async fn fetch_related(
        &self,
        token: &AccessToken,
        request: &ExtractionRequest,
        kind: RelatedResource,
        videos: &[Record],
    ) -> Result<Vec<Record>, ExtractorError> {
        match kind {
            RelatedResource::Comments => {
                let mut comments = Vec::new();
                let ids = videos
                    .iter()
                    .take(request.max_videos_for_comments)
                    .filter_map(record_id);
                for video_id in ids {
                    let batch = self
                        .client
                        .fetch_comments(token, &video_id, request.max_comments_per_video)
                        .await?;
                    comments.extend(batch);
                }
                Ok(comments)
            }
            _ => {
                self.client
                    .fetch_related(token, &request.username, kind, request.max_related)
                    .await
            }
        }
    }
}
