//! In-process stand-in for the research API, used by tests.

use crate::config::Config;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Json, Router};
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::collections::HashMap;

pub const CLIENT_KEY: &str = "test-key";
pub const CLIENT_SECRET: &str = "test-secret";
pub const TOKEN: &str = "clt.test-token";

/// Has a profile, five videos per window, followers on two pages.
pub const KNOWN_USER: &str = "known_creator";
/// Always answers HTTP 429.
pub const THROTTLED_USER: &str = "throttled";
/// Returns as many videos as asked for and always claims there are more.
pub const PROLIFIC_USER: &str = "prolific";
/// First page of every list is empty but claims more; the next page has data.
pub const SPARSE_USER: &str = "sparse";
/// Claims more results forever without moving the cursor.
pub const STUCK_USER: &str = "stuck";

type Reply = (StatusCode, Json<Value>);

/// Start the mock server on an ephemeral port and return its base URL.
pub async fn spawn() -> String {
    let router = Router::new()
        .route("/v2/oauth/token/", post(token))
        .route("/v2/research/user/info/", post(user_info))
        .route("/v2/research/video/query/", post(video_query))
        .route("/v2/research/video/comment/list/", post(comments))
        .route("/v2/research/user/followers/", post(followers))
        .route("/v2/research/user/following/", post(following))
        .route("/v2/research/user/liked_videos/", post(liked))
        .route("/v2/research/user/pinned_videos/", post(pinned))
        .route("/v2/research/user/reposted_videos/", post(reposted));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Client configuration pointed at the mock, without request pacing.
pub fn config(base_url: &str) -> Config {
    Config {
        base_url: base_url.to_string(),
        request_delay_ms: 0,
        ..Config::default()
    }
}

fn ok(data: Value) -> Reply {
    (
        StatusCode::OK,
        Json(json!({
            "data": data,
            "error": { "code": "ok", "message": "", "log_id": "mock" }
        })),
    )
}

fn fail(status: StatusCode, code: &str, message: &str) -> Reply {
    (
        status,
        Json(json!({
            "error": { "code": code, "message": message, "log_id": "mock" }
        })),
    )
}

fn authorized(headers: &HeaderMap) -> Result<(), Reply> {
    let expected = format!("Bearer {TOKEN}");
    let given = headers.get("authorization").and_then(|v| v.to_str().ok());
    if given == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(fail(
            StatusCode::UNAUTHORIZED,
            "access_token_invalid",
            "The access token is invalid or not found in the request.",
        ))
    }
}

fn max_count(body: &Value) -> Result<usize, Reply> {
    let requested = body["max_count"].as_u64().unwrap_or(20) as usize;
    if requested > 100 {
        return Err(fail(
            StatusCode::BAD_REQUEST,
            "invalid_params",
            "max_count must be at most 100",
        ));
    }
    Ok(requested)
}

/// Empty page at cursor 0, then two records at cursor 100. The stuck user
/// keeps answering the empty page with cursor 0.
fn sparse_page(user: &str, key: &str, offset: u64, record: impl Fn(u64) -> Value) -> Value {
    if user == STUCK_USER || offset == 0 {
        let next = if user == STUCK_USER { 0 } else { 100 };
        return json!({ key: [], "cursor": next, "has_more": true });
    }
    let records: Vec<Value> = (offset..offset + 2).map(record).collect();
    json!({ key: records, "cursor": offset + 2, "has_more": false })
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    let valid = form.get("client_key").map(String::as_str) == Some(CLIENT_KEY)
        && form.get("client_secret").map(String::as_str) == Some(CLIENT_SECRET)
        && form.get("grant_type").map(String::as_str) == Some("client_credentials");

    if valid {
        Json(json!({ "access_token": TOKEN, "expires_in": 7200, "token_type": "Bearer" }))
    } else {
        Json(json!({
            "error": "invalid_client",
            "error_description": "Client key or secret is incorrect.",
            "log_id": "mock"
        }))
    }
}

async fn user_info(headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if let Err(reply) = authorized(&headers) {
        return reply;
    }
    match body["username"].as_str() {
        Some(KNOWN_USER) | Some(PROLIFIC_USER) => ok(json!({
            "display_name": "Known Creator",
            "bio_description": "mock profile",
            "is_verified": false,
            "follower_count": 1234,
            "following_count": 56,
            "likes_count": 7890,
            "video_count": 15
        })),
        Some(THROTTLED_USER) => fail(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_exceeded",
            "daily quota exhausted",
        ),
        Some(other) => fail(
            StatusCode::BAD_REQUEST,
            "invalid_params",
            &format!("The user {other} does not exist"),
        ),
        None => fail(StatusCode::BAD_REQUEST, "invalid_params", "username missing"),
    }
}

async fn video_query(headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if let Err(reply) = authorized(&headers) {
        return reply;
    }
    let requested = match max_count(&body) {
        Ok(n) => n,
        Err(reply) => return reply,
    };

    let parse = |key: &str| {
        body[key]
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
    };
    let (Some(start), Some(end)) = (parse("start_date"), parse("end_date")) else {
        return fail(StatusCode::BAD_REQUEST, "invalid_params", "bad dates");
    };
    if end < start || (end - start).num_days() > 30 {
        return fail(
            StatusCode::BAD_REQUEST,
            "invalid_params",
            "date range must be within 30 days",
        );
    }

    let username = body["query"]["and"][0]["field_values"][0]
        .as_str()
        .unwrap_or_default();
    let offset = body["cursor"].as_u64().unwrap_or(0);

    if username == SPARSE_USER || username == STUCK_USER {
        return ok(sparse_page(username, "videos", offset, |i| {
            json!({ "id": 8000 + i, "username": username })
        }));
    }

    let (count, has_more) = match username {
        PROLIFIC_USER => (requested as u64, true),
        KNOWN_USER => (5u64.min(requested as u64), false),
        _ => (0, false),
    };
    let videos: Vec<Value> = (offset..offset + count)
        .map(|i| {
            json!({
                "id": 7000 + i + 1,
                "username": username,
                "create_time": 1_700_000_000 + i,
                "video_description": format!("video {i}")
            })
        })
        .collect();

    ok(json!({
        "videos": videos,
        "cursor": offset + count,
        "has_more": has_more,
        "search_id": "search-1"
    }))
}

async fn comments(headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if let Err(reply) = authorized(&headers) {
        return reply;
    }
    let video_id: u64 = body["video_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    ok(json!({
        "comments": [
            { "id": 1, "video_id": video_id, "text": "first" },
            { "id": 2, "video_id": video_id, "text": "second" }
        ],
        "cursor": 2,
        "has_more": false
    }))
}

async fn followers(headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if let Err(reply) = authorized(&headers) {
        return reply;
    }
    let requested = match max_count(&body) {
        Ok(n) => n,
        Err(reply) => return reply,
    };
    let offset = body["cursor"].as_u64().unwrap_or(0);
    if let Some(user @ (SPARSE_USER | STUCK_USER)) = body["username"].as_str() {
        return ok(sparse_page(user, "user_followers", offset, |i| {
            json!({ "username": format!("follower_{i}") })
        }));
    }
    let end = (offset + requested as u64).min(offset + 2).min(4);
    let users: Vec<Value> = (offset..end)
        .map(|i| json!({ "username": format!("follower_{i}"), "display_name": "Follower" }))
        .collect();
    ok(json!({
        "user_followers": users,
        "cursor": end,
        "has_more": end < 4
    }))
}

async fn following(headers: HeaderMap, Json(_body): Json<Value>) -> Reply {
    if let Err(reply) = authorized(&headers) {
        return reply;
    }
    ok(json!({
        "user_following": [{ "username": "idol", "display_name": "Idol" }],
        "has_more": false
    }))
}

async fn liked(headers: HeaderMap, Json(_body): Json<Value>) -> Reply {
    if let Err(reply) = authorized(&headers) {
        return reply;
    }
    ok(json!({
        "user_liked_videos": [{ "id": 9001 }, { "id": 9002 }],
        "has_more": false
    }))
}

async fn pinned(headers: HeaderMap, Json(_body): Json<Value>) -> Reply {
    if let Err(reply) = authorized(&headers) {
        return reply;
    }
    ok(json!({ "pinned_videos_list": [{ "id": 7001 }] }))
}

async fn reposted(headers: HeaderMap, Json(_body): Json<Value>) -> Reply {
    if let Err(reply) = authorized(&headers) {
        return reply;
    }
    ok(json!({
        "user_reposted_videos": [{ "id": 9101 }],
        "has_more": false
    }))
}
