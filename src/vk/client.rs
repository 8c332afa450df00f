use chrono::{TimeZone, Utc};
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use async_trait::async_trait;

use super::platform::{BroadcastId, Comment, PlatformClient, PlatformError};

/// VK API version pinned for stable response shapes.
const API_VERSION: &str = "5.199";

/// How many recent group videos to scan when looking for live broadcasts.
const GROUP_VIDEO_SCAN: u32 = 20;

/// Client for the VK REST API (`video.get`, `video.getComments`).
#[derive(Clone)]
pub struct VkClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl VkClient {
    pub fn new(access_token: &str, base_url: Option<&str>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(VkClient {
            http,
            base_url: base_url.unwrap_or("https://api.vk.com/method").to_string(),
            access_token: access_token.to_string(),
        })
    }

    /// Perform one API call and unwrap the `{ "response": … }` envelope.
    async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, PlatformError> {
        let url = format!("{}/{}", self.base_url, method);
        debug!("VK call: {} {:?}", method, params);

        let resp = self
            .http
            .get(&url)
            .query(params)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("v", API_VERSION),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PlatformError::Transient(format!(
                "VK HTTP status {}",
                resp.status()
            )));
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PlatformError::Transient(e.to_string()))?;

        if let Some(err) = raw.get("error") {
            let code = err["error_code"].as_i64().unwrap_or(0);
            let message = err["error_msg"].as_str().unwrap_or("unknown").to_string();
            return Err(map_api_error(code, message));
        }

        Ok(raw["response"].clone())
    }

    async fn get_video(&self, id: BroadcastId) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .call(
                "video.get",
                &[
                    ("owner_id", id.owner_id.to_string()),
                    ("videos", format!("{}_{}", id.owner_id, id.video_id)),
                ],
            )
            .await?;

        match response["items"].as_array().and_then(|a| a.first()) {
            Some(item) => Ok(item.clone()),
            None => Err(PlatformError::NotFound),
        }
    }
}

/// VK error codes 6 (too many requests), 9 (flood control) and 10 (internal
/// error) are retryable; the access/not-found family means the broadcast is
/// gone for us.
fn map_api_error(code: i64, message: String) -> PlatformError {
    match code {
        6 | 9 | 10 => PlatformError::Transient(format!("VK API {code}: {message}")),
        15 | 18 | 104 | 200 | 204 => PlatformError::NotFound,
        _ => PlatformError::Api { code, message },
    }
}

fn is_live_video(video: &serde_json::Value) -> bool {
    video["live"].as_i64() == Some(1) || video["live_status"].as_str() == Some("started")
}

/// Resolve a commenter's display name from the `extended=1` side arrays.
fn author_name(
    from_id: i64,
    profiles: &HashMap<i64, String>,
    groups: &HashMap<i64, String>,
) -> String {
    if from_id < 0 {
        groups.get(&-from_id).cloned()
    } else {
        profiles.get(&from_id).cloned()
    }
    .unwrap_or_else(|| from_id.to_string())
}

fn parse_comments(response: &serde_json::Value) -> Vec<Comment> {
    let mut profiles = HashMap::new();
    if let Some(items) = response["profiles"].as_array() {
        for p in items {
            if let Some(id) = p["id"].as_i64() {
                let name = format!(
                    "{} {}",
                    p["first_name"].as_str().unwrap_or(""),
                    p["last_name"].as_str().unwrap_or("")
                );
                profiles.insert(id, name.trim().to_string());
            }
        }
    }
    let mut groups = HashMap::new();
    if let Some(items) = response["groups"].as_array() {
        for g in items {
            if let (Some(id), Some(name)) = (g["id"].as_i64(), g["name"].as_str()) {
                groups.insert(id, name.to_string());
            }
        }
    }

    response["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|c| {
                    let id = c["id"].as_i64()?;
                    let from_id = c["from_id"].as_i64().unwrap_or(0);
                    let date = c["date"].as_i64().unwrap_or(0);
                    Some(Comment {
                        id,
                        author: author_name(from_id, &profiles, &groups),
                        text: c["text"].as_str().unwrap_or("").to_string(),
                        created_at: Utc.timestamp_opt(date, 0).single().unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl PlatformClient for VkClient {
    async fn fetch_comments(
        &self,
        id: BroadcastId,
        since_id: i64,
        limit: u32,
    ) -> Result<Vec<Comment>, PlatformError> {
        let mut params = vec![
            ("owner_id", id.owner_id.to_string()),
            ("video_id", id.video_id.to_string()),
            ("count", limit.to_string()),
            ("extended", "1".to_string()),
        ];
        if since_id > 0 {
            // start_comment_id is inclusive; the cursor comment itself is
            // filtered out below.
            params.push(("sort", "asc".to_string()));
            params.push(("start_comment_id", since_id.to_string()));
        } else {
            // Baseline fetch: newest page, returned ascending.
            params.push(("sort", "desc".to_string()));
        }

        let response = self.call("video.getComments", &params).await?;
        let mut comments = parse_comments(&response);
        if since_id > 0 {
            comments.retain(|c| c.id > since_id);
        } else {
            comments.reverse();
        }
        Ok(comments)
    }

    async fn is_live(&self, id: BroadcastId) -> Result<bool, PlatformError> {
        let video = self.get_video(id).await?;
        Ok(is_live_video(&video))
    }

    async fn list_live(&self, group_id: i64) -> Result<HashSet<BroadcastId>, PlatformError> {
        let response = self
            .call(
                "video.get",
                &[
                    // Group-owned content uses negative owner ids.
                    ("owner_id", (-group_id).to_string()),
                    ("count", GROUP_VIDEO_SCAN.to_string()),
                    ("sort", "2".to_string()),
                ],
            )
            .await?;

        let live = response["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|v| is_live_video(v))
                    .filter_map(|v| {
                        Some(BroadcastId::new(v["owner_id"].as_i64()?, v["id"].as_i64()?))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(live)
    }
}
