//! Reddit client for a "script" type OAuth app.
//!
//! The bot logs in with the password grant, caches the bearer token until
//! shortly before it expires, reads `/message/mentions` and answers with a
//! markdown comment.

use super::{Mention, SocialPlatform, headline, score_line};
use crate::config::RedditCredentials;
use crate::error::DeliveryError;
use crate::models::AnalysisResult;
use crate::utils::truncate_for_log;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
/// Refresh this long before the token actually expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

const FOOTER: &str = "^(I'm a bot that summarizes articles and detects clickbait.)";

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    #[serde(default = "Vec::new")]
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    kind: String,
    data: T,
}

/// An inbox item from `/message/mentions`.
#[derive(Debug, Deserialize)]
struct InboxMessage {
    /// Fullname, e.g. `t1_abc123`.
    name: String,
    #[serde(default)]
    body: String,
    /// Permalink of the comment, e.g. `/r/news/comments/xyz/title/abc123/?context=3`.
    #[serde(default)]
    context: String,
    created_utc: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default)]
    url: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    is_self: bool,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    json: CommentResult,
}

#[derive(Debug, Deserialize)]
struct CommentResult {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

pub struct RedditClient {
    http: reqwest::Client,
    credentials: RedditCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// A valid bearer token, logging in again when the cached one is stale.
    async fn access_token(&self) -> Result<String, DeliveryError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached
            .as_ref()
            .filter(|t| t.expires_at > Instant::now())
        {
            return Ok(token.access_token.clone());
        }

        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Auth(format!(
                "{status}: {}",
                truncate_for_log(&body, 200)
            )));
        }

        let token: TokenResponse = resp.json().await?;
        let Some(access_token) = token.access_token else {
            return Err(DeliveryError::Auth(
                token.error.unwrap_or_else(|| "no access token in response".to_string()),
            ));
        };
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        info!(
            username = %self.credentials.username,
            expires_in_secs = lifetime.as_secs(),
            "Obtained Reddit access token"
        );

        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_MARGIN),
        });
        Ok(access_token)
    }

    /// Send an authenticated request. A 401 drops the cached token so the
    /// next call logs in again.
    async fn send(&self, request: RequestBuilder) -> Result<Response, DeliveryError> {
        let token = self.access_token().await?;
        let resp = request.bearer_auth(token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!("Reddit rejected the access token; forcing re-login");
            *self.token.lock().await = None;
        }
        let body = resp.text().await.unwrap_or_default();
        Err(DeliveryError::Api {
            status: status.as_u16(),
            body: truncate_for_log(&body, 500),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DeliveryError> {
        let request = self.http.get(format!("{API_BASE}{path}")).query(query);
        Ok(self.send(request).await?.json().await?)
    }
}

impl SocialPlatform for RedditClient {
    const NAME: &'static str = "reddit";

    #[instrument(level = "debug", skip(self))]
    async fn poll_mentions(&self) -> Result<Vec<Mention>, DeliveryError> {
        let listing: Listing<InboxMessage> =
            self.get("/message/mentions", &[("limit", "25")]).await?;
        let mentions = mentions_from_listing(listing, &self.credentials.username);
        debug!(count = mentions.len(), "Fetched Reddit mentions");
        Ok(mentions)
    }

    async fn context_text(&self, mention: &Mention) -> Result<Option<String>, DeliveryError> {
        let Some(link_id) = mention.context_ref.as_deref() else {
            return Ok(None);
        };
        let listing: Listing<Link> = self.get("/api/info", &[("id", link_id)]).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| link_text(&thing.data))
            .filter(|text| !text.is_empty()))
    }

    #[instrument(level = "info", skip(self, text))]
    async fn reply(&self, id: &str, text: &str) -> Result<(), DeliveryError> {
        let request = self.http.post(format!("{API_BASE}/api/comment")).form(&[
            ("thing_id", id),
            ("text", text),
            ("api_type", "json"),
        ]);
        let resp: CommentResponse = self.send(request).await?.json().await?;
        if !resp.json.errors.is_empty() {
            return Err(DeliveryError::Api {
                status: StatusCode::OK.as_u16(),
                body: resp.json.errors.iter().join("; "),
            });
        }
        info!("Posted Reddit reply");
        Ok(())
    }

    fn format_reply(&self, result: &AnalysisResult) -> String {
        format_markdown(result)
    }
}

/// Comment mentions that actually tag `u/<username>`.
fn mentions_from_listing(listing: Listing<InboxMessage>, username: &str) -> Vec<Mention> {
    let tag = format!("u/{}", username.to_lowercase());
    listing
        .data
        .children
        .into_iter()
        .filter(|thing| thing.kind == "t1")
        .map(|thing| thing.data)
        .filter(|msg| msg.body.to_lowercase().contains(&tag))
        .map(|msg| Mention {
            context_ref: submission_fullname(&msg.context),
            created: msg
                .created_utc
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0)),
            id: msg.name,
            text: msg.body,
        })
        .collect()
}

/// `t3_<id>` of the submission a comment permalink points into.
fn submission_fullname(context: &str) -> Option<String> {
    let path = context.split('?').next().unwrap_or_default();
    path.split('/')
        .skip_while(|segment| *segment != "comments")
        .nth(1)
        .filter(|id| !id.is_empty())
        .map(|id| format!("t3_{id}"))
}

/// Link target and self text of a submission. Self posts link to
/// themselves, so only their text counts.
fn link_text(link: &Link) -> String {
    let url = if link.is_self { "" } else { link.url.as_str() };
    [url, link.selftext.as_str()]
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .join("\n")
}

fn format_markdown(result: &AnalysisResult) -> String {
    let key_points = result
        .key_points
        .iter()
        .map(|point| format!("- {point}"))
        .join("\n");
    format!(
        "Here's a summary of the article:\n\n\
         **{title}**\n\n\
         {headline}\n\n\
         > {assessment}\n\n\
         {summary}\n\n\
         **Key points:**\n\n\
         {key_points}\n\n\
         {scores}\n\n\
         ---\n\n\
         {FOOTER}",
        title = result.title,
        headline = headline(result),
        assessment = result.assessment,
        summary = result.summary,
        scores = score_line(result),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::tests::analysis;

    const MENTIONS: &str = r#"{
        "kind": "Listing",
        "data": {
            "children": [
                {"kind": "t1", "data": {
                    "name": "t1_aaa",
                    "body": "Hey u/SaveMeAClickBot what about https://example.com/a",
                    "context": "/r/news/comments/xyz789/some_title/aaa/?context=3",
                    "created_utc": 1700000000.0
                }},
                {"kind": "t1", "data": {
                    "name": "t1_bbb",
                    "body": "someone mentioned SaveMeAClickBot without the prefix",
                    "context": "/r/news/comments/xyz789/some_title/bbb/?context=3",
                    "created_utc": 1700000100.0
                }},
                {"kind": "t4", "data": {
                    "name": "t4_ccc",
                    "body": "private message to u/savemeaclickbot",
                    "context": ""
                }}
            ]
        }
    }"#;

    #[test]
    fn test_mentions_from_listing_keeps_tagged_comments() {
        let listing: Listing<InboxMessage> = serde_json::from_str(MENTIONS).unwrap();
        let mentions = mentions_from_listing(listing, "SaveMeAClickBot");

        assert_eq!(mentions.len(), 1);
        let m = &mentions[0];
        assert_eq!(m.id, "t1_aaa");
        assert_eq!(m.context_ref.as_deref(), Some("t3_xyz789"));
        assert_eq!(m.created.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_submission_fullname() {
        assert_eq!(
            submission_fullname("/r/news/comments/abc123/title/def456/?context=3").as_deref(),
            Some("t3_abc123")
        );
        assert_eq!(submission_fullname("/message/messages/xyz"), None);
        assert_eq!(submission_fullname(""), None);
    }

    #[test]
    fn test_link_text() {
        let link = Link {
            url: "https://news.example.com/story".to_string(),
            selftext: String::new(),
            is_self: false,
        };
        assert_eq!(link_text(&link), "https://news.example.com/story");

        let self_post = Link {
            url: "https://www.reddit.com/r/news/comments/abc/".to_string(),
            selftext: "Read this: https://blog.example.com/x".to_string(),
            is_self: true,
        };
        assert_eq!(link_text(&self_post), "Read this: https://blog.example.com/x");
    }

    #[test]
    fn test_comment_errors_decode() {
        let ok: CommentResponse =
            serde_json::from_str(r#"{"json": {"errors": [], "data": {}}}"#).unwrap();
        assert!(ok.json.errors.is_empty());

        let failed: CommentResponse = serde_json::from_str(
            r#"{"json": {"errors": [["RATELIMIT", "you are doing that too much", "ratelimit"]]}}"#,
        )
        .unwrap();
        assert_eq!(failed.json.errors.len(), 1);
    }

    #[test]
    fn test_format_markdown() {
        let reply = format_markdown(&analysis());
        assert!(reply.starts_with("Here's a summary of the article:\n\n**Example**"));
        assert!(reply.contains("✅ Title appears accurate"));
        assert!(reply.contains("- Point one\n- Point two"));
        assert!(reply.contains("Quality score: 81/100"));
        assert!(reply.ends_with(FOOTER));
    }
}
