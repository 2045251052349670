//! Instagram Graph API client.
//!
//! Mentions are read from `/me/mentions` with a page access token. When a
//! mention carries no link, the caption of the media it was left on is used
//! instead. Replies are plain text and must fit the comment length limit.

use super::{Mention, SocialPlatform, headline, score_line};
use crate::config::InstagramCredentials;
use crate::error::DeliveryError;
use crate::models::AnalysisResult;
use crate::utils::{truncate_chars, truncate_for_log};
use chrono::{DateTime, Utc};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Longest comment Instagram accepts, in characters.
pub const MAX_COMMENT_CHARS: usize = 2200;

const MENTION_FIELDS: &str = "id,text,username,media_id,timestamp";

#[derive(Debug, Deserialize)]
struct MentionPage {
    #[serde(default)]
    data: Vec<GraphMention>,
}

#[derive(Debug, Deserialize)]
struct GraphMention {
    id: String,
    #[serde(default)]
    text: String,
    username: Option<String>,
    media_id: Option<String>,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Media {
    caption: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplyBody<'a> {
    message: &'a str,
    access_token: &'a str,
}

pub struct InstagramClient {
    http: reqwest::Client,
    access_token: String,
    api_root: String,
}

impl InstagramClient {
    pub fn new(credentials: InstagramCredentials) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        debug!(app_id = %credentials.app_id, "Configured Instagram client");
        Ok(Self {
            http,
            api_root: format!("{}/{}", credentials.base_url, credentials.api_version),
            access_token: credentials.page_access_token,
        })
    }

    /// The page token rides in the query string, so request errors are
    /// stripped of their URL before they can reach a log line.
    async fn get(&self, path: &str, fields: &str) -> Result<Response, DeliveryError> {
        let resp = self
            .http
            .get(format!("{}/{path}", self.api_root))
            .query(&[("access_token", self.access_token.as_str()), ("fields", fields)])
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        check(resp).await
    }
}

async fn check(resp: Response) -> Result<Response, DeliveryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DeliveryError::Api {
        status: status.as_u16(),
        body: truncate_for_log(&body, 500),
    })
}

impl SocialPlatform for InstagramClient {
    const NAME: &'static str = "instagram";

    #[instrument(level = "debug", skip(self))]
    async fn poll_mentions(&self) -> Result<Vec<Mention>, DeliveryError> {
        let page: MentionPage = self
            .get("me/mentions", MENTION_FIELDS)
            .await?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        let mentions = mentions_from_page(page);
        debug!(count = mentions.len(), "Fetched Instagram mentions");
        Ok(mentions)
    }

    async fn context_text(&self, mention: &Mention) -> Result<Option<String>, DeliveryError> {
        let Some(media_id) = mention.context_ref.as_deref() else {
            return Ok(None);
        };
        let media: Media = self
            .get(media_id, "caption")
            .await?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        Ok(media.caption.filter(|c| !c.trim().is_empty()))
    }

    #[instrument(level = "info", skip(self, text))]
    async fn reply(&self, id: &str, text: &str) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(format!("{}/{id}/replies", self.api_root))
            .json(&ReplyBody {
                message: text,
                access_token: &self.access_token,
            })
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        check(resp).await?;
        info!("Posted Instagram reply");
        Ok(())
    }

    fn format_reply(&self, result: &AnalysisResult) -> String {
        format_plain(result)
    }
}

fn mentions_from_page(page: MentionPage) -> Vec<Mention> {
    page.data
        .into_iter()
        .map(|m| {
            debug!(id = %m.id, username = ?m.username, "Instagram mention");
            Mention {
                created: m.timestamp.as_deref().and_then(parse_timestamp),
                context_ref: m.media_id,
                id: m.id,
                text: m.text,
            }
        })
        .collect()
}

/// Graph API timestamps look like `2024-01-15T10:30:00+0000`.
fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn format_plain(result: &AnalysisResult) -> String {
    let text = format!(
        "{}\n\n{}\n\n{}\n\n{}",
        headline(result),
        result.summary,
        result.assessment,
        score_line(result)
    );
    truncate_chars(&text, MAX_COMMENT_CHARS)
}
