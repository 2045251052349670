//! Social-media bots that answer mentions with an article analysis.
//!
//! Each bot polls its platform for mentions, pulls the first URL out of the
//! mention (or, failing that, out of the post it was made under), asks the
//! HTTP API to analyze it and replies with a platform-specific rendering of
//! the result. Platforms plug in through [`SocialPlatform`]:
//!
//! - [`reddit::RedditClient`]: OAuth script app, markdown replies
//! - [`instagram::InstagramClient`]: Graph API, short plain-text replies
//!
//! A mention is answered at most once per bot lifetime. Handled ids are kept
//! in a [`SeenSet`] while the platform keeps listing them, and dated mentions
//! older than the dedup window or the bot's startup are never answered, so
//! an id leaving the set cannot lead to a second reply. Undated mentions
//! present on the first poll are treated as backlog and recorded without a
//! reply.

pub mod instagram;
pub mod reddit;
pub mod seen;

use crate::config::BotSettings;
use crate::error::{DeliveryError, ErrorResponse};
use crate::models::{AnalysisResult, SummarizeRequest};
use chrono::{DateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

pub use seen::SeenSet;

/// Sent instead of an analysis when anything goes wrong.
pub const APOLOGY: &str =
    "Sorry, I encountered an error while processing that article. Please try again later.";

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// The first `http(s)://` URL in `text`, up to the next whitespace.
pub fn extract_url(text: &str) -> Option<&str> {
    URL_RE.find(text).map(|m| m.as_str())
}

/// A post or comment that tagged the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    /// Platform id, also the target of the reply.
    pub id: String,
    pub text: String,
    pub created: Option<DateTime<Utc>>,
    /// Where to look for a URL when the mention itself has none.
    pub context_ref: Option<String>,
}

/// One social platform the bot can listen and reply on.
pub trait SocialPlatform {
    /// Used in logs.
    const NAME: &'static str;

    /// Recent mentions of the bot account, newest first or in any order.
    fn poll_mentions(&self) -> impl Future<Output = Result<Vec<Mention>, DeliveryError>> + Send;

    /// Text of the post a mention was made under, if there is one.
    fn context_text(
        &self,
        mention: &Mention,
    ) -> impl Future<Output = Result<Option<String>, DeliveryError>> + Send;

    fn reply(&self, id: &str, text: &str) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    /// Render an analysis the way this platform displays it.
    fn format_reply(&self, result: &AnalysisResult) -> String;
}

/// Where the bots get their analyses from.
pub trait SummarySource {
    fn summarize(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<AnalysisResult, DeliveryError>> + Send;
}

/// Calls `POST {api_url}/summarize` on a running server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ApiClient {
    pub fn new(api_url: &str) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/summarize", api_url.trim_end_matches('/')),
        })
    }
}

impl SummarySource for ApiClient {
    #[instrument(level = "debug", skip(self))]
    async fn summarize(&self, url: &str) -> Result<AnalysisResult, DeliveryError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&SummarizeRequest {
                url: url.to_string(),
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let body = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(DeliveryError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

/// What became of a single mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The analysis was posted.
    Replied,
    /// Nothing to analyze; the mention is dropped.
    NoUrl,
    /// Analysis or reply failed, the apology went out.
    Apologized,
    /// Even the apology failed; the mention is retried on a later poll.
    Failed,
}

impl Outcome {
    fn is_handled(self) -> bool {
        !matches!(self, Outcome::Failed)
    }
}

/// A polling loop for one platform.
pub struct Bot<P, S> {
    platform: P,
    summaries: S,
    seen: SeenSet,
    started: DateTime<Utc>,
    poll_interval: Duration,
    seen_window: Duration,
    /// Set after the first successful poll.
    polled: bool,
}

impl<P, S> Bot<P, S>
where
    P: SocialPlatform + Sync,
    S: SummarySource + Sync,
{
    pub fn new(platform: P, summaries: S, settings: &BotSettings) -> Self {
        Self {
            platform,
            summaries,
            seen: SeenSet::new(settings.seen_capacity, settings.seen_window),
            started: Utc::now(),
            poll_interval: settings.poll_interval,
            seen_window: settings.seen_window,
            polled: false,
        }
    }

    /// Poll forever. A failed poll is logged and the next tick tries again.
    pub async fn run(mut self) {
        info!(
            platform = P::NAME,
            interval_secs = self.poll_interval.as_secs(),
            "Starting bot polling"
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(0) => debug!(platform = P::NAME, "No new mentions"),
                Ok(handled) => info!(
                    platform = P::NAME,
                    handled,
                    tracked = self.seen.len(),
                    "Poll complete"
                ),
                Err(e) => error!(platform = P::NAME, error = %e, "Error in polling cycle"),
            }
        }
    }

    /// Fetch mentions once and handle every new one. Returns how many
    /// mentions were handled.
    pub async fn poll_once(&mut self) -> Result<usize, DeliveryError> {
        let mentions = self.platform.poll_mentions().await?;
        let first_poll = !self.polled;
        self.polled = true;
        let cutoff = self.cutoff();
        let mut handled = 0;

        for mention in mentions {
            if self.seen.refresh(&mention.id) {
                continue;
            }
            match mention.created {
                Some(created) if created <= cutoff => {
                    debug!(
                        platform = P::NAME,
                        id = %mention.id,
                        %created,
                        "Skipping stale mention"
                    );
                    continue;
                }
                None if first_poll => {
                    debug!(
                        platform = P::NAME,
                        id = %mention.id,
                        "Recording undated backlog mention"
                    );
                    self.seen.insert(&mention.id);
                    continue;
                }
                _ => {}
            }

            let outcome = self.handle(&mention).await;
            debug!(platform = P::NAME, id = %mention.id, ?outcome, "Mention processed");
            if outcome.is_handled() {
                self.seen.insert(&mention.id);
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Mentions created at or before this instant are never answered: they
    /// predate the bot, or their id may already have left the seen set.
    fn cutoff(&self) -> DateTime<Utc> {
        let window = TimeDelta::from_std(self.seen_window).unwrap_or(TimeDelta::MAX);
        let recent = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        recent.max(self.started)
    }

    #[instrument(level = "info", skip_all, fields(platform = P::NAME, id = %mention.id))]
    async fn handle(&self, mention: &Mention) -> Outcome {
        let url = match self.find_url(mention).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!("Mention has no URL");
                return Outcome::NoUrl;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load mention context");
                return Outcome::Failed;
            }
        };

        info!(%url, "Summarizing mentioned article");
        let delivered = match self.summaries.summarize(&url).await {
            Ok(result) => {
                let text = self.platform.format_reply(&result);
                self.platform.reply(&mention.id, &text).await
            }
            Err(e) => Err(e),
        };

        match delivered {
            Ok(()) => Outcome::Replied,
            Err(e) => {
                error!(error = %e, "Error processing mention");
                match self.platform.reply(&mention.id, APOLOGY).await {
                    Ok(()) => Outcome::Apologized,
                    Err(e) => {
                        error!(error = %e, "Error sending error reply");
                        Outcome::Failed
                    }
                }
            }
        }
    }

    async fn find_url(&self, mention: &Mention) -> Result<Option<String>, DeliveryError> {
        if let Some(url) = extract_url(&mention.text) {
            return Ok(Some(url.to_string()));
        }
        let context = self.platform.context_text(mention).await?;
        Ok(context.as_deref().and_then(extract_url).map(str::to_string))
    }
}

/// Score line shared by both reply formats.
fn score_line(result: &AnalysisResult) -> String {
    format!(
        "Quality score: {}/100 | Clickbait score: {}/100 | Time saved: ~{:.0} min",
        result.quality_score, result.clickbait_score, result.time_saved
    )
}

/// Verdict headline, or the bare assessment when the glyph is unknown.
fn headline(result: &AnalysisResult) -> &str {
    result
        .verdict()
        .map(|v| v.headline())
        .unwrap_or(result.assessment.as_str())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser;
    use crate::summarize::tests::REPLY;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub(crate) fn analysis() -> AnalysisResult {
        parser::parse(REPLY, "https://example.com/story", 2.0).unwrap()
    }

    #[derive(Default)]
    struct FakePlatform {
        mentions: Vec<Mention>,
        contexts: HashMap<String, String>,
        failing_replies: Mutex<usize>,
        replies: Mutex<Vec<(String, String)>>,
    }

    impl FakePlatform {
        fn with(mentions: Vec<Mention>) -> Self {
            Self {
                mentions,
                ..Default::default()
            }
        }

        fn fail_next_replies(self, n: usize) -> Self {
            *self.failing_replies.lock().unwrap() = n;
            self
        }

        fn replies(&self) -> Vec<(String, String)> {
            self.replies.lock().unwrap().clone()
        }
    }

    impl SocialPlatform for FakePlatform {
        const NAME: &'static str = "fake";

        async fn poll_mentions(&self) -> Result<Vec<Mention>, DeliveryError> {
            Ok(self.mentions.clone())
        }

        async fn context_text(&self, mention: &Mention) -> Result<Option<String>, DeliveryError> {
            Ok(mention
                .context_ref
                .as_ref()
                .and_then(|r| self.contexts.get(r).cloned()))
        }

        async fn reply(&self, id: &str, text: &str) -> Result<(), DeliveryError> {
            let mut failing = self.failing_replies.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(DeliveryError::Api {
                    status: 500,
                    body: "down".to_string(),
                });
            }
            self.replies
                .lock()
                .unwrap()
                .push((id.to_string(), text.to_string()));
            Ok(())
        }

        fn format_reply(&self, result: &AnalysisResult) -> String {
            format!("summary of {}", result.url)
        }
    }

    struct FakeSummaries {
        fail: bool,
        urls: Mutex<Vec<String>>,
    }

    impl FakeSummaries {
        fn ok() -> Self {
            Self {
                fail: false,
                urls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    impl SummarySource for FakeSummaries {
        async fn summarize(&self, url: &str) -> Result<AnalysisResult, DeliveryError> {
            self.urls.lock().unwrap().push(url.to_string());
            if self.fail {
                return Err(DeliveryError::Api {
                    status: 502,
                    body: "failed to extract article content - article is null".to_string(),
                });
            }
            Ok(AnalysisResult {
                url: url.to_string(),
                ..analysis()
            })
        }
    }

    /// A mention made just now, after the test bot "started".
    fn mention(id: &str, text: &str) -> Mention {
        Mention {
            id: id.to_string(),
            text: text.to_string(),
            created: Some(Utc::now()),
            context_ref: None,
        }
    }

    fn undated(id: &str, text: &str) -> Mention {
        Mention {
            created: None,
            ..mention(id, text)
        }
    }

    /// A bot that has been running for an hour.
    fn bot_with(
        platform: FakePlatform,
        summaries: FakeSummaries,
        settings: &BotSettings,
    ) -> Bot<FakePlatform, FakeSummaries> {
        let mut bot = Bot::new(platform, summaries, settings);
        bot.started = Utc::now() - ChronoDuration::hours(1);
        bot
    }

    fn bot(platform: FakePlatform, summaries: FakeSummaries) -> Bot<FakePlatform, FakeSummaries> {
        bot_with(platform, summaries, &BotSettings::default())
    }

    fn replied_ids(bot: &Bot<FakePlatform, FakeSummaries>) -> Vec<String> {
        bot.platform.replies().into_iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn test_extract_url() {
        assert_eq!(
            extract_url("u/SaveMeAClickBot https://example.com/a?b=1 please"),
            Some("https://example.com/a?b=1")
        );
        assert_eq!(
            extract_url("first http://a.example then https://b.example"),
            Some("http://a.example")
        );
        assert_eq!(extract_url("(see https://x.example/y)"), Some("https://x.example/y)"));
        assert_eq!(extract_url("no link here, ftp://nope"), None);
    }

    #[tokio::test]
    async fn test_replies_once_per_mention() {
        let platform = FakePlatform::with(vec![mention("m1", "look https://example.com/a")]);
        let mut bot = bot(platform, FakeSummaries::ok());

        assert_eq!(bot.poll_once().await.unwrap(), 1);
        assert_eq!(bot.poll_once().await.unwrap(), 0);

        let replies = bot.platform.replies();
        assert_eq!(
            replies,
            vec![("m1".to_string(), "summary of https://example.com/a".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mention_without_url_is_skipped_and_marked() {
        let mut bot = bot(
            FakePlatform::with(vec![mention("m1", "hey bot, thoughts?")]),
            FakeSummaries::ok(),
        );
        assert_eq!(bot.poll_once().await.unwrap(), 1);
        assert!(bot.platform.replies().is_empty());
        assert!(bot.summaries.urls.lock().unwrap().is_empty());
        assert!(bot.seen.refresh("m1"));
    }

    #[tokio::test]
    async fn test_falls_back_to_context_url() {
        let mut platform = FakePlatform::with(vec![Mention {
            context_ref: Some("t3_abc".to_string()),
            ..mention("m1", "u/SaveMeAClickBot summarize this")
        }]);
        platform.contexts.insert(
            "t3_abc".to_string(),
            "https://news.example.com/story\nsome selftext".to_string(),
        );
        let mut bot = bot(platform, FakeSummaries::ok());

        bot.poll_once().await.unwrap();
        assert_eq!(
            *bot.summaries.urls.lock().unwrap(),
            vec!["https://news.example.com/story".to_string()]
        );
    }

    #[tokio::test]
    async fn test_summary_failure_sends_apology() {
        let mut bot = bot(
            FakePlatform::with(vec![mention("m1", "https://example.com/a")]),
            FakeSummaries::failing(),
        );
        assert_eq!(bot.poll_once().await.unwrap(), 1);
        assert_eq!(
            bot.platform.replies(),
            vec![("m1".to_string(), APOLOGY.to_string())]
        );
        assert!(bot.seen.refresh("m1"));
    }

    #[tokio::test]
    async fn test_reply_failure_sends_apology() {
        let platform =
            FakePlatform::with(vec![mention("m1", "https://example.com/a")]).fail_next_replies(1);
        let mut bot = bot(platform, FakeSummaries::ok());
        bot.poll_once().await.unwrap();
        assert_eq!(
            bot.platform.replies(),
            vec![("m1".to_string(), APOLOGY.to_string())]
        );
    }

    #[tokio::test]
    async fn test_failed_apology_leaves_mention_for_retry() {
        let platform = FakePlatform::with(vec![
            mention("m1", "https://example.com/a"),
            mention("m2", "https://example.com/b"),
        ])
        .fail_next_replies(2);
        let mut bot = bot(platform, FakeSummaries::ok());

        // m1 fails twice (analysis reply and apology); m2 still goes out.
        assert_eq!(bot.poll_once().await.unwrap(), 1);
        assert!(!bot.seen.refresh("m1"));
        assert!(bot.seen.refresh("m2"));

        // Next poll retries m1.
        assert_eq!(bot.poll_once().await.unwrap(), 1);
        assert_eq!(replied_ids(&bot), vec!["m2".to_string(), "m1".to_string()]);
    }

    #[tokio::test]
    async fn test_mentions_before_startup_are_ignored() {
        let old = Mention {
            created: Some(Utc::now() - ChronoDuration::hours(1)),
            ..mention("old", "https://example.com/old")
        };
        let new = Mention {
            created: Some(Utc::now() + ChronoDuration::seconds(5)),
            ..mention("new", "https://example.com/new")
        };
        let mut bot = Bot::new(
            FakePlatform::with(vec![old, new]),
            FakeSummaries::ok(),
            &BotSettings::default(),
        );

        assert_eq!(bot.poll_once().await.unwrap(), 1);
        assert_eq!(replied_ids(&bot), vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_handled_mention_is_not_answered_again_after_window() {
        let settings = BotSettings {
            seen_window: Duration::from_millis(50),
            ..BotSettings::default()
        };
        let platform = FakePlatform::with(vec![mention("m1", "https://example.com/a")]);
        let mut bot = bot_with(platform, FakeSummaries::ok(), &settings);

        assert_eq!(bot.poll_once().await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(bot.poll_once().await.unwrap(), 0);

        assert_eq!(replied_ids(&bot), vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_mentions_older_than_window_are_ignored() {
        let settings = BotSettings {
            seen_window: Duration::from_secs(60),
            ..BotSettings::default()
        };
        let stale = Mention {
            created: Some(Utc::now() - ChronoDuration::minutes(5)),
            ..mention("stale", "https://example.com/stale")
        };
        let mut bot = bot_with(FakePlatform::with(vec![stale]), FakeSummaries::ok(), &settings);

        assert_eq!(bot.poll_once().await.unwrap(), 0);
        assert!(bot.platform.replies().is_empty());
    }

    #[tokio::test]
    async fn test_undated_backlog_is_recorded_without_reply() {
        let platform = FakePlatform::with(vec![undated("backlog", "https://example.com/old")]);
        let mut bot = bot(platform, FakeSummaries::ok());

        assert_eq!(bot.poll_once().await.unwrap(), 0);
        assert!(bot.platform.replies().is_empty());
        assert!(bot.seen.refresh("backlog"));

        bot.platform
            .mentions
            .push(undated("fresh", "https://example.com/new"));
        assert_eq!(bot.poll_once().await.unwrap(), 1);
        assert_eq!(replied_ids(&bot), vec!["fresh".to_string()]);
    }

    #[test]
    fn test_headline_and_scores() {
        let result = analysis();
        assert_eq!(headline(&result), "✅ Title appears accurate");
        assert_eq!(
            score_line(&result),
            "Quality score: 81/100 | Clickbait score: 10/100 | Time saved: ~4 min"
        );

        let unknown = AnalysisResult {
            assessment: "No glyph here".to_string(),
            ..result
        };
        assert_eq!(headline(&unknown), "No glyph here");
    }
}
