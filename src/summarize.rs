//! The analysis pipeline behind `POST /summarize`.
//!
//! One request runs strictly in sequence:
//!
//! 1. **Extract**: fetch the article (title and body)
//! 2. **Prompt**: interpolate both into the fixed analysis prompt
//! 3. **Generate**: ask the model, with retries on transient failures
//! 4. **Parse**: turn the reply into an [`AnalysisResult`]
//!
//! Any failure ends the request; a partial or degraded result is never
//! returned. Requests share nothing mutable.

use crate::error::{ExtractionError, SummarizeError};
use crate::extract::ArticleSource;
use crate::llm::{AskAsync, ask_with_backoff};
use crate::models::AnalysisResult;
use crate::parser;
use crate::prompt::Prompt;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Turns an article URL into an analysis.
pub trait Analyze {
    fn analyze(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<AnalysisResult, SummarizeError>> + Send;
}

/// The production pipeline: an article source plus a model client.
#[derive(Debug)]
pub struct Summarizer<S, L> {
    source: S,
    llm: L,
}

impl<S, L> Summarizer<S, L> {
    pub fn new(source: S, llm: L) -> Self {
        Self { source, llm }
    }
}

impl<S, L> Analyze for Summarizer<S, L>
where
    S: ArticleSource + Sync,
    L: AskAsync<Response = String> + Sync,
{
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn analyze(&self, url: &str) -> Result<AnalysisResult, SummarizeError> {
        let start = Instant::now();

        info!("Attempting to extract article content");
        let Some(article) = self.source.extract(url).await? else {
            error!("Article extraction returned nothing");
            return Err(ExtractionError::NotFound.into());
        };
        let Some(content) = article.content.filter(|c| !c.trim().is_empty()) else {
            error!(title = ?article.title, "Article has no content");
            return Err(ExtractionError::NoContent.into());
        };
        let Some(title) = article.title.filter(|t| !t.trim().is_empty()) else {
            error!("Article has no title");
            return Err(ExtractionError::NoTitle.into());
        };
        info!(%title, content_length = content.len(), "Successfully extracted article");

        let prompt = Prompt::for_article(&title, &content, url);
        let reply = ask_with_backoff(&self.llm, &prompt).await?;
        debug!(%reply, "Raw model reply");

        let processing_time = start.elapsed().as_secs_f64();
        match parser::parse(&reply, url, processing_time) {
            Ok(result) => {
                info!(
                    processing_time,
                    quality_score = result.quality_score,
                    clickbait_score = result.clickbait_score,
                    key_points = result.key_points.len(),
                    "Analysis complete"
                );
                Ok(result)
            }
            Err(e) => {
                error!(missing = %e.missing, %reply, "Failed to parse model response");
                Err(e.into())
            }
        }
    }
}
