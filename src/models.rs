//! Data models shared by the HTTP API, the analysis pipeline and the bots.
//!
//! This module defines the core data structures used throughout the application:
//! - [`RawArticle`]: Title and text pulled out of a fetched web page
//! - [`AnalysisResult`]: The structured analysis returned by `POST /summarize`
//! - [`ContentQuality`]: The three quality sub-scores of an analysis
//! - [`Verdict`]: The headline verdict signalled by the assessment glyph
//!
//! The JSON shape of [`AnalysisResult`] is consumed by the browser UI and by
//! the bots, hence the camelCase renaming.

use serde::{Deserialize, Serialize};

/// An article as extracted from a web page.
///
/// Either field may be missing when the page did not expose it; the
/// pipeline rejects such articles before any model call is made.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArticle {
    /// The article headline.
    pub title: Option<String>,
    /// The article body text.
    pub content: Option<String>,
}

/// Body of `POST /summarize`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummarizeRequest {
    /// The article to analyze. Must be an absolute URI.
    pub url: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Quality sub-scores, each in `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContentQuality {
    pub readability: u8,
    pub objectivity: u8,
    pub depth: u8,
}

/// A structured analysis of one article.
///
/// Created fresh for every request from the model's reply plus the timing
/// measured by the caller. It has no identity beyond the response it fills.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// The title as restated by the model.
    pub title: String,
    /// The assessment line, glyph included.
    pub assessment: String,
    /// Multi-line summary text.
    pub summary: String,
    /// Key points in the order the model listed them.
    pub key_points: Vec<String>,
    /// The URL the caller asked about.
    pub url: String,
    /// Weighted blend of the content quality sub-scores.
    pub quality_score: u32,
    /// Minutes saved by reading the summary instead of the article.
    pub time_saved: f64,
    /// Wall-clock seconds spent producing this analysis.
    pub processing_time: f64,
    /// How clickbait-y the headline is, `0..=100`.
    pub clickbait_score: u8,
    pub content_quality: ContentQuality,
}

impl AnalysisResult {
    /// The verdict signalled by the glyph on the assessment line.
    pub fn verdict(&self) -> Option<Verdict> {
        Verdict::find_in(&self.assessment)
    }
}

/// Headline verdict categories, one glyph each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 🚫 clickbait or misleading title
    Clickbait,
    /// ✅ accurate title
    Accurate,
    /// ⚠️ sensationalized title
    Sensationalized,
    /// ❓ ambiguous title
    Ambiguous,
}

impl Verdict {
    pub const ALL: [Verdict; 4] = [
        Verdict::Clickbait,
        Verdict::Accurate,
        Verdict::Sensationalized,
        Verdict::Ambiguous,
    ];

    /// The base glyph for this verdict. The warning sign is matched without
    /// its emoji variation selector.
    pub fn glyph(self) -> char {
        match self {
            Verdict::Clickbait => '🚫',
            Verdict::Accurate => '✅',
            Verdict::Sensationalized => '⚠',
            Verdict::Ambiguous => '❓',
        }
    }

    /// Short human headline used by the bot replies.
    pub fn headline(self) -> &'static str {
        match self {
            Verdict::Clickbait => "🚫 Clickbait detected!",
            Verdict::Accurate => "✅ Title appears accurate",
            Verdict::Sensationalized => "⚠️ Title is sensationalized",
            Verdict::Ambiguous => "❓ Title is ambiguous",
        }
    }

    /// The verdict of the first glyph appearing in `line`, if any.
    pub fn find_in(line: &str) -> Option<Verdict> {
        line.chars()
            .find_map(|c| Verdict::ALL.into_iter().find(|v| v.glyph() == c))
    }
}
