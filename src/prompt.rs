//! The prompt sent to the model for each article.
//!
//! The reply parser depends on the model following [`SYSTEM_PROMPT`] to the
//! letter, so the marker names and glyph legend here must stay in sync with
//! [`crate::parser`].

/// Fixed system instructions: glyph legend and the exact reply format.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes articles for clickbait and provides detailed summaries.
For clickbait assessment, use these emojis:
- 🚫 for clickbait/misleading titles
- ✅ for accurate/truthful titles
- ⚠️ for sensationalized titles
- ❓ for ambiguous titles

Format your response EXACTLY like this:
Title: [Article Title]
[emoji] [one sentence assessment]
Summary: [2-3 paragraph detailed summary of the article's main points and arguments]
Key Points:
- [First key point]
- [Second key point]
- [Third key point]
- [Fourth key point]
Quality Metrics:
- Clickbait Score: [0-100]
- Readability: [0-100]
- Objectivity: [0-100]
- Content Depth: [0-100]
- Estimated Reading Time: [minutes]";

/// A system/user message pair for one chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Build the analysis prompt for an extracted article.
    pub fn for_article(title: &str, content: &str, url: &str) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            user: format!("Analyze this article:\nTitle: {title}\nContent: {content}\nURL: {url}"),
        }
    }
}
