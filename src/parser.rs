//! Parsing of the model's free-text reply into an [`AnalysisResult`].
//!
//! The model is prompted to answer in a fixed block format:
//!
//! ```text
//! Title: <title>
//! <glyph> <one sentence assessment>
//! Summary: <summary, possibly several lines>
//! Key Points:
//! - <point>
//! Quality Metrics:
//! - Clickbait Score: <0-100>
//! - Readability: <0-100>
//! - Objectivity: <0-100>
//! - Content Depth: <0-100>
//! - Estimated Reading Time: <minutes>
//! ```
//!
//! Lines are scanned once, strictly forward, by a small state machine. A
//! marker only counts while its section is being sought, so marker text
//! repeated inside the summary is plain content. The parse is all-or-nothing:
//! a reply missing any marker yields a [`ParseError`] and no partial result.
//!
//! Inside the key-point and metric sections only `-` bullet lines count;
//! anything else, including metric lines without a numeric value, is skipped.

use crate::error::{Marker, ParseError};
use crate::models::{AnalysisResult, ContentQuality, Verdict};

const TITLE: &str = "Title:";
const SUMMARY: &str = "Summary:";
const KEY_POINTS: &str = "Key Points:";
const QUALITY_METRICS: &str = "Quality Metrics:";

/// Reading time assumed when the model did not estimate one, in minutes.
pub const DEFAULT_READING_TIME_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekTitle,
    SeekAssessment,
    SeekSummary,
    InSummary,
    InKeyPoints,
    InMetrics,
}

impl State {
    /// The marker this state is still waiting for, if the reply ends here.
    fn missing(self) -> Option<Marker> {
        match self {
            State::SeekTitle => Some(Marker::Title),
            State::SeekAssessment => Some(Marker::Assessment),
            State::SeekSummary => Some(Marker::Summary),
            State::InSummary => Some(Marker::KeyPoints),
            State::InKeyPoints => Some(Marker::QualityMetrics),
            State::InMetrics => None,
        }
    }
}

/// The five regions of a reply, borrowed from the trimmed input lines.
#[derive(Debug, Default, PartialEq)]
struct Sections<'a> {
    title: &'a str,
    assessment: &'a str,
    summary: Vec<&'a str>,
    key_points: Vec<&'a str>,
    metrics: Vec<&'a str>,
}

/// The metrics the model is asked to report. Unknown labels are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityMetrics {
    pub clickbait_score: Option<i64>,
    pub readability: Option<i64>,
    pub objectivity: Option<i64>,
    pub content_depth: Option<i64>,
    pub estimated_reading_time: Option<i64>,
}

impl QualityMetrics {
    /// Build the record from bullet-stripped `Label: value` lines.
    fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut metrics = Self::default();
        for line in lines {
            let Some((label, value)) = line.split_once(':') else {
                continue;
            };
            if let Some(value) = leading_integer(value) {
                metrics.record(label.trim(), value);
            }
        }
        metrics
    }

    fn record(&mut self, label: &str, value: i64) {
        let slot = match label {
            "Clickbait Score" => &mut self.clickbait_score,
            "Readability" => &mut self.readability,
            "Objectivity" => &mut self.objectivity,
            "Content Depth" => &mut self.content_depth,
            "Estimated Reading Time" => &mut self.estimated_reading_time,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn content_quality(&self) -> ContentQuality {
        ContentQuality {
            readability: percent(self.readability),
            objectivity: percent(self.objectivity),
            depth: percent(self.content_depth),
        }
    }
}

/// Parse a model reply.
///
/// # Arguments
///
/// * `raw_reply` - The complete reply text
/// * `request_url` - The URL the caller asked about, copied into the result
/// * `processing_time_secs` - Wall-clock seconds the caller spent so far
///
/// # Errors
///
/// Returns [`ParseError`] naming the first section marker that was not found.
pub fn parse(
    raw_reply: &str,
    request_url: &str,
    processing_time_secs: f64,
) -> Result<AnalysisResult, ParseError> {
    let sections = split_sections(raw_reply)?;

    let summary = sections.summary.join("\n").trim().to_string();
    let key_points = sections
        .key_points
        .iter()
        .map(|point| point.to_string())
        .collect();
    let metrics = QualityMetrics::from_lines(sections.metrics.iter().copied());
    let content_quality = metrics.content_quality();

    Ok(AnalysisResult {
        title: sections.title.to_string(),
        assessment: sections.assessment.to_string(),
        summary,
        key_points,
        url: request_url.to_string(),
        quality_score: quality_score(content_quality),
        time_saved: time_saved(metrics.estimated_reading_time, processing_time_secs),
        processing_time: processing_time_secs,
        clickbait_score: percent(metrics.clickbait_score),
        content_quality,
    })
}

fn split_sections(raw_reply: &str) -> Result<Sections<'_>, ParseError> {
    let mut state = State::SeekTitle;
    let mut sections = Sections::default();

    let lines = raw_reply.lines().map(str::trim).filter(|l| !l.is_empty());
    for line in lines {
        state = match state {
            State::SeekTitle => match line.strip_prefix(TITLE) {
                Some(title) => {
                    sections.title = title.trim();
                    State::SeekAssessment
                }
                None => state,
            },
            State::SeekAssessment => {
                if Verdict::find_in(line).is_some() {
                    sections.assessment = line;
                    State::SeekSummary
                } else {
                    state
                }
            }
            State::SeekSummary => match line.strip_prefix(SUMMARY) {
                Some(rest) => {
                    let rest = rest.trim();
                    if !rest.is_empty() {
                        sections.summary.push(rest);
                    }
                    State::InSummary
                }
                None => state,
            },
            State::InSummary => {
                if line.starts_with(KEY_POINTS) {
                    State::InKeyPoints
                } else {
                    sections.summary.push(line);
                    state
                }
            }
            State::InKeyPoints => {
                if line.starts_with(QUALITY_METRICS) {
                    State::InMetrics
                } else {
                    sections.key_points.extend(bullet(line));
                    state
                }
            }
            State::InMetrics => {
                sections.metrics.extend(bullet(line));
                state
            }
        };
    }

    match state.missing() {
        Some(missing) => Err(ParseError { missing }),
        None => Ok(sections),
    }
}

/// The text of a `-` bullet line, marker and surrounding whitespace removed.
fn bullet(line: &str) -> Option<&str> {
    line.strip_prefix('-').map(str::trim)
}

/// Parse the integer at the start of `value`, ignoring whatever follows it
/// (`"4 minutes"` is 4). `None` when there are no leading digits.
fn leading_integer(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn percent(value: Option<i64>) -> u8 {
    value.unwrap_or(0).clamp(0, 100) as u8
}

/// `round(readability*0.3 + objectivity*0.3 + depth*0.4)`, computed in
/// integer tenths so halves always round up.
pub fn quality_score(quality: ContentQuality) -> u32 {
    let tenths = 3 * u32::from(quality.readability)
        + 3 * u32::from(quality.objectivity)
        + 4 * u32::from(quality.depth);
    (tenths + 5) / 10
}

/// Minutes saved versus reading the article, never negative.
pub fn time_saved(estimated_reading_time: Option<i64>, processing_time_secs: f64) -> f64 {
    let reading = estimated_reading_time.unwrap_or(DEFAULT_READING_TIME_MINUTES) as f64;
    (reading - processing_time_secs / 60.0).max(0.0)
}
