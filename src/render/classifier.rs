//! Classification of render-tool log lines.
//!
//! The render tool writes free-form text. Each line is matched against an
//! ordered list of trigger substrings (first match wins) and turned into a
//! typed [`LogEvent`]. Lines that look like a known shape but do not carry the
//! expected number produce a [`ParseAnomaly`]; callers treat those as
//! unclassified and carry on.
//!
//! # Recognized shapes
//!
//! | Event | Trigger |
//! |---|---|
//! | [`LogEvent::OutputReady`] | configured output marker |
//! | [`LogEvent::Note`] | configured note marker |
//! | [`LogEvent::BatchStarted`] | `render started for` |
//! | [`LogEvent::FrameSkipped`] | `file already rendered` |
//! | [`LogEvent::FrameStarted`] | `rendering frame` |
//! | [`LogEvent::FrameFinished`] | `scene extraction time` or `rendering time` |

use std::path::PathBuf;

use thiserror::Error;

use crate::config::LogConfig;

/// Structured meaning of a single log line.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// A ROP (or each ROP of a merge node) announced its frame count.
    BatchStarted {
        /// ROP path found in quotes, e.g. `/out/Redshift_ROP1`
        label: Option<String>,
        total_frames: u64,
    },
    /// A frame began rendering.
    FrameStarted { frame: i64 },
    /// A frame was skipped because its output already exists.
    FrameSkipped { file: Option<String> },
    /// A frame finished. `seconds` is the reported render time, if readable.
    FrameFinished { seconds: Option<f64> },
    /// The render callback reported a written image.
    OutputReady { path: PathBuf, frame: Option<i64> },
    /// Informational message from the driver script.
    Note(String),
    /// Anything else.
    Unclassified,
}

/// A line matched a trigger but the expected field was missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAnomaly {
    #[error("batch start line has no frame count")]
    MissingFrameCount,

    #[error("frame start line has no frame number")]
    MissingFrameNumber,

    #[error("marker line has an empty payload")]
    EmptyPayload,
}

const BATCH_STARTED: &str = "render started for";
const FRAME_SKIPPED: [&str; 2] = ["file already rendered", "already rendered"];
const FRAME_STARTED: &str = "rendering frame";
const FRAME_FINISHED: [&str; 2] = ["scene extraction time", "rendering time"];
const DURATION_MARKERS: [&str; 3] = ["total time", "rendering time", "extraction time"];

/// Turns log lines into [`LogEvent`]s.
#[derive(Debug, Clone)]
pub struct LogClassifier {
    vendor_prefixes: Vec<String>,
    output_marker: String,
    note_marker: String,
}

impl Default for LogClassifier {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}

impl LogClassifier {
    /// Build a classifier from the `[log]` config section.
    pub fn new(config: &LogConfig) -> Self {
        Self {
            vendor_prefixes: config.vendor_prefixes.clone(),
            output_marker: config.output_marker.clone(),
            note_marker: config.note_marker.clone(),
        }
    }

    /// Remove leading whitespace and a known vendor tag such as `[Redshift]`.
    pub fn strip_prefix<'a>(&self, line: &'a str) -> &'a str {
        let trimmed = line.trim_start();
        for prefix in &self.vendor_prefixes {
            if let Some(rest) = trimmed.strip_prefix(prefix.as_str()) {
                return rest.trim_start();
            }
        }
        trimmed
    }

    /// Classify one raw line.
    pub fn classify(&self, line: &str) -> Result<LogEvent, ParseAnomaly> {
        let line = self.strip_prefix(line).trim_end();

        // Markers are exact, everything else is matched case-insensitively.
        if let Some(payload) = after_marker(line, &self.output_marker) {
            let path = PathBuf::from(payload);
            let frame = frame_from_file_name(payload);
            return Ok(LogEvent::OutputReady { path, frame });
        }
        if let Some(payload) = after_marker(line, &self.note_marker) {
            return Ok(LogEvent::Note(payload.to_string()));
        }

        let lower = line.to_ascii_lowercase();

        if let Some(pos) = lower.find(BATCH_STARTED) {
            let label = quoted_label(line);
            let total = first_integer(&line[pos + BATCH_STARTED.len()..])
                .or_else(|| last_integer_outside_quotes(line))
                .filter(|n| *n >= 0)
                .ok_or(ParseAnomaly::MissingFrameCount)?;
            return Ok(LogEvent::BatchStarted {
                label,
                total_frames: total as u64,
            });
        }

        if FRAME_SKIPPED.iter().any(|t| lower.contains(t)) {
            let file = line
                .rsplit_once(':')
                .map(|(_, rest)| rest.trim())
                .filter(|rest| !rest.is_empty())
                .map(str::to_string);
            return Ok(LogEvent::FrameSkipped { file });
        }

        if let Some(pos) = lower.find(FRAME_STARTED) {
            let frame = first_integer(&line[pos + FRAME_STARTED.len()..])
                .ok_or(ParseAnomaly::MissingFrameNumber)?;
            return Ok(LogEvent::FrameStarted { frame });
        }

        if FRAME_FINISHED.iter().any(|t| lower.contains(t)) {
            let seconds = DURATION_MARKERS
                .iter()
                .filter_map(|marker| lower.find(marker).map(|pos| pos + marker.len()))
                .find_map(|start| parse_duration(&line[start..]));
            return Ok(LogEvent::FrameFinished { seconds });
        }

        Ok(LogEvent::Unclassified)
    }
}

/// Text after `marker`, trimmed. `None` when the marker is absent.
///
/// A present marker with nothing after it is treated as absent so that the
/// line falls through to the other matchers.
fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() {
        return None;
    }
    let pos = line.find(marker)?;
    let payload = line[pos + marker.len()..].trim();
    if payload.is_empty() {
        tracing::debug!(line, "{}", ParseAnomaly::EmptyPayload);
        None
    } else {
        Some(payload)
    }
}

/// Text inside the first pair of single or double quotes.
fn quoted_label(line: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        if let Some(start) = line.find(quote) {
            let rest = &line[start + 1..];
            if let Some(end) = rest.find(quote) {
                let label = rest[..end].trim();
                if !label.is_empty() {
                    return Some(label.to_string());
                }
            }
        }
    }
    None
}

/// Every run of ASCII digits in `text`, with an optional leading minus sign.
fn integers(text: &str) -> Vec<i64> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let negative = start > 0
                && bytes[start - 1] == b'-'
                && (start == 1 || !bytes[start - 2].is_ascii_alphanumeric());
            if let Ok(n) = text[start..i].parse::<i64>() {
                found.push(if negative { -n } else { n });
            }
        } else {
            i += 1;
        }
    }

    found
}

/// First integer in `text`, skipping leading non-digits.
fn first_integer(text: &str) -> Option<i64> {
    integers(text).into_iter().next()
}

/// Last integer in `line`, ignoring anything inside the quoted label.
fn last_integer_outside_quotes(line: &str) -> Option<i64> {
    let mut outside = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                // Keep numbers on either side of a label from merging.
                outside.push(' ');
            }
            None => outside.push(c),
        }
    }
    integers(&outside).into_iter().last()
}

/// Frame number embedded in an output file name, e.g. `beauty.0042.exr` -> 42.
///
/// Takes the last dot-separated component of the file name that is all
/// digits. Names without such a component yield `None`.
pub fn frame_from_file_name(path: &str) -> Option<i64> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.split('.')
        .skip(1)
        .filter(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
        .last()
        .and_then(|part| part.parse().ok())
}

/// Parse the first duration found in `text`, in seconds.
///
/// Understands plain seconds (`12.5`, `12.5s`), milliseconds (`350ms`),
/// unit-suffixed compounds (`2m 3.5s`, `1h 2m 3s`) and clock forms
/// (`01:02:03.5`, `02:03.5`).
pub fn parse_duration(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let text = &text[start..];

    let clock_end = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ':'))
        .unwrap_or(text.len());
    let clock = &text[..clock_end];
    if clock.contains(':') {
        return parse_clock(clock);
    }

    let mut total = 0.0;
    let mut matched = false;
    let mut rest = text;

    loop {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            break;
        }
        let value: f64 = match rest[..num_end].trim_end_matches('.').parse() {
            Ok(v) => v,
            Err(_) => break,
        };
        let after = &rest[num_end..];
        let unit_text = after.trim_start();
        let (per_unit, divisor, unit_len) = unit_scale(unit_text);

        if unit_len == 0 {
            // A bare number ends the duration; it only counts when it is first.
            if !matched {
                return Some(value);
            }
            break;
        }

        total += value * per_unit / divisor;
        matched = true;

        let consumed = after.len() - unit_text.len() + unit_len;
        rest = after[consumed..].trim_start();
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            break;
        }
    }

    matched.then_some(total)
}

/// Seconds per unit (as a fraction) and byte length of a unit suffix at the
/// start of `text`.
fn unit_scale(text: &str) -> (f64, f64, usize) {
    let word_end = text
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let word = text[..word_end].to_ascii_lowercase();
    match word.as_str() {
        "ms" => (1.0, 1000.0, word_end),
        "s" | "sec" | "secs" | "second" | "seconds" => (1.0, 1.0, word_end),
        "m" | "min" | "mins" | "minute" | "minutes" => (60.0, 1.0, word_end),
        "h" | "hr" | "hrs" | "hour" | "hours" => (3600.0, 1.0, word_end),
        _ => (1.0, 1.0, 0),
    }
}

/// `hh:mm:ss(.fff)` or `mm:ss(.fff)`.
fn parse_clock(clock: &str) -> Option<f64> {
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    let mut total = 0.0;
    for part in parts {
        let value: f64 = part.parse().ok()?;
        total = total * 60.0 + value;
    }
    Some(total)
}
