//! Best-effort extraction of the four analysis fields from model output.
//!
//! Strategies are tried in a fixed order and the first one that reports any
//! confidence wins:
//!
//! 1. [`JsonStrategy`]: a JSON object holding all four keys
//! 2. [`LabeledStrategy`]: `Transcription: …` style sections
//! 3. [`PositionalStrategy`]: blank-line separated paragraphs in field order
//!
//! Parsing never fails; unusable input yields empty fields.

use regex::Regex;
use serde_json::Value;

use crate::models::analysis::{non_blank, AnalysisFields};

pub const FIELD_NAMES: [&str; 4] = ["transcription", "summary", "detection", "sentiment"];

/// A known label followed by `:`, either at line start (after optional
/// markdown or quote decoration) or at any word boundary within a line.
const LABEL_PATTERN: &str = r#"(?im)(?:^[ \t>*#_\-"']*|\b)(transcription|summary|detection|sentiment)["'*_ \t]*:[*_]*"#;
const BLANK_LINE_PATTERN: &str = r"\n[ \t]*\n";
const FENCE_PATTERN: &str = r"(?s)```(?:json|JSON)?[ \t]*\n?(.*?)```";

/// How much of the expected structure a strategy recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseConfidence {
    Full,
    Partial,
    None,
}

impl ParseConfidence {
    fn from_filled(filled: usize) -> Self {
        match filled {
            0 => ParseConfidence::None,
            4 => ParseConfidence::Full,
            _ => ParseConfidence::Partial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnalysis {
    pub fields: AnalysisFields,
    /// Name of the strategy that produced `fields`, or `"none"`.
    pub strategy: &'static str,
    pub confidence: ParseConfidence,
}

pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, raw: &str) -> (AnalysisFields, ParseConfidence);
}

/// Run the default strategy chain over `raw`.
pub fn parse_analysis(raw: &str) -> ParsedAnalysis {
    parse_with(&[&JsonStrategy, &LabeledStrategy, &PositionalStrategy], raw)
}

/// Run `strategies` in order; the first with confidence other than `None` wins.
pub fn parse_with(strategies: &[&dyn ParseStrategy], raw: &str) -> ParsedAnalysis {
    let text = raw.replace("\r\n", "\n");

    for strategy in strategies {
        let (fields, confidence) = strategy.parse(&text);
        if confidence != ParseConfidence::None {
            tracing::debug!(strategy = strategy.name(), ?confidence, "Parsed model output");
            return ParsedAnalysis {
                fields,
                strategy: strategy.name(),
                confidence,
            };
        }
    }

    tracing::warn!(len = raw.len(), "No strategy recognised model output");
    ParsedAnalysis {
        fields: AnalysisFields::default(),
        strategy: "none",
        confidence: ParseConfidence::None,
    }
}

fn set_field(fields: &mut AnalysisFields, name: &str, value: Option<String>) {
    match name {
        "transcription" => fields.transcription = value,
        "summary" => fields.summary = value,
        "detection" => fields.detection = value,
        "sentiment" => fields.sentiment = value,
        _ => {}
    }
}

// ============================================================================
// Strict JSON
// ============================================================================

/// Accepts a JSON object (bare, fenced, or embedded between the outermost
/// braces) only when all four keys are present. String values are kept
/// verbatim; structured values are re-serialized compactly.
pub struct JsonStrategy;

impl JsonStrategy {
    fn candidates(text: &str) -> Vec<&str> {
        let mut out = vec![text.trim()];
        if let Ok(fence) = Regex::new(FENCE_PATTERN) {
            if let Some(body) = fence.captures(text).and_then(|c| c.get(1)) {
                out.push(body.as_str().trim());
            }
        }
        if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
            if start < end {
                out.push(&text[start..=end]);
            }
        }
        out
    }

    fn fields_from(object: &serde_json::Map<String, Value>) -> Option<AnalysisFields> {
        let lookup = |name: &str| {
            object
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        };

        let mut fields = AnalysisFields::default();
        for name in FIELD_NAMES {
            let value = match lookup(name)? {
                Value::Null => None,
                Value::String(s) => non_blank(s.clone()),
                other => non_blank(other.to_string()),
            };
            set_field(&mut fields, name, value);
        }
        Some(fields)
    }
}

impl ParseStrategy for JsonStrategy {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, raw: &str) -> (AnalysisFields, ParseConfidence) {
        for candidate in Self::candidates(raw) {
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) {
                if let Some(fields) = Self::fields_from(&object) {
                    return (fields, ParseConfidence::Full);
                }
            }
        }
        (AnalysisFields::default(), ParseConfidence::None)
    }
}

// ============================================================================
// Labeled sections
// ============================================================================

/// Case-insensitive `label:` sections, on their own lines or run together on
/// one line. A value ends at the next label, a code fence or a blank line.
/// First occurrence of a label wins.
pub struct LabeledStrategy;

impl ParseStrategy for LabeledStrategy {
    fn name(&self) -> &'static str {
        "labeled"
    }

    fn parse(&self, raw: &str) -> (AnalysisFields, ParseConfidence) {
        let (Ok(label_re), Ok(blank_re)) = (Regex::new(LABEL_PATTERN), Regex::new(BLANK_LINE_PATTERN))
        else {
            return (AnalysisFields::default(), ParseConfidence::None);
        };

        let labels: Vec<(String, usize, usize)> = label_re
            .captures_iter(raw)
            .filter_map(|c| {
                let whole = c.get(0)?;
                let name = c.get(1)?.as_str().to_ascii_lowercase();
                Some((name, whole.start(), whole.end()))
            })
            .collect();

        let mut fields = AnalysisFields::default();
        let mut seen: Vec<&str> = Vec::new();

        for (i, (name, _, value_start)) in labels.iter().enumerate() {
            if seen.contains(&name.as_str()) {
                continue;
            }
            seen.push(name.as_str());

            let next_label = labels.get(i + 1).map(|(_, start, _)| *start).unwrap_or(raw.len());
            let region = &raw[*value_start..next_label];

            let leading = region.len() - region.trim_start().len();
            let body = &region[leading..];
            let mut end = body.len();
            if let Some(pos) = body.find("```") {
                end = end.min(pos);
            }
            if let Some(m) = blank_re.find(body) {
                end = end.min(m.start());
            }

            set_field(&mut fields, name, non_blank(clean_value(&body[..end])));
        }

        let confidence = ParseConfidence::from_filled(fields.filled());
        (fields, confidence)
    }
}

/// Trim, then drop a trailing comma and one pair of wrapping quotes.
fn clean_value(value: &str) -> String {
    let mut v = value.trim();
    v = v.strip_suffix(',').unwrap_or(v).trim_end();
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        v = &v[1..v.len() - 1];
    }
    v.trim().to_string()
}

// ============================================================================
// Positional split
// ============================================================================

/// Blank-line separated segments assigned in field order, with any leading
/// known `label:` stripped. Only blank input yields no confidence.
pub struct PositionalStrategy;

impl ParseStrategy for PositionalStrategy {
    fn name(&self) -> &'static str {
        "positional"
    }

    fn parse(&self, raw: &str) -> (AnalysisFields, ParseConfidence) {
        let (Ok(blank_re), Ok(label_re)) = (Regex::new(BLANK_LINE_PATTERN), Regex::new(LABEL_PATTERN))
        else {
            return (AnalysisFields::default(), ParseConfidence::None);
        };

        let segments: Vec<&str> = blank_re
            .split(raw)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(FIELD_NAMES.len())
            .collect();

        let mut fields = AnalysisFields::default();
        for (name, segment) in FIELD_NAMES.iter().zip(&segments) {
            let stripped = match label_re.find(segment) {
                Some(m) if m.start() == 0 => &segment[m.end()..],
                _ => segment,
            };
            set_field(&mut fields, name, non_blank(stripped.trim()));
        }

        let confidence = ParseConfidence::from_filled(fields.filled());
        (fields, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(f: &'a Option<String>) -> &'a str {
        f.as_deref().unwrap_or("")
    }

    #[test]
    fn test_json_with_all_fields_round_trips_exactly() {
        let raw = r#"{"transcription":"  Hello there.  ","summary":"A greeting.","detection":"person, desk","sentiment":"positive"}"#;
        let parsed = parse_analysis(raw);

        assert_eq!(parsed.strategy, "json");
        assert_eq!(parsed.confidence, ParseConfidence::Full);
        assert_eq!(field(&parsed.fields.transcription), "  Hello there.  ");
        assert_eq!(field(&parsed.fields.summary), "A greeting.");
        assert_eq!(field(&parsed.fields.detection), "person, desk");
        assert_eq!(field(&parsed.fields.sentiment), "positive");
    }

    #[test]
    fn test_json_inside_code_fence_is_accepted() {
        let raw = "Here you go:\n```json\n{\"transcription\": \"t\", \"summary\": \"s\", \"detection\": \"d\", \"sentiment\": \"m\"}\n```\n";
        let parsed = parse_analysis(raw);
        assert_eq!(parsed.strategy, "json");
        assert_eq!(field(&parsed.fields.sentiment), "m");
    }

    #[test]
    fn test_json_detection_mapping_is_serialized() {
        let raw = r#"{"transcription":"t","summary":"s","detection":{"objects":["car","tree"]},"sentiment":"neutral"}"#;
        let parsed = parse_analysis(raw);
        assert_eq!(parsed.strategy, "json");
        assert_eq!(field(&parsed.fields.detection), r#"{"objects":["car","tree"]}"#);
    }

    #[test]
    fn test_json_missing_a_field_falls_through() {
        let raw = r#"{"transcription":"t","summary":"s","detection":"d"}"#;
        let parsed = parse_analysis(raw);
        assert_ne!(parsed.strategy, "json");
    }

    #[test]
    fn test_labeled_sections_exclude_labels_and_neighbours() {
        let raw = "Transcription: Welcome to the kitchen tour.\n\
                   Summary: A short walkthrough of a kitchen.\n\
                   Detection: fridge, oven, table\n\
                   Sentiment: Upbeat and friendly";
        let parsed = parse_analysis(raw);

        assert_eq!(parsed.strategy, "labeled");
        assert_eq!(parsed.confidence, ParseConfidence::Full);
        assert_eq!(field(&parsed.fields.transcription), "Welcome to the kitchen tour.");
        assert_eq!(field(&parsed.fields.summary), "A short walkthrough of a kitchen.");
        assert_eq!(field(&parsed.fields.detection), "fridge, oven, table");
        assert_eq!(field(&parsed.fields.sentiment), "Upbeat and friendly");
    }

    #[test]
    fn test_labeled_sections_on_one_line_are_split() {
        let raw = "Transcription: Hello there. Summary: A greeting. Detection: desk. Sentiment: warm";
        let parsed = parse_analysis(raw);

        assert_eq!(parsed.strategy, "labeled");
        assert_eq!(parsed.confidence, ParseConfidence::Full);
        assert_eq!(field(&parsed.fields.transcription), "Hello there.");
        assert_eq!(field(&parsed.fields.summary), "A greeting.");
        assert_eq!(field(&parsed.fields.detection), "desk.");
        assert_eq!(field(&parsed.fields.sentiment), "warm");
    }

    #[test]
    fn test_label_word_without_colon_stays_in_value() {
        let raw = "Summary: the summary of a long talk\nSentiment: calm";
        let parsed = parse_analysis(raw);
        assert_eq!(field(&parsed.fields.summary), "the summary of a long talk");
        assert_eq!(field(&parsed.fields.sentiment), "calm");
    }

    #[test]
    fn test_labeled_is_case_insensitive_and_handles_markdown() {
        let raw = "**TRANSCRIPTION:** hi\n## Summary: greeting\n- detection: none\n> sentiment : calm\n";
        let parsed = parse_analysis(raw);

        assert_eq!(parsed.strategy, "labeled");
        assert_eq!(field(&parsed.fields.transcription), "hi");
        assert_eq!(field(&parsed.fields.summary), "greeting");
        assert_eq!(field(&parsed.fields.detection), "none");
        assert_eq!(field(&parsed.fields.sentiment), "calm");
    }

    #[test]
    fn test_labeled_value_stops_at_blank_line_and_fence() {
        let raw = "Transcription:\nline one\nline two\n\ntrailing chatter\nSummary: short ```code``` tail";
        let parsed = parse_analysis(raw);

        assert_eq!(field(&parsed.fields.transcription), "line one\nline two");
        assert_eq!(field(&parsed.fields.summary), "short");
        assert_eq!(parsed.confidence, ParseConfidence::Partial);
    }

    #[test]
    fn test_labeled_any_order_first_occurrence_wins() {
        let raw = "Sentiment: sad\nDetection: cat\nSentiment: happy\n";
        let parsed = parse_analysis(raw);
        assert_eq!(field(&parsed.fields.sentiment), "sad");
        assert_eq!(field(&parsed.fields.detection), "cat");
        assert!(parsed.fields.transcription.is_none());
    }

    #[test]
    fn test_labeled_handles_broken_json_lines() {
        let raw = "{\n\"transcription\": \"hello\",\n\"summary\": \"greeting\",\n\"detection\": \"desk\",\n\"sentiment\": \"warm\"\n";
        let parsed = parse_analysis(raw);
        assert_eq!(parsed.strategy, "labeled");
        assert_eq!(field(&parsed.fields.transcription), "hello");
        assert_eq!(field(&parsed.fields.sentiment), "warm");
    }

    #[test]
    fn test_positional_split_assigns_in_order() {
        let raw = "The speaker says hello.\n\nA person greets the camera.\n\n  \n\nperson, window\n\nFriendly\n\nextra paragraph";
        let parsed = parse_analysis(raw);

        assert_eq!(parsed.strategy, "positional");
        assert_eq!(parsed.confidence, ParseConfidence::Full);
        assert_eq!(field(&parsed.fields.transcription), "The speaker says hello.");
        assert_eq!(field(&parsed.fields.summary), "A person greets the camera.");
        assert_eq!(field(&parsed.fields.detection), "person, window");
        assert_eq!(field(&parsed.fields.sentiment), "Friendly");
    }

    #[test]
    fn test_positional_fewer_segments_is_partial() {
        let raw = "Only one paragraph of prose here.";
        let parsed = parse_analysis(raw);
        assert_eq!(parsed.strategy, "positional");
        assert_eq!(parsed.confidence, ParseConfidence::Partial);
        assert_eq!(field(&parsed.fields.transcription), "Only one paragraph of prose here.");
        assert!(parsed.fields.summary.is_none());
    }

    #[test]
    fn test_positional_strips_leading_label() {
        let (fields, _) = PositionalStrategy.parse("Transcription: hi\n\nsummary:greeting");
        assert_eq!(field(&fields.transcription), "hi");
        assert_eq!(field(&fields.summary), "greeting");
    }

    #[test]
    fn test_blank_input_yields_empty_fields() {
        for raw in ["", "   ", "\n\n\t\n"] {
            let parsed = parse_analysis(raw);
            assert_eq!(parsed.strategy, "none");
            assert_eq!(parsed.confidence, ParseConfidence::None);
            assert!(parsed.fields.is_empty());
        }
    }

    #[test]
    fn test_crlf_line_endings_are_normalised() {
        let raw = "Transcription: a\r\nSummary: b\r\n\r\nDetection: c\r\nSentiment: d";
        let parsed = parse_analysis(raw);
        assert_eq!(parsed.confidence, ParseConfidence::Full);
        assert_eq!(field(&parsed.fields.summary), "b");
    }

    #[test]
    fn test_custom_chain_respects_order() {
        let raw = "Transcription: x\nSummary: y\nDetection: z\nSentiment: w";
        let parsed = parse_with(&[&PositionalStrategy, &LabeledStrategy], raw);
        assert_eq!(parsed.strategy, "positional");
        assert_eq!(field(&parsed.fields.transcription), "x\nSummary: y\nDetection: z\nSentiment: w");
    }
}
