use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stored analysis per distinct video reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalysis {
    pub id: Uuid,
    pub video_url: String,
    pub transcription: Option<String>,
    pub summary: Option<String>,
    pub detection: Option<String>,
    pub sentiment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The four text fields produced by an analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
}

impl AnalysisFields {
    /// Number of fields holding non-blank text.
    pub fn filled(&self) -> usize {
        [
            &self.transcription,
            &self.summary,
            &self.detection,
            &self.sentiment,
        ]
        .iter()
        .filter(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.filled() == 0
    }
}

/// Maps blank text to `None`.
pub fn non_blank(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_ignores_blank_fields() {
        let fields = AnalysisFields {
            transcription: Some("hello".into()),
            summary: Some("   ".into()),
            detection: None,
            sentiment: Some("positive".into()),
        };
        assert_eq!(fields.filled(), 2);
        assert!(!fields.is_empty());
        assert!(AnalysisFields::default().is_empty());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = VideoAnalysis {
            id: Uuid::nil(),
            video_url: "https://bucket/videos/1-a.mp4".into(),
            transcription: None,
            summary: Some("s".into()),
            detection: None,
            sentiment: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["videoUrl"], "https://bucket/videos/1-a.mp4");
        assert!(json["createdAt"].is_string());
        assert!(json["transcription"].is_null());
    }
}
