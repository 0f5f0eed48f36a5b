//! Analysis orchestration for uploaded files and video references.
//!
//! Extracted-media analysis issues four prompts: transcription and detection
//! run concurrently, then summary and sentiment consume their output. Every
//! model call is isolated: a failure is logged and leaves its field empty
//! while the other calls proceed.
//!
//! Reference analysis sends one combined prompt naming the video URL and runs
//! the reply through the response parser.

use std::path::Path;

use bytes::Bytes;
use serde::Serialize;
use vidscope_core::{
    parse_analysis, prompts, storage::timestamped_key, AnalysisFields, AnalysisStore,
    GenerativeBackend, MediaBundle, MediaExtractor, ObjectStore, ParsedAnalysis, Part,
    VideoAnalysis, VidscopeError,
};

/// Raw text returned by each model call, kept for the analysis artifact.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutputs {
    pub transcription: String,
    pub detection: String,
    pub summary: String,
    pub sentiment: String,
}

impl StepOutputs {
    pub fn into_fields(self) -> AnalysisFields {
        use vidscope_core::models::analysis::non_blank;
        AnalysisFields {
            transcription: non_blank(self.transcription.trim()),
            summary: non_blank(self.summary.trim()),
            detection: non_blank(self.detection.trim()),
            sentiment: non_blank(self.sentiment.trim()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub record: VideoAnalysis,
    /// Where the raw step outputs were archived, if that succeeded.
    pub analysis_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReferenceAnalysis {
    pub record: VideoAnalysis,
    pub parsed: ParsedAnalysis,
}

/// One model call whose failure yields an empty string.
async fn run_step(step: &'static str, model: &dyn GenerativeBackend, parts: Vec<Part>) -> String {
    match model.generate(parts).await {
        Ok(text) => {
            tracing::info!(step, backend = model.name(), chars = text.len(), "Analysis step completed");
            text
        }
        Err(e) => {
            tracing::warn!(step, backend = model.name(), error = %e, "Analysis step failed, leaving field empty");
            String::new()
        }
    }
}

async fn transcribe(model: &dyn GenerativeBackend, audio: &Path) -> String {
    match tokio::fs::read(audio).await {
        Ok(bytes) => {
            run_step(
                "transcription",
                model,
                vec![Part::inline("audio/mpeg", bytes), Part::text(prompts::TRANSCRIPTION_PROMPT)],
            )
            .await
        }
        Err(e) => {
            tracing::warn!(path = %audio.display(), error = %e, "Could not read audio track");
            String::new()
        }
    }
}

async fn detect(model: &dyn GenerativeBackend, frames: &[std::path::PathBuf]) -> String {
    let mut parts = vec![Part::text(prompts::DETECTION_PROMPT)];
    for frame in frames {
        match tokio::fs::read(frame).await {
            Ok(bytes) => parts.push(Part::inline("image/jpeg", bytes)),
            Err(e) => tracing::warn!(path = %frame.display(), error = %e, "Skipping unreadable frame"),
        }
    }

    if parts.len() == 1 {
        tracing::warn!("No frames available, skipping detection");
        return String::new();
    }

    run_step("detection", model, parts).await
}

/// Run the four prompts over extracted media.
pub async fn analyze_media(model: &dyn GenerativeBackend, bundle: &MediaBundle) -> StepOutputs {
    let (transcription, detection) =
        tokio::join!(transcribe(model, &bundle.audio), detect(model, &bundle.frames));

    let summary = if transcription.trim().is_empty() && detection.trim().is_empty() {
        tracing::warn!("Nothing to summarize, skipping summary");
        String::new()
    } else {
        run_step(
            "summary",
            model,
            vec![Part::text(prompts::summary_prompt(&transcription, &detection))],
        )
        .await
    };

    let sentiment = if transcription.trim().is_empty() {
        tracing::warn!("No transcription, skipping sentiment");
        String::new()
    } else {
        run_step(
            "sentiment",
            model,
            vec![Part::text(prompts::sentiment_prompt(&transcription))],
        )
        .await
    };

    StepOutputs {
        transcription,
        detection,
        summary,
        sentiment,
    }
}

/// Extract media from a local video in a scratch directory under `work_dir`
/// and run the four prompts. The scratch directory is removed on return.
pub async fn analyze_local_video(
    model: &dyn GenerativeBackend,
    extractor: &MediaExtractor,
    work_dir: &Path,
    video: Bytes,
) -> Result<StepOutputs, VidscopeError> {
    tokio::fs::create_dir_all(work_dir).await?;
    let scratch = tempfile::Builder::new()
        .prefix("analysis-")
        .tempdir_in(work_dir)?;

    let video_path = scratch.path().join("video.mp4");
    tokio::fs::write(&video_path, &video).await?;
    tracing::info!(path = %video_path.display(), bytes = video.len(), "Video saved for extraction");

    let bundle = extractor.extract(&video_path, scratch.path()).await?;
    tracing::info!(frames = bundle.frames.len(), "Media extracted");

    Ok(analyze_media(model, &bundle).await)
}

/// Archive step outputs as `analysis/{millis}.json`. Failures are logged only.
pub async fn store_artifact(
    objects: &dyn ObjectStore,
    video_url: &str,
    outputs: &StepOutputs,
) -> Option<String> {
    let artifact = serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "videoUrl": video_url,
        "steps": outputs,
    });

    let body = match serde_json::to_vec_pretty(&artifact) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize analysis artifact");
            return None;
        }
    };

    let key = format!("analysis/{}.json", chrono::Utc::now().timestamp_millis());
    match objects.put(&key, Bytes::from(body), "application/json").await {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to store analysis artifact");
            None
        }
    }
}

/// Full pipeline for an uploaded file: extract, analyze, store video,
/// upsert the record, archive the raw outputs.
#[allow(clippy::too_many_arguments)]
pub async fn analyze_uploaded_file(
    model: &dyn GenerativeBackend,
    objects: &dyn ObjectStore,
    store: &dyn AnalysisStore,
    extractor: &MediaExtractor,
    work_dir: &Path,
    file_name: &str,
    content_type: &str,
    video: Bytes,
) -> Result<FileAnalysis, VidscopeError> {
    let outputs = analyze_local_video(model, extractor, work_dir, video.clone()).await?;

    let video_url = objects
        .put(&timestamped_key("videos", file_name), video, content_type)
        .await?;

    let record = store.upsert(&video_url, &outputs.clone().into_fields()).await?;
    let analysis_url = store_artifact(objects, &video_url, &outputs).await;

    Ok(FileAnalysis {
        record,
        analysis_url,
    })
}

/// Re-analyze a video that already lives in the object store, keyed by its URL.
pub async fn analyze_stored_video(
    model: &dyn GenerativeBackend,
    objects: &dyn ObjectStore,
    store: &dyn AnalysisStore,
    extractor: &MediaExtractor,
    work_dir: &Path,
    video_url: &str,
) -> Result<FileAnalysis, VidscopeError> {
    let key = objects.key_for_url(video_url)?;
    let video = objects.get(&key).await?;

    let outputs = analyze_local_video(model, extractor, work_dir, video).await?;
    let record = store.upsert(video_url, &outputs.clone().into_fields()).await?;
    let analysis_url = store_artifact(objects, video_url, &outputs).await;

    Ok(FileAnalysis {
        record,
        analysis_url,
    })
}

/// Single combined prompt for a video reference; a failed call persists
/// four empty fields rather than erroring.
pub async fn analyze_reference(
    model: &dyn GenerativeBackend,
    store: &dyn AnalysisStore,
    video_url: &str,
) -> Result<ReferenceAnalysis, VidscopeError> {
    let raw = run_step(
        "combined",
        model,
        vec![Part::text(prompts::combined_analysis_prompt(video_url))],
    )
    .await;

    let parsed = parse_analysis(&raw);
    tracing::info!(
        video_url = %video_url,
        strategy = parsed.strategy,
        filled = parsed.fields.filled(),
        "Parsed combined analysis"
    );

    let record = store.upsert(video_url, &parsed.fields).await?;
    Ok(ReferenceAnalysis { record, parsed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vidscope_core::{GenerationError, MemoryAnalysisStore, MemoryObjectStore};

    /// Replies by inspecting the prompt text; records every prompt it sees.
    #[derive(Default)]
    struct ScriptedBackend {
        fail_on: Vec<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn failing(steps: &[&'static str]) -> Self {
            Self {
                fail_on: steps.to_vec(),
                ..Default::default()
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    fn step_of(prompt: &str) -> &'static str {
        if prompt.starts_with("Transcribe") {
            "transcription"
        } else if prompt.starts_with("Describe the objects") {
            "detection"
        } else if prompt.starts_with("Write a concise summary") {
            "summary"
        } else if prompt.starts_with("Analyze the overall sentiment") {
            "sentiment"
        } else {
            "combined"
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        async fn generate(&self, parts: Vec<Part>) -> Result<String, GenerationError> {
            let prompt: String = parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text(t) => Some(t.clone()),
                    Part::Inline { .. } => None,
                })
                .collect();
            self.seen.lock().unwrap().push(prompt.clone());

            let step = step_of(&prompt);
            if self.fail_on.contains(&step) {
                return Err(GenerationError::EmptyResponse);
            }
            Ok(match step {
                "transcription" => "  Hello and welcome.  ".to_string(),
                "detection" => "A person at a desk.".to_string(),
                "summary" => "Someone greets viewers.".to_string(),
                "sentiment" => "Positive".to_string(),
                _ => "Transcription: hi\nSummary: s\nDetection: d\nSentiment: warm".to_string(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn fake_bundle(dir: &Path, frames: usize) -> MediaBundle {
        let audio = dir.join("audio.mp3");
        std::fs::write(&audio, b"mp3").unwrap();
        let frames = (1..=frames)
            .map(|i| {
                let p = dir.join(format!("frame-{:03}.jpg", i));
                std::fs::write(&p, b"jpg").unwrap();
                p
            })
            .collect();
        MediaBundle { frames, audio }
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();

        let outputs = analyze_media(&backend, &fake_bundle(dir.path(), 2)).await;
        let fields = outputs.into_fields();

        assert_eq!(fields.transcription.as_deref(), Some("Hello and welcome."));
        assert_eq!(fields.detection.as_deref(), Some("A person at a desk."));
        assert_eq!(fields.summary.as_deref(), Some("Someone greets viewers."));
        assert_eq!(fields.sentiment.as_deref(), Some("Positive"));

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 4);
        let summary_prompt = prompts.iter().find(|p| step_of(p) == "summary").unwrap();
        assert!(summary_prompt.contains("Hello and welcome."));
        assert!(summary_prompt.contains("A person at a desk."));
    }

    #[tokio::test]
    async fn test_failed_step_does_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::failing(&["detection"]);

        let fields = analyze_media(&backend, &fake_bundle(dir.path(), 1))
            .await
            .into_fields();

        assert!(fields.detection.is_none());
        assert!(fields.transcription.is_some());
        assert!(fields.summary.is_some(), "summary still runs on transcription alone");
        assert!(fields.sentiment.is_some());
    }

    #[tokio::test]
    async fn test_failed_transcription_skips_sentiment() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::failing(&["transcription"]);

        let fields = analyze_media(&backend, &fake_bundle(dir.path(), 1))
            .await
            .into_fields();

        assert!(fields.transcription.is_none());
        assert!(fields.sentiment.is_none());
        assert!(fields.detection.is_some());
        assert!(fields.summary.is_some());
        assert!(backend.prompts().iter().all(|p| step_of(p) != "sentiment"));
    }

    #[tokio::test]
    async fn test_no_frames_skips_detection_call() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();

        let fields = analyze_media(&backend, &fake_bundle(dir.path(), 0))
            .await
            .into_fields();

        assert!(fields.detection.is_none());
        assert!(backend.prompts().iter().all(|p| step_of(p) != "detection"));
    }

    #[tokio::test]
    async fn test_reference_analysis_parses_and_upserts() {
        let backend = ScriptedBackend::default();
        let store = MemoryAnalysisStore::new();

        let result = analyze_reference(&backend, &store, "https://b/videos/1-a.mp4")
            .await
            .unwrap();

        assert_eq!(result.parsed.strategy, "labeled");
        assert_eq!(result.record.sentiment.as_deref(), Some("warm"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_reference_analysis_failure_persists_empty_record() {
        let backend = ScriptedBackend::failing(&["combined"]);
        let store = MemoryAnalysisStore::new();

        let result = analyze_reference(&backend, &store, "https://b/videos/2-b.mp4")
            .await
            .unwrap();

        assert!(result.parsed.fields.is_empty());
        assert!(result.record.summary.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_artifact_is_stored_as_json() {
        let objects = MemoryObjectStore::new("https://mem.local");
        let outputs = StepOutputs {
            transcription: "t".into(),
            ..Default::default()
        };

        let url = store_artifact(&objects, "https://mem.local/videos/1-a.mp4", &outputs)
            .await
            .expect("artifact stored");

        let key = objects.key_for_url(&url).unwrap();
        assert!(key.starts_with("analysis/") && key.ends_with(".json"));
        assert_eq!(objects.content_type(&key).await.as_deref(), Some("application/json"));

        let body: serde_json::Value =
            serde_json::from_slice(&objects.get(&key).await.unwrap()).unwrap();
        assert_eq!(body["steps"]["transcription"], "t");
        assert_eq!(body["videoUrl"], "https://mem.local/videos/1-a.mp4");
    }

    #[tokio::test]
    async fn test_extraction_failure_aborts_and_cleans_scratch() {
        let work = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();
        let extractor = MediaExtractor::new("/nonexistent/ffmpeg-binary", 5);

        let result = analyze_local_video(
            &backend,
            &extractor,
            work.path(),
            Bytes::from_static(b"video bytes"),
        )
        .await;

        assert!(matches!(result, Err(VidscopeError::Media(_))));
        assert!(backend.prompts().is_empty(), "no model call after extraction failure");
        let leftovers = std::fs::read_dir(work.path()).unwrap().count();
        assert_eq!(leftovers, 0, "scratch directory must be removed");
    }

    #[tokio::test]
    async fn test_stored_video_with_foreign_url_is_rejected() {
        let work = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();
        let objects = MemoryObjectStore::new("https://mem.local");
        let store = MemoryAnalysisStore::new();
        let extractor = MediaExtractor::new("ffmpeg", 5);

        let result = analyze_stored_video(
            &backend,
            &objects,
            &store,
            &extractor,
            work.path(),
            "https://elsewhere.example/v.mp4",
        )
        .await;

        assert!(matches!(
            result,
            Err(VidscopeError::Storage(vidscope_core::StorageError::ForeignUrl(_)))
        ));
        assert_eq!(store.len().await, 0);
    }
}
