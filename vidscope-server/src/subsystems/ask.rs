use vidscope_core::{prompts, AnalysisStore, GenerationError, GenerativeBackend, Part, VidscopeError};

/// Pick the prompt context: explicit `context`, else the stored summary for
/// `video_url`, else the raw `video_url`. `None` when neither is given.
pub async fn resolve_context(
    store: &dyn AnalysisStore,
    context: Option<&str>,
    video_url: Option<&str>,
) -> Result<Option<String>, VidscopeError> {
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        return Ok(Some(ctx.to_string()));
    }

    let Some(url) = video_url.filter(|u| !u.trim().is_empty()) else {
        return Ok(None);
    };

    let summary = store
        .find_by_url(url)
        .await?
        .and_then(|record| record.summary)
        .filter(|s| !s.trim().is_empty());

    match summary {
        Some(summary) => {
            tracing::debug!(video_url = %url, "Answering from stored summary");
            Ok(Some(summary))
        }
        None => {
            tracing::debug!(video_url = %url, "No stored summary, answering from reference URL");
            Ok(Some(url.to_string()))
        }
    }
}

/// One stateless question; the model's text is returned unmodified.
pub async fn answer_question(
    model: &dyn GenerativeBackend,
    context: &str,
    question: &str,
) -> Result<String, GenerationError> {
    model
        .generate(vec![Part::text(prompts::question_prompt(context, question))])
        .await
}
