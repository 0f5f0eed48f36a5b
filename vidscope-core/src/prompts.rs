//! Prompt text sent to the generative model.

pub const TRANSCRIPTION_PROMPT: &str =
    "Transcribe the spoken content of this audio track verbatim. \
     Return only the transcript text.";

pub const DETECTION_PROMPT: &str =
    "Describe the objects, scene, and any visible text in these images. \
     The images are frames sampled from one video in playback order.";

pub fn summary_prompt(transcription: &str, detection: &str) -> String {
    format!(
        "Write a concise summary of a video using the information below.\n\n\
         Transcription:\n{}\n\n\
         Visual content:\n{}",
        or_none(transcription),
        or_none(detection)
    )
}

pub fn sentiment_prompt(transcription: &str) -> String {
    format!(
        "Analyze the overall sentiment and tone of this transcript. \
         Name the sentiment (positive, negative, neutral or mixed) and explain briefly.\n\n\
         Transcript:\n{}",
        transcription
    )
}

/// Single-call analysis of a video by reference.
pub fn combined_analysis_prompt(video_url: &str) -> String {
    format!(
        "Analyze the video at {}.\n\
         Respond with a single JSON object with exactly these string keys: \
         \"transcription\" (spoken content), \"summary\" (what happens in the video), \
         \"detection\" (objects, scenes and visible text), \
         \"sentiment\" (overall sentiment and tone). Do not add any other text.",
        video_url
    )
}

pub fn question_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions based on the provided video summary. \
         Here is the summary of the video: {}. Question: {}",
        context, question
    )
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}
