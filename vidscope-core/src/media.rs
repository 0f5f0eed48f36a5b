//! Frame and audio extraction through the `ffmpeg` command-line tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::MediaConfig;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("ffmpeg binary could not be started: {0}")]
    NotFound(std::io::Error),

    #[error("ffmpeg failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("video file not found: {0}")]
    VideoNotFound(String),

    #[error("video has no audio track or ffmpeg produced no audio: {0}")]
    NoAudio(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of a full extraction: sampled stills plus the audio track.
#[derive(Debug, Clone)]
pub struct MediaBundle {
    /// JPEG frames in playback order.
    pub frames: Vec<PathBuf>,
    /// MP3 audio track.
    pub audio: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MediaExtractor {
    ffmpeg_path: String,
    frame_interval_seconds: u32,
}

impl From<&MediaConfig> for MediaExtractor {
    fn from(cfg: &MediaConfig) -> Self {
        Self::new(cfg.ffmpeg_path.clone(), cfg.frame_interval_seconds)
    }
}

impl MediaExtractor {
    pub fn new(ffmpeg_path: impl Into<String>, frame_interval_seconds: u32) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            frame_interval_seconds: frame_interval_seconds.max(1),
        }
    }

    /// `-i <video> -vf fps=1/<n> <dir>/frame-%03d.jpg -y`
    pub fn frame_args(&self, video: &Path, frames_dir: &Path) -> Vec<OsString> {
        vec![
            "-i".into(),
            video.into(),
            "-vf".into(),
            format!("fps=1/{}", self.frame_interval_seconds).into(),
            frames_dir.join("frame-%03d.jpg").into(),
            "-y".into(),
        ]
    }

    /// `-i <video> -q:a 0 -map a <audio> -y`
    pub fn audio_args(&self, video: &Path, audio: &Path) -> Vec<OsString> {
        vec![
            "-i".into(),
            video.into(),
            "-q:a".into(),
            "0".into(),
            "-map".into(),
            "a".into(),
            audio.into(),
            "-y".into(),
        ]
    }

    /// Sample one frame every `frame_interval_seconds` into `frames_dir`.
    pub async fn extract_frames(
        &self,
        video: &Path,
        frames_dir: &Path,
    ) -> Result<Vec<PathBuf>, MediaError> {
        ensure_exists(video)?;
        tokio::fs::create_dir_all(frames_dir).await?;

        tracing::info!(video = %video.display(), interval = self.frame_interval_seconds, "Extracting frames");
        self.run(self.frame_args(video, frames_dir)).await?;

        let mut frames = Vec::new();
        let mut entries = tokio::fs::read_dir(frames_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jpg") {
                frames.push(path);
            }
        }
        frames.sort();

        tracing::info!(count = frames.len(), "Frames extracted");
        Ok(frames)
    }

    /// Write the audio track of `video` to `audio`.
    pub async fn extract_audio(&self, video: &Path, audio: &Path) -> Result<(), MediaError> {
        ensure_exists(video)?;

        tracing::info!(video = %video.display(), "Extracting audio");
        self.run(self.audio_args(video, audio)).await?;

        if !audio.exists() {
            return Err(MediaError::NoAudio(video.to_string_lossy().to_string()));
        }
        Ok(())
    }

    /// Frames into `<workdir>/frames`, audio into `<workdir>/audio.mp3`.
    pub async fn extract(&self, video: &Path, workdir: &Path) -> Result<MediaBundle, MediaError> {
        let frames_dir = workdir.join("frames");
        let audio = workdir.join("audio.mp3");

        let frames = self.extract_frames(video, &frames_dir).await?;
        self.extract_audio(video, &audio).await?;

        Ok(MediaBundle { frames, audio })
    }

    async fn run(&self, args: Vec<OsString>) -> Result<(), MediaError> {
        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(&args)
            .output()
            .await
            .map_err(MediaError::NotFound)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::error!(exit_code = ?output.status.code(), stderr = %stderr, "ffmpeg failed");
            return Err(MediaError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr,
            });
        }
        Ok(())
    }
}

fn ensure_exists(video: &Path) -> Result<(), MediaError> {
    if video.exists() {
        Ok(())
    } else {
        Err(MediaError::VideoNotFound(video.to_string_lossy().to_string()))
    }
}
