//! Command-line client for the Vidscope HTTP API
//!
//! # Subcommands
//! - `upload <file>`                         : store a video, print its URL
//! - `analyze <file>` / `analyze --url <u>`  : analyze a local file or a stored video
//! - `details <video-url>`                   : show the stored analysis
//! - `ask <question> [--context c] [--url u]`: ask about a video
//! - `status`                                : show server health

use std::path::Path;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";

/// Analysis runs several model calls back to back.
const ANALYZE_TIMEOUT_SECS: u64 = 600;
const REQUEST_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "vidscope-cli", version, about = "Vidscope video analysis CLI")]
struct Cli {
    /// Vidscope HTTP server URL (overrides VIDSCOPE_HTTP_URL env var)
    #[arg(long, env = "VIDSCOPE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload a video file to storage
    Upload {
        /// Path to the video file
        file: String,
    },

    /// Analyze a local video file, or a stored video by URL
    Analyze {
        /// Path to the video file
        #[arg(required_unless_present = "url", conflicts_with = "url")]
        file: Option<String>,

        /// URL of a previously uploaded video
        #[arg(long)]
        url: Option<String>,
    },

    /// Show the stored analysis for a video URL
    Details {
        /// Video URL as returned by upload or analyze
        video_url: String,
    },

    /// Ask a question about a video
    Ask {
        /// The question to ask
        question: String,

        /// Summary text to answer from
        #[arg(long)]
        context: Option<String>,

        /// Video URL whose stored summary is used as context
        #[arg(long)]
        url: Option<String>,
    },

    /// Show Vidscope server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// A stored analysis as returned by the API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub video_url: String,
    pub transcription: Option<String>,
    pub summary: Option<String>,
    pub detection: Option<String>,
    pub sentiment: Option<String>,
    pub created_at: Option<String>,
}

/// The four fields of an analysis, all optional
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisSections {
    pub transcription: Option<String>,
    pub summary: Option<String>,
    pub detection: Option<String>,
    pub sentiment: Option<String>,
}

impl From<&AnalysisRecord> for AnalysisSections {
    fn from(r: &AnalysisRecord) -> Self {
        Self {
            transcription: r.transcription.clone(),
            summary: r.summary.clone(),
            detection: r.detection.clone(),
            sentiment: r.sentiment.clone(),
        }
    }
}

// ============================================================================
// Output formatting
// ============================================================================

/// Render analysis sections as labeled blocks; missing sections show "(none)".
pub fn format_sections(sections: &AnalysisSections) -> String {
    let rows = [
        ("Transcription", &sections.transcription),
        ("Summary", &sections.summary),
        ("Detection", &sections.detection),
        ("Sentiment", &sections.sentiment),
    ];

    rows.iter()
        .map(|(label, value)| {
            let text = value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or("(none)");
            format!("{}:\n  {}\n", label, text.replace('\n', "\n  "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Best-effort video content type from the file extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Build the `/askQuestion` body, leaving out absent fields.
pub fn ask_payload(question: &str, context: Option<&str>, url: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({ "question": question });
    if let Some(obj) = body.as_object_mut() {
        if let Some(c) = context {
            obj.insert("context".to_string(), serde_json::json!(c));
        }
        if let Some(u) = url {
            obj.insert("videoUrl".to_string(), serde_json::json!(u));
        }
    }
    body
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a request and return the JSON body, exiting on transport or HTTP errors.
fn send_json(req: reqwest::blocking::RequestBuilder, url: &str) -> serde_json::Value {
    let resp = match req.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("vidscope-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        let msg = body["error"].as_str().unwrap_or("unknown error");
        eprintln!("vidscope-cli: server returned {}: {}", status, msg);
        std::process::exit(1);
    }
    body
}

fn print_json(body: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(body)?);
    Ok(())
}

fn file_form(file: &str) -> anyhow::Result<reqwest::blocking::multipart::Form> {
    let data = std::fs::read(file)?;
    let name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("video.mp4")
        .to_string();
    let part = reqwest::blocking::multipart::Part::bytes(data)
        .file_name(name)
        .mime_str(content_type_for(file))?;
    Ok(reqwest::blocking::multipart::Form::new().part("file", part))
}

fn do_upload(server: &str, file: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/upload", server);
    let req = client(REQUEST_TIMEOUT_SECS)?
        .post(&url)
        .multipart(file_form(file)?);
    let body = send_json(req, &url);

    if json_output {
        return print_json(&body);
    }
    println!("{}", body["url"].as_str().unwrap_or("?"));
    Ok(())
}

fn do_analyze(
    server: &str,
    file: Option<&str>,
    video_url: Option<&str>,
    json_output: bool,
) -> anyhow::Result<()> {
    let url = format!("{}/analyze", server);
    let http = client(ANALYZE_TIMEOUT_SECS)?;

    let req = match (file, video_url) {
        (Some(file), _) => http.post(&url).multipart(file_form(file)?),
        (None, Some(v)) => http.post(&url).json(&serde_json::json!({ "videoUrl": v })),
        (None, None) => anyhow::bail!("either a file or --url is required"),
    };
    let body = send_json(req, &url);

    if json_output {
        return print_json(&body);
    }

    // File uploads answer with the stored record, reference analysis with bare sections
    let sections: AnalysisSections = if body.get("analysis").is_some() {
        let record: AnalysisRecord = serde_json::from_value(body["analysis"].clone())?;
        AnalysisSections::from(&record)
    } else {
        serde_json::from_value(body["structuredAnalysis"].clone()).unwrap_or_default()
    };

    println!("Video: {}\n", body["videoUrl"].as_str().unwrap_or("?"));
    println!("{}", format_sections(&sections));
    if let Some(a) = body["analysisUrl"].as_str() {
        println!("Raw output: {}", a);
    }
    Ok(())
}

fn do_details(server: &str, video_url: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/videoDetails", server);
    let req = client(REQUEST_TIMEOUT_SECS)?
        .get(&url)
        .query(&[("videoUrl", video_url)]);
    let body = send_json(req, &url);

    if json_output {
        return print_json(&body);
    }

    let record: AnalysisRecord = serde_json::from_value(body["analysis"].clone())?;
    println!("Video:   {}", record.video_url);
    println!("Created: {}\n", record.created_at.as_deref().unwrap_or("?"));
    println!("{}", format_sections(&AnalysisSections::from(&record)));
    Ok(())
}

fn do_ask(
    server: &str,
    question: &str,
    context: Option<&str>,
    video_url: Option<&str>,
    json_output: bool,
) -> anyhow::Result<()> {
    let url = format!("{}/askQuestion", server);
    let req = client(REQUEST_TIMEOUT_SECS)?
        .post(&url)
        .json(&ask_payload(question, context, video_url));
    let body = send_json(req, &url);

    if json_output {
        return print_json(&body);
    }
    println!("{}", body["answer"].as_str().unwrap_or(""));
    Ok(())
}

/// Show the server status by calling GET /health.
/// Render a `/health` body: raw JSON with `--json`, aligned lines otherwise.
pub fn format_status(body: &serde_json::Value, json_output: bool) -> anyhow::Result<String> {
    if json_output {
        return Ok(serde_json::to_string_pretty(body)?);
    }
    Ok(format!(
        "Vidscope server: {}\nVersion:         {}\nStore:           {}",
        body["status"].as_str().unwrap_or("unknown"),
        body["version"].as_str().unwrap_or("?"),
        body["store"].as_str().unwrap_or("?"),
    ))
}

fn do_status(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client(10)?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("{}", format_status(&body, json_output)?);
        }
        Ok(r) => {
            eprintln!("vidscope-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("vidscope-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Upload { file } => do_upload(&server, &file, cli.json),
        Commands::Analyze { file, url } => {
            do_analyze(&server, file.as_deref(), url.as_deref(), cli.json)
        }
        Commands::Details { video_url } => do_details(&server, &video_url, cli.json),
        Commands::Ask {
            question,
            context,
            url,
        } => do_ask(&server, &question, context.as_deref(), url.as_deref(), cli.json),
        Commands::Status => do_status(&server, cli.json),
    };

    if let Err(e) = result {
        eprintln!("vidscope-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
