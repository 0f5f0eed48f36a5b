pub mod config;
pub mod db;
pub mod error;
pub mod gemini;
pub mod media;
pub mod models;
pub mod parser;
pub mod prompts;
pub mod storage;

pub use config::VidscopeConfig;
pub use db::{AnalysisStore, MemoryAnalysisStore, PgAnalysisStore};
pub use error::VidscopeError;
pub use gemini::{GeminiClient, GeminiConfig, GenerationError, GenerativeBackend, Part};
pub use media::{MediaBundle, MediaError, MediaExtractor};
pub use models::analysis::{AnalysisFields, VideoAnalysis};
pub use parser::{parse_analysis, ParseConfidence, ParsedAnalysis};
pub use storage::{MemoryObjectStore, ObjectStore, S3Config, S3ObjectStore, StorageError};
