use bytes::Bytes;
use vidscope_core::{storage::timestamped_key, ObjectStore, StorageError, VidscopeError};

pub const DEFAULT_TRANSFER_CONTENT_TYPE: &str = "application/octet-stream";

/// Reasons an upload is refused before touching storage.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("Only video files are allowed")]
    NotVideo,

    #[error("File exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },

    #[error("File is empty")]
    Empty,
}

pub fn validate_video(content_type: &str, size: usize, limit: usize) -> Result<(), UploadRejection> {
    if !content_type.trim().to_ascii_lowercase().starts_with("video/") {
        return Err(UploadRejection::NotVideo);
    }
    if size == 0 {
        return Err(UploadRejection::Empty);
    }
    if size > limit {
        return Err(UploadRejection::TooLarge { limit });
    }
    Ok(())
}

/// Store an uploaded video under `videos/{millis}-{name}` and return its URL.
pub async fn store_video(
    objects: &dyn ObjectStore,
    file_name: &str,
    content_type: &str,
    data: Bytes,
) -> Result<String, StorageError> {
    let key = timestamped_key("videos", file_name);
    let url = objects.put(&key, data, content_type).await?;
    tracing::info!(key = %key, url = %url, "Video uploaded");
    Ok(url)
}

/// Copy a file from a temporary blob URL into the object store under
/// `uploads/{millis}-{name}`.
pub async fn transfer_blob(
    client: &reqwest::Client,
    objects: &dyn ObjectStore,
    blob_url: &str,
    file_name: &str,
    content_type: Option<&str>,
) -> Result<String, VidscopeError> {
    let response = client.get(blob_url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(VidscopeError::Other(format!(
            "Failed to fetch file from blob storage: {}",
            status
        )));
    }

    let data = response.bytes().await?;
    let content_type = content_type
        .filter(|ct| !ct.trim().is_empty())
        .unwrap_or(DEFAULT_TRANSFER_CONTENT_TYPE);

    let key = timestamped_key("uploads", file_name);
    let url = objects.put(&key, data, content_type).await?;
    tracing::info!(blob_url = %blob_url, key = %key, "Blob transferred to object storage");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidscope_core::MemoryObjectStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_validate_video_accepts_video_types() {
        assert!(validate_video("video/mp4", 10, 100).is_ok());
        assert!(validate_video("Video/QuickTime", 10, 100).is_ok());
        assert!(validate_video("video/x-matroska", 100, 100).is_ok());
    }

    #[test]
    fn test_validate_video_rejections() {
        assert_eq!(validate_video("image/png", 10, 100), Err(UploadRejection::NotVideo));
        assert_eq!(validate_video("", 10, 100), Err(UploadRejection::NotVideo));
        assert_eq!(validate_video("video/mp4", 0, 100), Err(UploadRejection::Empty));
        assert_eq!(
            validate_video("video/mp4", 101, 100),
            Err(UploadRejection::TooLarge { limit: 100 })
        );
    }

    #[tokio::test]
    async fn test_store_video_uses_timestamped_key() {
        let objects = MemoryObjectStore::new("https://clips.s3.eu-north-1.amazonaws.com");
        let url = store_video(&objects, "my clip.mp4", "video/mp4", Bytes::from_static(b"v"))
            .await
            .unwrap();

        assert!(url.starts_with("https://clips.s3.eu-north-1.amazonaws.com/videos/"));
        assert!(url.ends_with("-my_clip.mp4"));
        let key = objects.key_for_url(&url).unwrap();
        assert_eq!(objects.content_type(&key).await.as_deref(), Some("video/mp4"));
    }

    #[tokio::test]
    async fn test_transfer_blob_copies_bytes() {
        let blob = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"blob-bytes".to_vec()))
            .mount(&blob)
            .await;

        let objects = MemoryObjectStore::new("https://mem.local");
        let url = transfer_blob(
            &reqwest::Client::new(),
            &objects,
            &format!("{}/blob/abc", blob.uri()),
            "clip.mp4",
            None,
        )
        .await
        .unwrap();

        let key = objects.key_for_url(&url).unwrap();
        assert!(key.starts_with("uploads/"));
        assert_eq!(objects.get(&key).await.unwrap(), Bytes::from_static(b"blob-bytes"));
        assert_eq!(
            objects.content_type(&key).await.as_deref(),
            Some(DEFAULT_TRANSFER_CONTENT_TYPE)
        );
    }

    #[tokio::test]
    async fn test_transfer_blob_fails_on_http_error() {
        let blob = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&blob)
            .await;

        let objects = MemoryObjectStore::new("https://mem.local");
        let result = transfer_blob(
            &reqwest::Client::new(),
            &objects,
            &format!("{}/missing", blob.uri()),
            "clip.mp4",
            Some("video/mp4"),
        )
        .await;

        assert!(matches!(result, Err(VidscopeError::Other(_))));
        assert!(objects.keys().await.is_empty());
    }
}
