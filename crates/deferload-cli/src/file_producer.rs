//! File-backed producer.

use async_trait::async_trait;
use std::path::PathBuf;

use deferload_runtime::{LoadError, Producer};

/// Reads a file as UTF-8 text on every attempt.
#[derive(Debug, Clone)]
pub struct FileProducer {
    path: PathBuf,
}

impl FileProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Producer<String> for FileProducer {
    async fn produce(&self) -> Result<String, LoadError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| LoadError::attempt(format!("{}: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_existing_file() {
        let path = std::env::temp_dir().join(format!("deferload-cli-{}.txt", std::process::id()));
        tokio::fs::write(&path, "hello").await.unwrap();

        let producer = FileProducer::new(&path);
        assert_eq!(producer.produce().await.unwrap(), "hello");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_names_path() {
        let producer = FileProducer::new("/definitely/not/here.js");
        let err = producer.produce().await.unwrap_err();
        assert!(err.message().contains("/definitely/not/here.js"));
        assert_eq!(producer.describe(), "/definitely/not/here.js");
    }
}
