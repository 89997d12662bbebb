use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the db file, backups, and summary markdown.
    pub data_dir: PathBuf,
    pub db_filename: String,
    pub read_pool_size: usize,
    pub busy_timeout_ms: u32,
    /// Backups pruned beyond this count, oldest first.
    pub max_backups: usize,
    /// Dimension of the vector index; embeddings must match.
    pub vector_dimensions: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".mnemon"),
            db_filename: "memory.db".to_string(),
            read_pool_size: 4,
            busy_timeout_ms: 5000,
            max_backups: 5,
            vector_dimensions: 768,
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_filename)
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.data_dir.join("memory")
    }
}
