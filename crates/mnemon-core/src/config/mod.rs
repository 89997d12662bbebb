pub mod chunker_config;
pub mod llm_config;
pub mod maintenance_config;
pub mod pipeline_config;
pub mod recall_config;
pub mod retention_config;
pub mod storage_config;

use serde::{Deserialize, Serialize};

pub use chunker_config::ChunkerConfig;
pub use llm_config::LlmConfig;
pub use maintenance_config::{MaintenanceConfig, MaintenanceMode};
pub use pipeline_config::PipelineConfig;
pub use recall_config::RecallConfig;
pub use retention_config::RetentionConfig;
pub use storage_config::StorageConfig;

/// Top-level configuration aggregating all subsystem configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MnemonConfig {
    pub storage: StorageConfig,
    pub chunker: ChunkerConfig,
    pub pipeline: PipelineConfig,
    pub recall: RecallConfig,
    pub maintenance: MaintenanceConfig,
    pub retention: RetentionConfig,
    pub llm: LlmConfig,
}

impl MnemonConfig {
    /// Load config from a TOML string, falling back to defaults for
    /// missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let cfg = MnemonConfig::from_toml("").unwrap();
        assert_eq!(cfg.chunker.max_tokens, 2000);
        assert_eq!(cfg.pipeline.worker_poll_ms, 2000);
        assert!(!cfg.pipeline.shadow_mode);
    }

    #[test]
    fn test_partial_override() {
        let cfg = MnemonConfig::from_toml(
            "[pipeline]\nshadow_mode = true\nmin_fact_confidence_for_write = 0.9\n",
        )
        .unwrap();
        assert!(cfg.pipeline.shadow_mode);
        assert!((cfg.pipeline.min_fact_confidence_for_write - 0.9).abs() < f64::EPSILON);
        // Untouched sections keep defaults.
        assert_eq!(cfg.storage.read_pool_size, 4);
    }
}
