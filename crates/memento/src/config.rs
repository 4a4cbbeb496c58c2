// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Typed configuration (spec §6.5), loaded from environment variables
//! (prefixed `MEMENTO_`, double-underscore nested) layered over an
//! optional TOML file, with a `Default` for every field that has a
//! spec-given default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn duration_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfigSection {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfigSection {
    fn default() -> Self {
        Self {
            model: "null-pseudo-embedding".to_string(),
            dimensions: 256,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfigSection {
    pub partition_count: usize,
    pub max_size: usize,
    pub backpressure_threshold: usize,
    pub partition_strategy: String,
}

impl Default for QueueConfigSection {
    fn default() -> Self {
        Self {
            partition_count: 8,
            max_size: 10_000,
            backpressure_threshold: 50_000,
            partition_strategy: "round_robin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfigSection {
    pub min: u32,
    pub max: u32,
    #[serde(with = "duration_as_secs")]
    pub timeout: Duration,
}

impl Default for WorkersConfigSection {
    fn default() -> Self {
        Self {
            min: 2,
            max: 16,
            timeout: duration_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoScaleConfigSection {
    pub enabled: bool,
    pub scale_up_threshold: usize,
    pub scale_down_threshold: usize,
}

impl Default for AutoScaleConfigSection {
    fn default() -> Self {
        Self {
            enabled: true,
            scale_up_threshold: 1000,
            scale_down_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubChannelsSection {
    pub global: String,
    pub session: String,
}

impl Default for PubSubChannelsSection {
    fn default() -> Self {
        Self {
            global: "sessions:global".to_string(),
            session: "sessions:{id}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfigSection {
    #[serde(with = "duration_as_secs")]
    pub default_ttl: Duration,
    #[serde(with = "duration_as_secs")]
    pub checkpoint_interval: Duration,
    #[serde(with = "duration_as_secs")]
    pub grace_ttl: Duration,
    pub pub_sub_channels: PubSubChannelsSection,
}

impl Default for SessionConfigSection {
    fn default() -> Self {
        Self {
            default_ttl: duration_secs(3600),
            checkpoint_interval: duration_secs(300),
            grace_ttl: duration_secs(600),
            pub_sub_channels: PubSubChannelsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConnectionsSection {
    pub graph: Option<String>,
    pub relational: Option<String>,
    pub kv: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MementoConfig {
    pub max_trend_data_points: usize,
    pub flakiness_threshold: f32,
    pub batch_size: usize,
    pub history_retention_days: u32,
    pub history_enabled: bool,
    pub embedding: EmbeddingConfigSection,
    pub queue: QueueConfigSection,
    pub workers: WorkersConfigSection,
    pub auto_scale: AutoScaleConfigSection,
    pub session: SessionConfigSection,
    pub stores: StoreConnectionsSection,
}

impl Default for MementoConfig {
    fn default() -> Self {
        Self {
            max_trend_data_points: 90,
            flakiness_threshold: 0.2,
            batch_size: 25,
            history_retention_days: 90,
            history_enabled: true,
            embedding: EmbeddingConfigSection::default(),
            queue: QueueConfigSection::default(),
            workers: WorkersConfigSection::default(),
            auto_scale: AutoScaleConfigSection::default(),
            session: SessionConfigSection::default(),
            stores: StoreConnectionsSection::default(),
        }
    }
}

impl MementoConfig {
    /// Loads config layered `defaults < TOML file (if present) < MEMENTO_*
    /// environment overrides`.
    pub fn load(toml_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = toml_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MEMENTO")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}

mod duration_as_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_given_values() {
        let config = MementoConfig::default();
        assert_eq!(config.queue.partition_count, 8);
        assert_eq!(config.workers.min, 2);
        assert_eq!(config.workers.max, 16);
        assert_eq!(config.embedding.dimensions, 256);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let config = MementoConfig::load(None).unwrap();
        assert_eq!(config.queue.backpressure_threshold, 50_000);
    }
}
