use std::env;
use std::path::PathBuf;

/// Bandit policy constants, per-request randomness and scoring weights.
#[derive(Debug, Clone, Copy)]
pub struct BanditConfig {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    pub similarity_weight: f64,
    pub bandit_weight: f64,
    pub exploration_rate: f64,
    pub overfetch_factor: usize,
}

impl BanditConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            prior_alpha: env_parse("BANDIT_PRIOR_ALPHA", 2.0)?,
            prior_beta: env_parse("BANDIT_PRIOR_BETA", 2.0)?,
            similarity_weight: env_parse("BANDIT_SIMILARITY_WEIGHT", 0.6)?,
            bandit_weight: env_parse("BANDIT_WEIGHT", 0.4)?,
            exploration_rate: env_parse("BANDIT_EXPLORATION_RATE", 0.15)?,
            overfetch_factor: env_parse("BANDIT_OVERFETCH_FACTOR", 3)?,
        })
    }
}

/// Batch training defaults.
#[derive(Debug, Clone, Copy)]
pub struct TrainerConfig {
    pub default_days: u32,
    pub default_learning_rate: f64,
}

impl TrainerConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            default_days: env_parse("TRAIN_DEFAULT_DAYS", 7)?,
            default_learning_rate: env_parse("TRAIN_DEFAULT_LR", 1.0)?,
        })
    }
}

/// A/B testing defaults and significance thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ABTestSettings {
    pub default_control_pct: u8,
    pub min_sample_per_group: u64,
    pub significance_alpha: f64,
    pub min_relative_effect: f64,
}

impl ABTestSettings {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            default_control_pct: env_parse("AB_DEFAULT_CONTROL_PCT", 50)?,
            min_sample_per_group: env_parse("AB_MIN_SAMPLE_PER_GROUP", 100)?,
            significance_alpha: env_parse("AB_SIGNIFICANCE_ALPHA", 0.05)?,
            min_relative_effect: env_parse("AB_MIN_RELATIVE_EFFECT", 0.05)?,
        })
    }
}

/// Which `Store` backend to construct at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    #[allow(dead_code)]
    Sqlite(String),
}

impl StoreBackend {
    fn from_env() -> Self {
        match env::var("STORE_BACKEND").unwrap_or_default().to_lowercase().as_str() {
            "sqlite" | "sql" => {
                let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://reco.db".into());
                StoreBackend::Sqlite(url)
            }
            _ => StoreBackend::Memory,
        }
    }
}

/// Which `Encoder` implementation to construct at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderBackend {
    Stub,
    #[allow(dead_code)]
    Onnx,
}

impl EncoderBackend {
    fn from_env() -> Self {
        match env::var("ENCODER_BACKEND").unwrap_or_default().to_lowercase().as_str() {
            "onnx" => EncoderBackend::Onnx,
            _ => EncoderBackend::Stub,
        }
    }
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub recommend_k_max: usize,
    pub cache_ttl_secs: i64,
    pub encoder_permits: usize,

    pub store_backend: StoreBackend,
    pub encoder_backend: EncoderBackend,
    pub onnx_model_path: PathBuf,
    pub onnx_tokenizer_path: PathBuf,
    pub onnx_max_sequence_length: usize,

    pub bandit: BanditConfig,
    pub trainer: TrainerConfig,
    pub ab: ABTestSettings,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults,
    /// following the same `VAR -> parse -> fallback` shape throughout.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 8080)?,
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT", 30)?,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT", 10)?,
            recommend_k_max: env_parse("RECOMMEND_K_MAX", 50)?,
            cache_ttl_secs: env_parse("CACHE_TTL_SECS", 600)?,
            encoder_permits: env_parse("ENCODER_PERMITS", num_cores())?,

            store_backend: StoreBackend::from_env(),
            encoder_backend: EncoderBackend::from_env(),
            onnx_model_path: PathBuf::from(
                env::var("ONNX_MODEL_PATH").unwrap_or_else(|_| "./models/bi_encoder.onnx".into()),
            ),
            onnx_tokenizer_path: PathBuf::from(
                env::var("ONNX_TOKENIZER_PATH").unwrap_or_else(|_| "./models/tokenizer.json".into()),
            ),
            onnx_max_sequence_length: env_parse("ONNX_MAX_SEQ_LEN", 256)?,

            bandit: BanditConfig::from_env()?,
            trainer: TrainerConfig::from_env()?,
            ab: ABTestSettings::from_env()?,
        })
    }
}

fn num_cores() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandit_config_defaults_match_spec() {
        let cfg = BanditConfig::from_env().unwrap();
        assert_eq!(cfg.prior_alpha, 2.0);
        assert_eq!(cfg.prior_beta, 2.0);
        assert_eq!(cfg.similarity_weight, 0.6);
        assert_eq!(cfg.bandit_weight, 0.4);
        assert_eq!(cfg.exploration_rate, 0.15);
    }
}
