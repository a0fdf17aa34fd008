use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub refinement: RefinementConfig,
    pub retrieval: RetrievalConfig,
    /// Default for the per-request fast-mode flag
    pub fast_mode: bool,
}

/// Text-generation service configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Refinement loop configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementConfig {
    /// Upper bound on iterations, counting the initial answer as iteration 1
    pub max_iterations: usize,
    /// Answers scoring below this are refined
    pub quality_threshold: f64,
    /// Smaller gains than this count as a plateau
    pub min_quality_improvement: f64,
    /// A drop larger than this counts as degradation
    pub plateau_tolerance: f64,
}

/// Pattern retrieval configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub n_results: usize,
    pub min_quality: f64,
    pub min_similarity: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "llama3:8b".to_string()),
            temperature: parse_env("LLM_TEMPERATURE", 0.7),
            max_tokens: parse_env("LLM_MAX_TOKENS", 1000),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/patterns.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 120_000),
            max_retries: parse_env("MAX_RETRIES", 3),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", 1000),
        };

        let refinement = RefinementConfig {
            max_iterations: parse_env("REFINEMENT_MAX_ITERATIONS", 3),
            quality_threshold: parse_env("REFINEMENT_QUALITY_THRESHOLD", 0.8),
            min_quality_improvement: parse_env("REFINEMENT_MIN_IMPROVEMENT", 0.01),
            plateau_tolerance: parse_env("REFINEMENT_PLATEAU_TOLERANCE", 0.02),
        };

        let retrieval = RetrievalConfig {
            n_results: parse_env("PATTERN_RETRIEVAL_COUNT", 3),
            min_quality: parse_env("PATTERN_MIN_QUALITY", 0.7),
            min_similarity: parse_env("PATTERN_MIN_SIMILARITY", 0.5),
        };

        let fast_mode = env::var("FAST_MODE")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let config = Config {
            llm,
            database,
            logging,
            request,
            refinement,
            retrieval,
            fast_mode,
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject contract violations before any query is processed
    pub fn validate(&self) -> Result<(), AppError> {
        if self.llm.model.trim().is_empty() {
            return Err(config_error("LLM_MODEL must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(config_error("LLM_TEMPERATURE must be within [0, 2]"));
        }
        if self.database.max_connections == 0 {
            return Err(config_error("DATABASE_MAX_CONNECTIONS must be at least 1"));
        }
        self.refinement.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }
}

impl RefinementConfig {
    /// Validate thresholds; called by every constructor that accepts this config
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_iterations == 0 {
            return Err(config_error("refinement max_iterations must be at least 1"));
        }
        ensure_unit("refinement quality_threshold", self.quality_threshold)?;
        if !self.min_quality_improvement.is_finite() || self.min_quality_improvement < 0.0 {
            return Err(config_error(
                "refinement min_quality_improvement must be non-negative",
            ));
        }
        if !self.plateau_tolerance.is_finite() || self.plateau_tolerance < 0.0 {
            return Err(config_error("refinement plateau_tolerance must be non-negative"));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    /// Validate retrieval bounds
    pub fn validate(&self) -> Result<(), AppError> {
        if self.n_results == 0 {
            return Err(config_error("pattern retrieval count must be at least 1"));
        }
        ensure_unit("pattern min_quality", self.min_quality)?;
        ensure_unit("pattern min_similarity", self.min_similarity)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            request: RequestConfig::default(),
            refinement: RefinementConfig::default(),
            retrieval: RetrievalConfig::default(),
            fast_mode: false,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3:8b".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/patterns.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            quality_threshold: 0.8,
            min_quality_improvement: 0.01,
            plateau_tolerance: 0.02,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_results: 3,
            min_quality: 0.7,
            min_similarity: 0.5,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn ensure_unit(name: &str, value: f64) -> Result<(), AppError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(&format!("{} must be within [0, 1], got {}", name, value)))
    }
}

fn config_error(message: &str) -> AppError {
    AppError::Config {
        message: message.to_string(),
    }
}
