use std::{env, net::SocketAddr, num::NonZeroUsize, time::Duration};

use thiserror::Error;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    max_concurrent_jobs: NonZeroUsize,
    job_retention_secs: u64,
    event_bus_buffer_size: usize,

    search_api_key: String,
    search_base_url: String,
    search_timeout: Duration,

    extract_api_key: String,
    extract_base_url: String,
    extract_timeout: Duration,

    rerank_api_key: Option<String>,
    rerank_base_url: String,
    rerank_timeout: Duration,

    llm_api_key: String,
    llm_base_url: String,
    llm_model: String,
    llm_timeout: Duration,

    curation_score_threshold: f64,
    curation_max_references: usize,

    http_max_retries: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,

    otel_exporter_endpoint: Option<String>,
    otel_sampling_ratio: f64,

    persistence_dsn: Option<String>,
    persistence_max_connections: u32,
    persistence_min_connections: u32,
    persistence_acquire_timeout: Duration,
    persistence_idle_timeout: Duration,
    persistence_max_lifetime: Duration,

    pdf_render_base_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Load and validate the worker's configuration from the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] for absent required keys and
    /// [`ConfigError::Invalid`] when a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("RESEARCH_HTTP_BIND", "0.0.0.0:9005")?;
        let max_concurrent_jobs = parse_non_zero_usize("MAX_CONCURRENT_JOBS", 4)?;
        let job_retention_secs = parse_u64("JOB_RETENTION_SECS", 86_400)?;
        let event_bus_buffer_size = parse_usize("EVENT_BUS_BUFFER_SIZE", 256)?;

        let search_api_key = env_var("SEARCH_API_KEY")?;
        let search_base_url = env::var("SEARCH_BASE_URL")
            .unwrap_or_else(|_| "https://api.tavily.com".to_string());
        let search_timeout = parse_duration_secs("SEARCH_TIMEOUT_SECS", 30)?;

        let extract_api_key =
            env::var("EXTRACT_API_KEY").unwrap_or_else(|_| search_api_key.clone());
        let extract_base_url = env::var("EXTRACT_BASE_URL").unwrap_or_else(|_| search_base_url.clone());
        let extract_timeout = parse_duration_secs("EXTRACT_TIMEOUT_SECS", 60)?;

        let rerank_api_key = env::var("RERANK_API_KEY").ok();
        let rerank_base_url = env::var("RERANK_BASE_URL")
            .unwrap_or_else(|_| "https://api.cohere.com".to_string());
        let rerank_timeout = parse_duration_secs("RERANK_TIMEOUT_SECS", 20)?;

        let llm_api_key = env_var("LLM_API_KEY")?;
        let llm_base_url = env_var("LLM_BASE_URL")?;
        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let llm_timeout = parse_duration_secs("LLM_TIMEOUT_SECS", 120)?;

        let curation_score_threshold = parse_f64("CURATION_SCORE_THRESHOLD", 0.4)?;
        let curation_max_references = parse_usize("CURATION_MAX_REFERENCES", 10)?;

        let http_max_retries = parse_usize("HTTP_MAX_RETRIES", 3)?;
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", 250)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", 10_000)?;

        let otel_exporter_endpoint = env::var("OTEL_EXPORTER_ENDPOINT").ok();
        let otel_sampling_ratio = parse_f64("OTEL_SAMPLING_RATIO", 1.0)?;

        let persistence_dsn = env::var("PERSISTENCE_DATABASE_URL").ok();
        let persistence_max_connections = parse_u32("PERSISTENCE_MAX_CONNECTIONS", 10)?;
        let persistence_min_connections = parse_u32("PERSISTENCE_MIN_CONNECTIONS", 1)?;
        let persistence_acquire_timeout =
            parse_duration_secs("PERSISTENCE_ACQUIRE_TIMEOUT_SECS", 30)?;
        let persistence_idle_timeout = parse_duration_secs("PERSISTENCE_IDLE_TIMEOUT_SECS", 600)?;
        let persistence_max_lifetime =
            parse_duration_secs("PERSISTENCE_MAX_LIFETIME_SECS", 1800)?;

        let pdf_render_base_url = env::var("PDF_RENDER_BASE_URL").ok();

        Ok(Self {
            http_bind,
            max_concurrent_jobs,
            job_retention_secs,
            event_bus_buffer_size,
            search_api_key,
            search_base_url,
            search_timeout,
            extract_api_key,
            extract_base_url,
            extract_timeout,
            rerank_api_key,
            rerank_base_url,
            rerank_timeout,
            llm_api_key,
            llm_base_url,
            llm_model,
            llm_timeout,
            curation_score_threshold,
            curation_max_references,
            http_max_retries,
            http_backoff_base_ms,
            http_backoff_cap_ms,
            otel_exporter_endpoint,
            otel_sampling_ratio,
            persistence_dsn,
            persistence_max_connections,
            persistence_min_connections,
            persistence_acquire_timeout,
            persistence_idle_timeout,
            persistence_max_lifetime,
            pdf_render_base_url,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn max_concurrent_jobs(&self) -> NonZeroUsize {
        self.max_concurrent_jobs
    }

    #[must_use]
    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    #[must_use]
    pub fn event_bus_buffer_size(&self) -> usize {
        self.event_bus_buffer_size
    }

    #[must_use]
    pub fn search_api_key(&self) -> &str {
        &self.search_api_key
    }

    #[must_use]
    pub fn search_base_url(&self) -> &str {
        &self.search_base_url
    }

    #[must_use]
    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    #[must_use]
    pub fn extract_api_key(&self) -> &str {
        &self.extract_api_key
    }

    #[must_use]
    pub fn extract_base_url(&self) -> &str {
        &self.extract_base_url
    }

    #[must_use]
    pub fn extract_timeout(&self) -> Duration {
        self.extract_timeout
    }

    #[must_use]
    pub fn rerank_api_key(&self) -> Option<&str> {
        self.rerank_api_key.as_deref()
    }

    #[must_use]
    pub fn rerank_base_url(&self) -> &str {
        &self.rerank_base_url
    }

    #[must_use]
    pub fn rerank_timeout(&self) -> Duration {
        self.rerank_timeout
    }

    #[must_use]
    pub fn llm_api_key(&self) -> &str {
        &self.llm_api_key
    }

    #[must_use]
    pub fn llm_base_url(&self) -> &str {
        &self.llm_base_url
    }

    #[must_use]
    pub fn llm_model(&self) -> &str {
        &self.llm_model
    }

    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        self.llm_timeout
    }

    #[must_use]
    pub fn curation_score_threshold(&self) -> f64 {
        self.curation_score_threshold
    }

    #[must_use]
    pub fn curation_max_references(&self) -> usize {
        self.curation_max_references
    }

    #[must_use]
    pub fn http_max_retries(&self) -> usize {
        self.http_max_retries
    }

    #[must_use]
    pub fn http_backoff_base_ms(&self) -> u64 {
        self.http_backoff_base_ms
    }

    #[must_use]
    pub fn http_backoff_cap_ms(&self) -> u64 {
        self.http_backoff_cap_ms
    }

    #[must_use]
    pub fn otel_exporter_endpoint(&self) -> Option<&str> {
        self.otel_exporter_endpoint.as_deref()
    }

    #[must_use]
    pub fn otel_sampling_ratio(&self) -> f64 {
        self.otel_sampling_ratio
    }

    #[must_use]
    pub fn persistence_dsn(&self) -> Option<&str> {
        self.persistence_dsn.as_deref()
    }

    #[must_use]
    pub fn persistence_max_connections(&self) -> u32 {
        self.persistence_max_connections
    }

    #[must_use]
    pub fn persistence_min_connections(&self) -> u32 {
        self.persistence_min_connections
    }

    #[must_use]
    pub fn persistence_acquire_timeout(&self) -> Duration {
        self.persistence_acquire_timeout
    }

    #[must_use]
    pub fn persistence_idle_timeout(&self) -> Duration {
        self.persistence_idle_timeout
    }

    #[must_use]
    pub fn persistence_max_lifetime(&self) -> Duration {
        self.persistence_max_lifetime
    }

    #[must_use]
    pub fn pdf_render_base_url(&self) -> Option<&str> {
        self.pdf_render_base_url.as_deref()
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    parse_u64(name, default_secs).map(Duration::from_secs)
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}
