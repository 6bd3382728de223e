//! API configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mirage_models::CompressionSettings;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Upload rate limit per client IP (requests per second)
    pub rate_limit_rps: u32,
    /// Upload rate limit burst
    pub rate_limit_burst: u32,
    /// Request timeout, covering upload and processing
    pub request_timeout: Duration,
    /// Max upload body size in bytes
    pub max_upload_size: usize,
    /// Where uploads are stored
    pub upload_dir: PathBuf,
    /// Where processed outputs are stored
    pub processed_dir: PathBuf,
    /// Compressions allowed to run at once
    pub max_concurrent_jobs: usize,
    /// Time limit for one compression
    pub processing_timeout: Duration,
    /// Serve Prometheus metrics at /metrics
    pub metrics_enabled: bool,
    /// Environment (development/production)
    pub environment: String,
    /// Pipeline tunables
    pub compression: CompressionSettings,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5328,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 2,
            rate_limit_burst: 5,
            request_timeout: Duration::from_secs(3600),
            max_upload_size: 2 * 1024 * 1024 * 1024, // 2GB
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed"),
            max_concurrent_jobs: 2,
            processing_timeout: Duration::from_secs(1800),
            metrics_enabled: true,
            environment: "development".to_string(),
            compression: CompressionSettings::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>, fallback: T) -> T {
            value.and_then(|v| v.trim().parse().ok()).unwrap_or(fallback)
        }

        let d = Self::default();
        Self {
            host: lookup("API_HOST").unwrap_or(d.host),
            port: parsed(lookup("API_PORT"), d.port),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(d.cors_origins),
            rate_limit_rps: parsed(lookup("RATE_LIMIT_RPS"), d.rate_limit_rps),
            rate_limit_burst: parsed(lookup("RATE_LIMIT_BURST"), d.rate_limit_burst),
            request_timeout: Duration::from_secs(parsed(
                lookup("REQUEST_TIMEOUT"),
                d.request_timeout.as_secs(),
            )),
            max_upload_size: parsed(lookup("MAX_UPLOAD_SIZE"), d.max_upload_size),
            upload_dir: lookup("UPLOAD_DIR").map(PathBuf::from).unwrap_or(d.upload_dir),
            processed_dir: lookup("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.processed_dir),
            max_concurrent_jobs: parsed(lookup("MAX_CONCURRENT_JOBS"), d.max_concurrent_jobs)
                .max(1),
            processing_timeout: Duration::from_secs(parsed(
                lookup("PROCESSING_TIMEOUT"),
                d.processing_timeout.as_secs(),
            )),
            metrics_enabled: lookup("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(d.metrics_enabled),
            environment: lookup("ENVIRONMENT").unwrap_or(d.environment),
            compression: CompressionSettings::from_lookup(&lookup),
        }
    }

    /// Make the storage directories absolute and create them.
    pub fn prepare_dirs(&mut self) -> std::io::Result<()> {
        self.upload_dir = absolute(&self.upload_dir)?;
        self.processed_dir = absolute(&self.processed_dir)?;
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.processed_dir)?;
        Ok(())
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        is_production_environment(&self.environment)
    }
}

/// `production` in any letter case.
pub fn is_production_environment(environment: &str) -> bool {
    environment.trim().eq_ignore_ascii_case("production")
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ApiConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 5328);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.processed_dir, PathBuf::from("processed"));
        assert_eq!(config.cors_origins, vec!["*"]);
        assert!(!config.is_production());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("API_PORT", "9000"),
            ("CORS_ORIGINS", "http://localhost:3000, https://mirage.example"),
            ("MAX_CONCURRENT_JOBS", "0"),
            ("METRICS_ENABLED", "false"),
            ("ENVIRONMENT", "Production"),
            ("MIRAGE_CRF", "28"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "https://mirage.example"]
        );
        assert_eq!(config.max_concurrent_jobs, 1);
        assert!(!config.metrics_enabled);
        assert!(config.is_production());
        assert_eq!(config.compression.crf, 28);
    }

    #[test]
    fn test_prepare_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = ApiConfig {
            upload_dir: dir.path().join("up"),
            processed_dir: dir.path().join("out"),
            ..Default::default()
        };
        config.prepare_dirs().unwrap();
        assert!(config.upload_dir.is_dir());
        assert!(config.processed_dir.is_dir());
    }
}
