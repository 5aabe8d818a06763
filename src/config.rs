use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_UPLOAD_EXTENSIONS: &str = ".jpg,.jpeg,.png,.gif,.webp,.avi,.mov,.mp4,.webm";
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
    #[error("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long")]
    WeakSecret,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3/MinIO endpoint; unset means the AWS default resolver.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub presign_ttl: Duration,
    /// Keep blobs on the local filesystem instead of S3.
    pub local_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub rows_per_page: u32,
    pub upload_folder: PathBuf,
    /// Lowercase, dot-prefixed.
    pub upload_extensions: Vec<String>,
    pub max_upload_bytes: usize,
    pub storage: StorageConfig,
    pub enable_hsts: bool,
    pub jwt_secret: String,
    pub bootstrap_user: Option<(String, String)>,
}

fn parse<T: std::str::FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

fn flag(raw: Option<String>) -> bool {
    raw.map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| if e.starts_with('.') { e } else { format!(".{e}") })
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        let mut cfg = Self::with_secret(jwt_secret);

        cfg.rows_per_page = parse("ROWS_PER_PAGE", get("ROWS_PER_PAGE"), cfg.rows_per_page)?;
        if cfg.rows_per_page == 0 {
            return Err(ConfigError::Invalid { var: "ROWS_PER_PAGE", value: "0".into() });
        }
        cfg.max_upload_bytes = parse("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), cfg.max_upload_bytes)?;
        if let Some(raw) = get("UPLOAD_EXTENSIONS") {
            cfg.upload_extensions = parse_extensions(&raw);
        }
        if let Some(addr) = get("BIND_ADDR") {
            cfg.bind_addr = addr;
        }
        if let Some(dir) = get("UPLOAD_FOLDER") {
            cfg.upload_folder = PathBuf::from(dir);
        }
        cfg.database_url = get("DATABASE_URL");
        cfg.data_dir = get("GALLERY_DATA_DIR").map(PathBuf::from);
        cfg.enable_hsts = flag(get("ENABLE_HSTS"));
        cfg.bootstrap_user = match (get("BOOTSTRAP_USER"), get("BOOTSTRAP_PASSWORD")) {
            (Some(user), Some(password)) => Some((user, password)),
            (Some(_), None) => return Err(ConfigError::Missing("BOOTSTRAP_PASSWORD")),
            _ => None,
        };

        let storage = &mut cfg.storage;
        storage.endpoint = get("S3_ENDPOINT");
        if let Some(region) = get("S3_REGION") {
            storage.region = region;
        }
        if let Some(bucket) = get("S3_BUCKET") {
            storage.bucket = bucket;
        }
        storage.access_key = get("S3_ACCESS_KEY");
        storage.secret_key = get("S3_SECRET_KEY");
        let ttl = parse("PRESIGN_TTL_SECS", get("PRESIGN_TTL_SECS"), storage.presign_ttl.as_secs())?;
        storage.presign_ttl = Duration::from_secs(ttl);
        storage.local_dir = get("STORAGE_DIR").map(PathBuf::from);

        Ok(cfg)
    }

    /// Defaults for everything but the signing secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            database_url: None,
            data_dir: None,
            rows_per_page: 20,
            upload_folder: std::env::temp_dir(),
            upload_extensions: parse_extensions(DEFAULT_UPLOAD_EXTENSIONS),
            max_upload_bytes: 100 * 1024 * 1024,
            storage: StorageConfig {
                endpoint: None,
                region: "us-east-1".into(),
                bucket: "gallery-attachments".into(),
                access_key: None,
                secret_key: None,
                presign_ttl: Duration::from_secs(3600),
                local_dir: None,
            },
            enable_hsts: false,
            jwt_secret: secret.into(),
            bootstrap_user: None,
        }
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.upload_extensions.iter().any(|e| *e == extension)
    }
}
