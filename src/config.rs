use clap::Parser;
use rand::Rng;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vidshare", about = "A video-sharing REST backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub assets: AssetsConfig,
    pub pagination: PaginationConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `production` turns on the `Secure` cookie attribute.
    pub environment: String,
    pub cors_origin: Option<String>,
    pub max_upload_mb: usize,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Where incoming multipart files are staged before they go to the asset store.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub access_token_secret: Option<String>,
    pub access_token_minutes: i64,
    pub refresh_token_secret: Option<String>,
    pub refresh_token_days: i64,
    pub bcrypt_cost: u32,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetProvider {
    #[default]
    Local,
    Cloudinary,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AssetsConfig {
    pub provider: AssetProvider,
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Directory the local provider copies media into.
    pub local_root: Option<PathBuf>,
    pub public_base_url: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            environment: "development".to_string(),
            cors_origin: None,
            max_upload_mb: 200,
        }
    }
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: None,
            access_token_minutes: 24 * 60,
            refresh_token_secret: None,
            refresh_token_days: 10,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            provider: AssetProvider::Local,
            cloud_name: None,
            api_key: None,
            api_secret: None,
            local_root: None,
            public_base_url: "http://localhost:8000/media".to_string(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        config.resolve_paths(&data_dir);
        config.ensure_secrets();

        if config.assets.provider == AssetProvider::Cloudinary
            && (config.assets.cloud_name.is_none()
                || config.assets.api_key.is_none()
                || config.assets.api_secret.is_none())
        {
            anyhow::bail!("assets.provider = \"cloudinary\" needs cloud_name, api_key and api_secret");
        }

        Ok(config)
    }

    /// Secrets from the environment take precedence over the config file.
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = var("VIDSHARE_ACCESS_TOKEN_SECRET") {
            self.auth.access_token_secret = Some(secret);
        }
        if let Some(secret) = var("VIDSHARE_REFRESH_TOKEN_SECRET") {
            self.auth.refresh_token_secret = Some(secret);
        }
        if let Some(name) = var("CLOUDINARY_CLOUD_NAME") {
            self.assets.cloud_name = Some(name);
        }
        if let Some(key) = var("CLOUDINARY_API_KEY") {
            self.assets.api_key = Some(key);
        }
        if let Some(secret) = var("CLOUDINARY_API_SECRET") {
            self.assets.api_secret = Some(secret);
        }
    }

    /// Fill in every path that was left unset, relative to the data directory.
    pub fn resolve_paths(&mut self, data_dir: &std::path::Path) {
        if self.database.path.is_none() {
            self.database.path = Some(data_dir.join("vidshare.db"));
        }
        if self.storage.path.is_none() {
            self.storage.path = Some(data_dir.join("uploads"));
        }
        if self.assets.local_root.is_none() {
            self.assets.local_root = Some(data_dir.join("media"));
        }
    }

    /// Generate throwaway signing secrets when none are configured. Tokens
    /// issued with them stop validating after a restart.
    fn ensure_secrets(&mut self) {
        if self.auth.access_token_secret.is_none() {
            tracing::warn!("auth.access_token_secret not set, generating an ephemeral one");
            self.auth.access_token_secret = Some(random_secret());
        }
        if self.auth.refresh_token_secret.is_none() {
            tracing::warn!("auth.refresh_token_secret not set, generating an ephemeral one");
            self.auth.refresh_token_secret = Some(random_secret());
        }
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".vidshare")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("vidshare.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("vidshare-uploads"))
    }

    pub fn media_path(&self) -> PathBuf {
        self.assets
            .local_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("media"))
    }

    /// Config for tests and embedding: defaults, paths under `data_dir`,
    /// fixed secrets.
    pub fn for_data_dir(data_dir: &std::path::Path) -> Self {
        let mut config = Config::default();
        config.resolve_paths(data_dir);
        config.auth.access_token_secret = Some("test-access-secret".to_string());
        config.auth.refresh_token_secret = Some("test-refresh-secret".to_string());
        config.auth.bcrypt_cost = 4;
        config
    }
}

fn random_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
