use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

use crate::delay::DelayConfig;
use crate::error::ScraperError;

pub const DEFAULT_DOMAIN: &str = "amazon.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const ENV_TEMPLATE: &str = "# Amazon Credentials
# Copy this file to .env and fill in your credentials
AMAZON_EMAIL=your_email@example.com
AMAZON_PASSWORD=your_password_here

# Optional Settings
# HEADLESS=false  # Set to true for headless browsing
# TIMEOUT=30
# MAX_RETRIES=3
# AMAZON_DOMAIN=amazon.com
# OUTPUT_DIR=/path/to/output
";

/// ログイン認証情報
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

// パスワードをログに出さない
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// 対象マーケットプレイス（国 → ドメイン）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Marketplace {
    #[default]
    Us,
    Germany,
    Canada,
    Japan,
    Australia,
    Brazil,
    Mexico,
    Netherlands,
}

impl Marketplace {
    pub const ALL: [Marketplace; 8] = [
        Marketplace::Us,
        Marketplace::Germany,
        Marketplace::Canada,
        Marketplace::Japan,
        Marketplace::Australia,
        Marketplace::Brazil,
        Marketplace::Mexico,
        Marketplace::Netherlands,
    ];

    pub fn domain(&self) -> &'static str {
        match self {
            Marketplace::Us => "amazon.com",
            Marketplace::Germany => "amazon.de",
            Marketplace::Canada => "amazon.ca",
            Marketplace::Japan => "amazon.co.jp",
            Marketplace::Australia => "amazon.com.au",
            Marketplace::Brazil => "amazon.com.br",
            Marketplace::Mexico => "amazon.com.mx",
            Marketplace::Netherlands => "amazon.nl",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Marketplace::Us => "US",
            Marketplace::Germany => "Germany",
            Marketplace::Canada => "Canada",
            Marketplace::Japan => "Japan",
            Marketplace::Australia => "Australia",
            Marketplace::Brazil => "Brazil",
            Marketplace::Mexico => "Mexico",
            Marketplace::Netherlands => "Netherlands",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Marketplace {
    type Err = ScraperError;

    /// 国名・国コード・ドメインのいずれも受け付ける
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        let alias = match needle.as_str() {
            "us" | "usa" => Some(Marketplace::Us),
            "de" => Some(Marketplace::Germany),
            "ca" => Some(Marketplace::Canada),
            "jp" => Some(Marketplace::Japan),
            "au" => Some(Marketplace::Australia),
            "br" => Some(Marketplace::Brazil),
            "mx" => Some(Marketplace::Mexico),
            "nl" => Some(Marketplace::Netherlands),
            _ => None,
        };
        if let Some(m) = alias {
            return Ok(m);
        }
        let needle = needle.trim_start_matches("www.");
        Marketplace::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(needle) || m.domain() == needle)
            .ok_or_else(|| ScraperError::Config(format!("未対応のマーケットプレイス: {}", s)))
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub credentials: Option<Credentials>,
    pub domain: String,
    pub headless: bool,
    pub timeout: Duration,
    pub max_retries: u32,
    pub output_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub debug: bool,
    pub delays: DelayConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            domain: DEFAULT_DOMAIN.to_string(),
            headless: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            output_dir: default_output_dir(),
            chrome_path: None,
            debug: false,
            delays: DelayConfig::default(),
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `.env` を読み込んだ上で環境変数から設定を構築
    pub fn from_env() -> Result<Self, ScraperError> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {:?}", path),
            Err(e) => debug!("No .env loaded: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から設定を構築
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ScraperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let (Some(email), Some(password)) = (get("AMAZON_EMAIL"), get("AMAZON_PASSWORD")) {
            config.credentials = Some(Credentials::new(email, password));
        }

        if let Some(value) = get("HEADLESS") {
            config.headless = parse_bool("HEADLESS", &value)?;
        }

        if let Some(value) = get("TIMEOUT") {
            let secs: u64 = value
                .parse()
                .map_err(|_| ScraperError::Config(format!("TIMEOUT が不正です: {}", value)))?;
            config.timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(value) = get("MAX_RETRIES") {
            let retries: u32 = value
                .parse()
                .map_err(|_| ScraperError::Config(format!("MAX_RETRIES が不正です: {}", value)))?;
            config.max_retries = retries.max(1);
        }

        if let Some(value) = get("AMAZON_DOMAIN") {
            config.domain = value.parse::<Marketplace>()?.domain().to_string();
        }

        if let Some(value) = get("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(value);
        }

        config.chrome_path = get("CHROME_PATH")
            .or_else(|| get("CHROMIUM_PATH"))
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn with_credentials(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(email, password));
        self
    }

    pub fn with_marketplace(mut self, marketplace: Marketplace) -> Self {
        self.domain = marketplace.domain().to_string();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_delays(mut self, delays: DelayConfig) -> Self {
        self.delays = delays;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ScraperError> {
    // 行末コメント（`false  # ...`）を許容
    let token = value.split('#').next().unwrap_or_default().trim();
    match token.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ScraperError::Config(format!("{} が不正です: {}", key, value))),
    }
}

/// 出力先のデフォルト（デスクトップ、無ければカレントディレクトリ）
pub fn default_output_dir() -> PathBuf {
    dirs::desktop_dir()
        .filter(|p| p.is_dir())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `.env.template` を作成。既に存在する場合は何もせず `false`
pub fn write_env_template(path: &Path) -> Result<bool, ScraperError> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, ENV_TEMPLATE)?;
    info!("Created env template at {:?}", path);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_builder() {
        let config = ScraperConfig::new()
            .with_credentials("user@example.com", "pass")
            .with_headless(false)
            .with_marketplace(Marketplace::Japan)
            .with_output_dir("/tmp/reviews")
            .with_timeout(Duration::from_secs(120));

        assert!(config.has_credentials());
        assert!(!config.headless);
        assert_eq!(config.domain, "amazon.co.jp");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/reviews"));
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_from_lookup_reads_all_keys() {
        let config = ScraperConfig::from_lookup(lookup(&[
            ("AMAZON_EMAIL", "me@example.com"),
            ("AMAZON_PASSWORD", "secret"),
            ("HEADLESS", "false  # Set to true for headless browsing"),
            ("TIMEOUT", "45"),
            ("MAX_RETRIES", "3"),
            ("AMAZON_DOMAIN", "Germany"),
        ]))
        .unwrap();

        let creds = config.credentials.unwrap();
        assert_eq!(creds.email, "me@example.com");
        assert_eq!(creds.password, "secret");
        assert!(!config.headless);
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.domain, "amazon.de");
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = ScraperConfig::from_lookup(lookup(&[("AMAZON_EMAIL", "only@example.com")])).unwrap();
        assert!(config.credentials.is_none());
        assert!(config.headless);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.domain, DEFAULT_DOMAIN);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(ScraperConfig::from_lookup(lookup(&[("HEADLESS", "maybe")])).is_err());
        assert!(ScraperConfig::from_lookup(lookup(&[("TIMEOUT", "soon")])).is_err());
    }

    #[test]
    fn test_marketplace_parsing() {
        assert_eq!("US".parse::<Marketplace>().unwrap(), Marketplace::Us);
        assert_eq!("jp".parse::<Marketplace>().unwrap(), Marketplace::Japan);
        assert_eq!("www.amazon.com.au".parse::<Marketplace>().unwrap(), Marketplace::Australia);
        assert_eq!("netherlands".parse::<Marketplace>().unwrap(), Marketplace::Netherlands);
        assert!("Atlantis".parse::<Marketplace>().is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("a@b.c", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_write_env_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.template");
        assert!(write_env_template(&path).unwrap());
        assert!(!write_env_template(&path).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("AMAZON_EMAIL="));
        assert!(content.contains("MAX_RETRIES"));
    }
}
