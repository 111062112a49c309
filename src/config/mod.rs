use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub job: JobConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// Seconds to wait when acquiring a connection
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub batch_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub navigation_timeout_ms: u64,
    pub frame_timeout_ms: u64,
    pub render_timeout_ms: u64,
    /// Fixed delay used when the frame never reports itself as rendered
    pub render_fallback_ms: u64,
    pub min_text_length: usize,
    pub loading_marker: String,
    pub user_agent: String,
    pub no_sandbox: bool,
    pub chrome_executable: Option<String>,
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn render_fallback(&self) -> Duration {
        Duration::from_millis(self.render_fallback_ms)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 20_000,
            frame_timeout_ms: 10_000,
            render_timeout_ms: 10_000,
            render_fallback_ms: 3_000,
            min_text_length: 50,
            loading_marker: "Loading...".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            no_sandbox: true,
            chrome_executable: None,
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Job overrides
        if let Ok(v) = env::var("JOB_BATCH_SIZE") {
            self.job.batch_size = v
                .parse()
                .ok()
                .filter(|n: &i64| *n > 0)
                .unwrap_or(self.job.batch_size);
        }

        // Browser overrides
        if let Ok(v) = env::var("BROWSER_NAVIGATION_TIMEOUT_MS") {
            self.browser.navigation_timeout_ms = v.parse().unwrap_or(self.browser.navigation_timeout_ms);
        }
        if let Ok(v) = env::var("BROWSER_FRAME_TIMEOUT_MS") {
            self.browser.frame_timeout_ms = v.parse().unwrap_or(self.browser.frame_timeout_ms);
        }
        if let Ok(v) = env::var("BROWSER_RENDER_TIMEOUT_MS") {
            self.browser.render_timeout_ms = v.parse().unwrap_or(self.browser.render_timeout_ms);
        }
        if let Ok(v) = env::var("BROWSER_RENDER_FALLBACK_MS") {
            self.browser.render_fallback_ms = v.parse().unwrap_or(self.browser.render_fallback_ms);
        }
        if let Ok(v) = env::var("BROWSER_MIN_TEXT_LENGTH") {
            self.browser.min_text_length = v.parse().unwrap_or(self.browser.min_text_length);
        }
        if let Ok(v) = env::var("BROWSER_LOADING_MARKER") {
            self.browser.loading_marker = v;
        }
        if let Ok(v) = env::var("BROWSER_USER_AGENT") {
            self.browser.user_agent = v;
        }
        if let Ok(v) = env::var("BROWSER_NO_SANDBOX") {
            self.browser.no_sandbox = v.parse().unwrap_or(self.browser.no_sandbox);
        }
        if let Ok(v) = env::var("CHROME_EXECUTABLE") {
            if !v.trim().is_empty() {
                self.browser.chrome_executable = Some(v);
            }
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 2,
                connection_timeout: 30,
            },
            job: JobConfig::default(),
            browser: BrowserConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 2,
                connection_timeout: 10,
            },
            job: JobConfig::default(),
            browser: BrowserConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 4,
                connection_timeout: 5,
            },
            job: JobConfig::default(),
            browser: BrowserConfig {
                // Production hosts run Chrome inside a working sandbox
                no_sandbox: false,
                ..BrowserConfig::default()
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
