use std::time::Duration;

use clap::Parser;

use crate::error::AppError;

/// hh.ru employers ingested when none are given on the command line.
pub const DEFAULT_EMPLOYER_IDS: [&str; 10] = [
    "15478", "1740", "3529", "78638", "87021", "2180", "3776", "39305", "64174", "1122462",
];

/// hh.ru rejects `per_page` above this value.
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Parser, Debug, Clone)]
#[command(name = "hh-vacancies", about = "Collect hh.ru employers and vacancies into PostgreSQL")]
pub struct Config {
    /// Database name
    #[arg(long, env = "DB_NAME")]
    pub db_name: String,

    /// Database user
    #[arg(long, env = "DB_USER")]
    pub db_user: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: String,

    /// Database host
    #[arg(long, env = "DB_HOST")]
    pub db_host: String,

    /// Database port
    #[arg(long, env = "DB_PORT")]
    pub db_port: u16,

    /// Maximum number of pooled database connections
    #[arg(long, env = "DB_POOL_SIZE", default_value = "5")]
    pub db_pool_size: u32,

    /// Seconds to wait for a free pooled connection before failing
    #[arg(long, env = "DB_ACQUIRE_TIMEOUT", default_value = "5")]
    pub db_acquire_timeout_secs: u64,

    /// Per-statement timeout in seconds
    #[arg(long, env = "DB_STATEMENT_TIMEOUT", default_value = "30")]
    pub db_statement_timeout_secs: u64,

    /// Base URL of the hh.ru API
    #[arg(long, env = "API_BASE_URL", default_value = "https://api.hh.ru/")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "15")]
    pub request_timeout_secs: u64,

    /// Retries after the first failed attempt of a request
    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds, doubled on every retry
    #[arg(long, env = "BACKOFF_BASE_MS", default_value = "500")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds
    #[arg(long, env = "BACKOFF_MAX_MS", default_value = "8000")]
    pub backoff_max_ms: u64,

    /// Longest Retry-After hint honored, in seconds
    #[arg(long, env = "MAX_RETRY_AFTER", default_value = "60")]
    pub max_retry_after_secs: u64,

    /// Rate-limit waits allowed per request on top of the retry budget
    #[arg(long, env = "MAX_RATE_LIMIT_WAITS", default_value = "5")]
    pub max_rate_limit_waits: u32,

    /// Page ceiling for paginated endpoints
    #[arg(long, env = "MAX_PAGES", default_value = "20")]
    pub max_pages: u32,

    /// Items requested per page (at most 100)
    #[arg(long, env = "PER_PAGE", default_value = "100")]
    pub per_page: u32,

    /// Rows written per upsert round-trip
    #[arg(long, env = "BATCH_SIZE", default_value = "500")]
    pub batch_size: usize,

    /// Currency assumed for vacancies that do not state one
    #[arg(long, env = "DEFAULT_CURRENCY", default_value = "RUR")]
    pub default_currency: String,

    /// hh.ru employer ids to ingest
    #[arg(long = "employer", env = "EMPLOYER_IDS", value_delimiter = ',')]
    pub employer_ids: Vec<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Ingest when the database is empty, then open the menu (default)
    Run {
        /// Wipe stored data and ingest again
        #[arg(long)]
        force: bool,
    },
    /// Fetch and store employers and vacancies
    Ingest {
        /// Wipe stored data and ingest again
        #[arg(long)]
        force: bool,
    },
    /// Open the interactive report menu
    Menu,
    /// Truncate stored tables (employers cascades to vacancies)
    Clear {
        /// Tables to truncate; defaults to all
        #[arg(long = "table")]
        tables: Vec<String>,
    },
}

/// Settings for the hh.ru HTTP client.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub max_retry_after: Duration,
    pub max_rate_limit_waits: u32,
    pub max_pages: u32,
    pub per_page: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.hh.ru/".to_string(),
            user_agent: default_user_agent(),
            request_timeout: Duration::from_secs(15),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_millis(8000),
            max_retry_after: Duration::from_secs(60),
            max_rate_limit_waits: 5,
            max_pages: 20,
            per_page: MAX_PER_PAGE,
        }
    }
}

/// Connection settings for PostgreSQL.
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

/// Settings for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub employer_ids: Vec<String>,
    pub batch_size: usize,
    pub default_currency: String,
    pub force: bool,
}

impl Config {
    /// Resolve the command, defaulting to Run if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run { force: false })
    }

    /// Check the rules clap cannot express on single arguments.
    pub fn validate(&self) -> Result<(), AppError> {
        for (key, value) in [
            ("DB_NAME", &self.db_name),
            ("DB_USER", &self.db_user),
            ("DB_PASSWORD", &self.db_password),
            ("DB_HOST", &self.db_host),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{key} must not be empty")));
            }
        }
        if self.db_port == 0 {
            return Err(AppError::Config("DB_PORT must be between 1 and 65535".to_string()));
        }
        if self.db_pool_size == 0 {
            return Err(AppError::Config("DB_POOL_SIZE must be at least 1".to_string()));
        }
        if url::Url::parse(&self.api_base_url).is_err() {
            return Err(AppError::Config(format!(
                "API_BASE_URL is not a valid URL: {}",
                self.api_base_url
            )));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(AppError::Config(format!(
                "PER_PAGE must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        if self.max_pages == 0 {
            return Err(AppError::Config("MAX_PAGES must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config("BATCH_SIZE must be at least 1".to_string()));
        }
        if self.default_currency.len() != 3
            || !self.default_currency.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(AppError::Config(format!(
                "DEFAULT_CURRENCY must be a 3-letter code, got '{}'",
                self.default_currency
            )));
        }
        if let Some(bad) = self
            .employer_ids
            .iter()
            .find(|id| id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(AppError::Config(format!(
                "EMPLOYER_IDS must be numeric, got '{bad}'"
            )));
        }
        Ok(())
    }

    pub fn api(&self) -> ApiSettings {
        let mut base_url = self.api_base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        ApiSettings {
            base_url,
            user_agent: default_user_agent(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            max_retry_after: Duration::from_secs(self.max_retry_after_secs),
            max_rate_limit_waits: self.max_rate_limit_waits,
            max_pages: self.max_pages,
            per_page: self.per_page,
        }
    }

    pub fn db(&self) -> DbSettings {
        DbSettings {
            name: self.db_name.clone(),
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            host: self.db_host.clone(),
            port: self.db_port,
            pool_size: self.db_pool_size,
            acquire_timeout: Duration::from_secs(self.db_acquire_timeout_secs),
            statement_timeout: Duration::from_secs(self.db_statement_timeout_secs),
        }
    }

    pub fn ingest(&self, force: bool) -> IngestSettings {
        let employer_ids = if self.employer_ids.is_empty() {
            DEFAULT_EMPLOYER_IDS.iter().map(|id| id.to_string()).collect()
        } else {
            self.employer_ids.clone()
        };
        IngestSettings {
            employer_ids,
            batch_size: self.batch_size,
            default_currency: self.default_currency.to_ascii_uppercase(),
            force,
        }
    }
}

fn default_user_agent() -> String {
    format!("hh-vacancies/{}", env!("CARGO_PKG_VERSION"))
}
