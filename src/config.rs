use std::env;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    /// Public base URL of this endpoint, used to build absolute redirect
    /// targets such as the partial-login resume URL.
    pub base_url: String,

    // Flow behavior flags
    pub enable_local_login: bool,
    pub enable_sign_out_prompt: bool,
    pub enable_login_hint: bool,

    /// Default persistence when `rememberMe` was never offered to the user.
    pub persistent_login_default: bool,
    pub remember_me_duration_secs: u64,

    /// Maximum accepted length for any user-controlled query/form string.
    /// Defaults to 100.
    pub max_input_param_length: usize,

    // Cookie configuration (None = host-only cookie, Some = domain cookie)
    pub cookie_domain: Option<String>,
    pub cookie_signing_key: String,

    // HTTP client timeouts for provider-facing calls (token exchange, JWKS)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables using std::env::var
    pub fn load() -> anyhow::Result<Self> {
        let environment = match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        let base_url = env::var("BASE_URL")
            .map_err(|_| anyhow::anyhow!("BASE_URL environment variable is required"))?;
        url::Url::parse(&base_url)
            .map_err(|e| anyhow::anyhow!("BASE_URL is not a valid absolute URL: {e}"))?;

        let cookie_signing_key = env::var("COOKIE_SIGNING_KEY").map_err(|_| {
            anyhow::anyhow!("COOKIE_SIGNING_KEY environment variable is required")
        })?;

        // Optional variables with defaults
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(5000);

        let enable_local_login = env::var("ENABLE_LOCAL_LOGIN")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(true);

        let enable_sign_out_prompt = env::var("ENABLE_SIGN_OUT_PROMPT")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(true);

        let enable_login_hint = env::var("ENABLE_LOGIN_HINT")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(true);

        let persistent_login_default = env::var("PERSISTENT_LOGIN_DEFAULT")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(false);

        let remember_me_duration_secs = env::var("REMEMBER_ME_DURATION_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30 * 24 * 3600);

        let max_input_param_length = env::var("MAX_INPUT_PARAM_LENGTH")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(100);

        // Cookie domain: if not set or empty, use host-only cookies (no Domain attribute)
        let cookie_domain = env::var("COOKIE_DOMAIN").ok().filter(|s| !s.is_empty());

        let http_connect_timeout_secs = env::var("HTTP_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        let http_request_timeout_secs = env::var("HTTP_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        Ok(Config {
            environment,
            server_host,
            server_port,
            base_url,
            enable_local_login,
            enable_sign_out_prompt,
            enable_login_hint,
            persistent_login_default,
            remember_me_duration_secs,
            max_input_param_length,
            cookie_domain,
            cookie_signing_key,
            http_connect_timeout_secs,
            http_request_timeout_secs,
        })
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn cookie_secure_flag(&self) -> bool {
        self.is_production()
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
