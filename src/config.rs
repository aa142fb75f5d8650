use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub base_url: String,
    pub master_key: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub webhook_api_key: Option<String>,
    pub bootstrap_admin_email: Option<String>,
    pub audit_log_enabled: bool,
    pub audit_log_retention_days: i64,
    pub rate_limit: RateLimitSettings,
    pub dev_mode: bool,
}

/// Failed-attempt budgets for the product-license validation endpoint.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub ip_max_attempts: u32,
    pub ip_window_secs: u64,
    pub key_max_attempts: u32,
    pub key_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("KKS_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        // MASTER_KEY_FILE takes precedence so the key can live outside the env.
        let master_key = env::var("MASTER_KEY_FILE")
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|k| k.trim().to_string())
            .or_else(|| env::var("MASTER_KEY").ok());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "kursadmin.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "kursadmin_audit.db".to_string()),
            base_url,
            master_key,
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "KKS AS <post@kks.no>".to_string()),
            webhook_api_key: env::var("BRANSJEKURS_API_KEY").ok(),
            bootstrap_admin_email: env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            audit_log_retention_days: env::var("AUDIT_LOG_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(365),
            rate_limit: RateLimitSettings::from_env(),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl RateLimitSettings {
    fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(var: &str, default: T) -> T {
            env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        Self {
            ip_max_attempts: parsed("VALIDATE_IP_MAX_ATTEMPTS", 10),
            ip_window_secs: parsed("VALIDATE_IP_WINDOW_SECS", 900),
            key_max_attempts: parsed("VALIDATE_KEY_MAX_ATTEMPTS", 30),
            key_window_secs: parsed("VALIDATE_KEY_WINDOW_SECS", 3600),
        }
    }
}
