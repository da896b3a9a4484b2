//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use url::Url;

use crate::AppConfig;
use crate::api::gate_config;
use crate::config::{TokenPolicy, TokenPurpose, TokenSettings};
use crate::db::Database;
use crate::mailer::{LogMailer, Mailer, SmtpConfig, SmtpMailer, SmtpSecurity};

const MIN_SECRET_LENGTH: usize = 32;

const SMTP_PASSWORD_VAR: &str = "SMTP_PASSWORD";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sessiongate",
    about = "Token and session authentication service"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "7300")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "sessiongate.db")]
    pub database: String,

    /// Token issuer, also the only accepted audience
    #[arg(long, env = "TOKEN_ISSUER", default_value = "sessiongate")]
    pub issuer: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL", default_value = "900")]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TOKEN_TTL", default_value = "1209600")]
    pub refresh_token_ttl: u64,

    /// Password reset token lifetime in seconds
    #[arg(long, env = "PASSWORD_RESET_TOKEN_TTL", default_value = "900")]
    pub password_reset_token_ttl: u64,

    /// Page that receives the reset token as `?token=`
    #[arg(
        long,
        env = "PASSWORD_RESET_URL",
        default_value = "http://localhost:3000/reset-password"
    )]
    pub password_reset_url: String,

    /// Per-request deadline in seconds, 0 for none
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Additional method (request path) that needs no bearer token
    #[arg(long = "exempt-method")]
    pub exempt_methods: Vec<String>,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET
    #[arg(long)]
    pub access_token_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_token_secret_file: Option<String>,

    /// Path to file containing the password reset token secret. Prefer PASSWORD_RESET_TOKEN_SECRET
    #[arg(long)]
    pub password_reset_token_secret_file: Option<String>,

    /// SMTP relay for reset mail. Without it mail is only logged
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value = "587")]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,

    /// Path to file containing the SMTP password. Prefer SMTP_PASSWORD
    #[arg(long)]
    pub smtp_password_file: Option<String>,

    /// Sender address, e.g. "Sessiongate <no-reply@example.com>"
    #[arg(long, env = "SMTP_FROM")]
    pub smtp_from: Option<String>,

    #[arg(long, env = "SMTP_SECURITY", default_value = "starttls")]
    pub smtp_security: SmtpSecurity,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    fn secret_file(&self, purpose: TokenPurpose) -> Option<&str> {
        match purpose {
            TokenPurpose::Access => self.access_token_secret_file.as_deref(),
            TokenPurpose::Refresh => self.refresh_token_secret_file.as_deref(),
            TokenPurpose::PasswordReset => self.password_reset_token_secret_file.as_deref(),
        }
    }

    fn ttl(&self, purpose: TokenPurpose) -> Duration {
        Duration::from_secs(match purpose {
            TokenPurpose::Access => self.access_token_ttl,
            TokenPurpose::Refresh => self.refresh_token_ttl,
            TokenPurpose::PasswordReset => self.password_reset_token_ttl,
        })
    }
}

/// Environment variable holding the secret for `purpose`.
pub fn secret_env_var(purpose: TokenPurpose) -> &'static str {
    match purpose {
        TokenPurpose::Access => "ACCESS_TOKEN_SECRET",
        TokenPurpose::Refresh => "REFRESH_TOKEN_SECRET",
        TokenPurpose::PasswordReset => "PASSWORD_RESET_TOKEN_SECRET",
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load one signing secret from its environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_token_secret(purpose: TokenPurpose, secret_file: Option<&str>) -> Option<String> {
    let var = secret_env_var(purpose);

    let secret = if let Ok(secret) = std::env::var(var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, purpose = %purpose, error = %e, "Failed to read token secret file");
                return None;
            }
        }
    } else {
        error!(
            purpose = %purpose,
            "Token secret is required. Set {} (recommended) or use the matching --*-secret-file option",
            var
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            purpose = %purpose,
            "Token secret is shorter than {} characters. Use a longer secret",
            MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load all secrets and build the application config.
/// Returns None and logs an error if any part is invalid.
pub fn build_app_config(args: &Args) -> Option<AppConfig> {
    let settings = |purpose| {
        load_token_secret(purpose, args.secret_file(purpose))
            .map(|secret| TokenSettings::new(secret, args.ttl(purpose)))
    };
    let access = settings(TokenPurpose::Access)?;
    let refresh = settings(TokenPurpose::Refresh)?;
    let password_reset = settings(TokenPurpose::PasswordReset)?;

    let policy = match TokenPolicy::new(args.issuer.clone(), access, refresh, password_reset) {
        Ok(policy) => policy,
        Err(e) => {
            error!(error = %e, "Invalid token configuration");
            return None;
        }
    };

    let reset_url = validate_reset_url(&args.password_reset_url)?;

    let request_timeout = (args.request_timeout > 0)
        .then(|| Duration::from_secs(args.request_timeout));

    Some(AppConfig {
        policy,
        reset_url,
        request_timeout,
        gate: gate_config(args.exempt_methods.iter().cloned()),
    })
}

/// Read the SMTP password from SMTP_PASSWORD (then cleared) or a file.
fn load_smtp_password(password_file: Option<&str>) -> Option<String> {
    if let Ok(password) = std::env::var(SMTP_PASSWORD_VAR) {
        // SAFETY: single-threaded startup, nothing else reads this variable.
        unsafe { std::env::remove_var(SMTP_PASSWORD_VAR) };
        return Some(password);
    }

    let path = password_file?;
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content.trim().to_string()),
        Err(e) => {
            error!(path = %path, error = %e, "Failed to read SMTP password file");
            None
        }
    }
}

/// Pick the outbound mailer. An SMTP relay is used when `--smtp-host` is
/// set, in which case every other SMTP setting is required; otherwise mail
/// is only logged.
/// Returns None and logs an error if the SMTP settings are invalid.
pub fn build_mailer(args: &Args) -> Option<Arc<dyn Mailer>> {
    let Some(host) = args.smtp_host.clone() else {
        info!("SMTP_HOST not set, reset mail will be logged instead of sent");
        return Some(Arc::new(LogMailer));
    };

    let config = SmtpConfig {
        host,
        port: args.smtp_port,
        username: args.smtp_username.clone().unwrap_or_default(),
        password: load_smtp_password(args.smtp_password_file.as_deref()).unwrap_or_default(),
        from: args.smtp_from.clone().unwrap_or_default(),
        security: args.smtp_security,
    };

    match SmtpMailer::new(config.clone()) {
        Ok(mailer) => {
            info!(host = %config.host, port = config.port, "SMTP mailer configured");
            Some(Arc::new(mailer))
        }
        Err(e) => {
            error!(
                error = %e,
                "Invalid SMTP configuration. Set SMTP_HOST, SMTP_PORT, SMTP_USERNAME, SMTP_PASSWORD and SMTP_FROM"
            );
            None
        }
    }
}

/// Parse the password reset page URL.
/// Returns None and logs an error if validation fails.
pub fn validate_reset_url(reset_url: &str) -> Option<Url> {
    let url = match Url::parse(reset_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %reset_url, error = %e, "Invalid password reset URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %reset_url, "Password reset URL must use http or https");
        return None;
    }

    Some(url)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
