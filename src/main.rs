//! keepsake CLI
//!
//! Manages the session kept in the configured file store.

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use keepsake::config::keepsake_home;
use keepsake::error::exit_codes;
use keepsake::{Config, FileStore, KeepsakeError, KeyValueStore, SessionStore};

// =============================================================================
// CLI Definition
// =============================================================================

/// keepsake - persistent session token and user record
#[derive(Parser)]
#[command(name = "keepsake")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a project config to `.keepsake/config.toml`
    Init {
        /// Default session length in minutes
        #[arg(long)]
        ttl: Option<i64>,
        /// Overwrite an existing project config
        #[arg(long, short)]
        force: bool,
    },

    /// Start a new session, replacing any existing one
    Create {
        /// Access token
        #[arg(long)]
        token: String,
        /// User record as JSON
        #[arg(long, default_value = "{}")]
        data: String,
        /// Minutes until the session expires (defaults to config)
        #[arg(long)]
        ttl: Option<i64>,
    },

    /// Print the full user record
    Show {
        /// Output as compact JSON
        #[arg(long, short)]
        json: bool,
    },

    /// Print a single detail from the user record
    ///
    /// Exits 1 when there is no session and 3 when the detail is not set.
    Get {
        /// Detail key
        key: String,
    },

    /// Print the access token
    Token,

    /// Exit 0 if an active session exists, 1 otherwise
    Exists,

    /// Add or overwrite a detail
    Set {
        /// Detail key
        key: String,
        /// Value (JSON, or a plain string)
        value: String,
    },

    /// Overwrite an existing detail (never adds one)
    Update {
        /// Detail key
        key: String,
        /// Value (JSON, or a plain string)
        value: String,
    },

    /// Replace the token and re-arm the expiry deadline
    Refresh {
        /// New access token
        token: String,
    },

    /// Remove the session
    Destroy {
        /// Run the reload notice after destroying
        #[arg(long)]
        reload: bool,
    },

    /// Show session status
    Status {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
    },
}

/// Session status summary.
#[derive(Debug, Serialize)]
struct StatusOutput {
    active: bool,
    has_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minutes_left: Option<i64>,
}

impl StatusOutput {
    fn format_text(&self) -> String {
        let mut lines = vec![format!(
            "Session: {}",
            if self.active { "active" } else { "none" }
        )];
        if self.active {
            lines.push(format!(
                "Expires: {}",
                self.expires_at.as_deref().unwrap_or("never")
            ));
            if let Some(minutes) = self.minutes_left {
                lines.push(format!("Minutes left: {}", minutes));
            }
        }
        lines.join("\n")
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    init_tracing();
    setup_panic_handler();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("keepsake error: {}", e);
            if e
                .downcast_ref::<KeepsakeError>()
                .is_some_and(KeepsakeError::is_corrupt_record)
            {
                eprintln!("The stored session is unreadable. Run `keepsake destroy` to reset it.");
            }
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

/// Log to stderr, filtered by `KEEPSAKE_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("KEEPSAKE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// On panic, append to `~/.keepsake/crash.log` and exit with the error code.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("keepsake panic: {}", info);

        if let Some(home) = keepsake_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::ERROR);
    }));
}

/// Outcome of reading one detail.
#[derive(Debug, PartialEq)]
enum Lookup {
    Found(Value),
    MissingKey,
    NoSession,
}

/// Read a detail, telling a missing key apart from a missing session.
fn lookup_detail<S: KeyValueStore>(
    session: &SessionStore<S>,
    key: &str,
) -> keepsake::Result<Lookup> {
    if session.get_all()?.is_none() {
        return Ok(Lookup::NoSession);
    }
    Ok(match session.get_detail(key)? {
        Some(value) => Lookup::Found(value),
        None => Lookup::MissingKey,
    })
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load();

    let dir = config
        .storage
        .resolved_dir()
        .ok_or_else(|| KeepsakeError::config("Could not determine store directory"))?;
    let session = SessionStore::new(FileStore::with_dir(dir)?)
        .with_keys(config.session.keys())
        .with_reload(|| eprintln!("Session destroyed. Sign in again to continue."));

    match cli.command {
        Commands::Create { token, data, ttl } => {
            let data: Value = serde_json::from_str(&data)?;
            let ttl = ttl.or(config.session.default_ttl_minutes);
            session.create(&token, Some(data), ttl)?;
            Ok(success())
        }
        Commands::Show { json } => match session.get_all()? {
            Some(record) => {
                if json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                Ok(success())
            }
            None => Ok(no_session()),
        },
        Commands::Init { ttl, force } => run_init(&std::env::current_dir()?, ttl, force),
        Commands::Get { key } => match lookup_detail(&session, &key)? {
            Lookup::Found(Value::String(text)) => {
                println!("{}", text);
                Ok(success())
            }
            Lookup::Found(value) => {
                println!("{}", value);
                Ok(success())
            }
            Lookup::MissingKey => Ok(ExitCode::from(exit_codes::NOT_FOUND as u8)),
            Lookup::NoSession => Ok(no_session()),
        },
        Commands::Token => match session.get_token()? {
            Some(token) => {
                println!("{}", token);
                Ok(success())
            }
            None => Ok(no_session()),
        },
        Commands::Exists => {
            if session.exists()? {
                Ok(success())
            } else {
                Ok(no_session())
            }
        }
        Commands::Set { key, value } => {
            if !session.exists()? {
                return Ok(no_session());
            }
            session.add_detail(&key, parse_value(&value))?;
            Ok(success())
        }
        Commands::Update { key, value } => {
            if !session.exists()? {
                return Ok(no_session());
            }
            session.update_detail(&key, parse_value(&value))?;
            Ok(success())
        }
        Commands::Refresh { token } => {
            session.update_token(&token)?;
            Ok(success())
        }
        Commands::Destroy { reload } => {
            session.destroy(reload)?;
            Ok(success())
        }
        Commands::Status { json } => {
            let active = session.exists()?;
            let status = StatusOutput {
                active,
                has_token: session.get_token()?.is_some(),
                expires_at: session.expires_at()?.map(|d| d.to_rfc3339()),
                minutes_left: session.minutes_until_expiry()?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", status.format_text());
            }
            Ok(if active { success() } else { no_session() })
        }
    }
}

/// Write `.keepsake/config.toml` in `cwd`, keeping an existing one unless forced.
fn run_init(
    cwd: &std::path::Path,
    ttl: Option<i64>,
    force: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = Config::default();
    config.session.default_ttl_minutes = ttl;

    match config.init_project(cwd, force)? {
        Some(path) => {
            println!("Wrote {}", path.display());
            Ok(success())
        }
        None => {
            eprintln!("Project config already exists. Use --force to overwrite it.");
            Ok(ExitCode::from(exit_codes::ERROR as u8))
        }
    }
}

/// Parse a CLI value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn success() -> ExitCode {
    ExitCode::from(exit_codes::SUCCESS as u8)
}

fn no_session() -> ExitCode {
    ExitCode::from(exit_codes::NO_SESSION as u8)
}
