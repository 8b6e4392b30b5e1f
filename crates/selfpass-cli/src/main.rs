//! `selfpass` CLI: offline maintenance of configuration documents.
//!
//! Works directly on the XML file and never talks to a running server.
//! Every command that opens a document takes `--key`; without one, the
//! key is derived from the document's `createTime` the same way the
//! server does when `SELFPASS_SECURITY_KEY` is unset.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};

use selfpass_core::stored_config::creation_time_key;
use selfpass_core::{EncodingMode, SecurityKey, SettingKey, StoredConfiguration, encoder, util};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";

// ── CLI structure ────────────────────────────────────────────────────

/// selfpass: password self service configuration tool.
#[derive(Parser)]
#[command(
    name = "selfpass",
    version,
    about = "selfpass CLI: encode secrets and maintain configuration documents",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         SELFPASS_SECURITY_KEY   Passphrase used as --key when the flag is omitted\n\n\
         {DIM}Examples:{RESET}\n  \
         selfpass encode-secret --mode encoded --key s3cret hunter2\n  \
         selfpass validate --file selfpass.xml\n  \
         selfpass hash-setting --file selfpass.xml idleTimeoutSeconds"
    ),
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a secret with one of the storage encodings.
    EncodeSecret {
        /// plain, stripped, config-pw or encoded.
        #[arg(long, value_parser = parse_mode)]
        mode: EncodingMode,
        /// Passphrase the encryption key is derived from.
        #[arg(long, env = "SELFPASS_SECURITY_KEY")]
        key: String,
        value: String,
    },
    /// Decode a stored secret. The prefix selects the encoding.
    DecodeSecret {
        #[arg(long, env = "SELFPASS_SECURITY_KEY")]
        key: String,
        value: String,
    },
    /// Create an empty configuration document.
    Init {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, env = "SELFPASS_SECURITY_KEY")]
        key: Option<String>,
    },
    /// Load a document and report invalid settings and outdated syntax.
    Validate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, env = "SELFPASS_SECURITY_KEY")]
        key: Option<String>,
    },
    /// Set the configuration password and rewrite the document.
    SetConfigPassword {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, env = "SELFPASS_SECURITY_KEY")]
        key: Option<String>,
        password: String,
    },
    /// Print the value hash of a setting.
    HashSetting {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, env = "SELFPASS_SECURITY_KEY")]
        key: Option<String>,
        /// Document key of the setting, e.g. `idleTimeoutSeconds`.
        setting: String,
    },
}

fn parse_mode(raw: &str) -> Result<EncodingMode, String> {
    EncodingMode::from_name(raw)
        .ok_or_else(|| format!("unknown mode '{raw}' (expected plain, stripped, config-pw or encoded)"))
}

// ── Command dispatch ─────────────────────────────────────────────────

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{RED}{BOLD}error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cmd: Commands) -> Result<ExitCode> {
    match cmd {
        Commands::EncodeSecret { mode, key, value } => cmd_encode(mode, &key, &value),
        Commands::DecodeSecret { key, value } => cmd_decode(&key, &value),
        Commands::Init { file, key } => cmd_init(&file, key.as_deref()),
        Commands::Validate { file, key } => cmd_validate(&file, key.as_deref()),
        Commands::SetConfigPassword {
            file,
            key,
            password,
        } => cmd_set_config_password(&file, key.as_deref(), &password),
        Commands::HashSetting { file, key, setting } => {
            cmd_hash_setting(&file, key.as_deref(), &setting)
        }
    }
}

// ── Document helpers ─────────────────────────────────────────────────

fn passphrase_key(passphrase: &str) -> Result<SecurityKey> {
    SecurityKey::from_passphrase(passphrase).context("failed to derive key from passphrase")
}

/// The key for an existing document: the passphrase when given, else the
/// one derived from its `createTime`.
fn document_key(xml: &str, passphrase: Option<&str>) -> Result<SecurityKey> {
    if let Some(passphrase) = passphrase {
        return passphrase_key(passphrase);
    }
    let created = StoredConfiguration::read_create_time(xml)
        .context("failed to read document header")?
        .context("document has no createTime; pass --key")?;
    tracing::debug!(%created, "using creation-time key");
    creation_time_key(created).context("failed to derive key from createTime")
}

fn load(file: &Path, passphrase: Option<&str>) -> Result<StoredConfiguration> {
    let xml = fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let key = document_key(&xml, passphrase)?;
    StoredConfiguration::from_xml(&xml, key).with_context(|| format!("failed to load {}", file.display()))
}

/// Write through a sibling temp file so a failed write never truncates the document.
fn save(file: &Path, config: &StoredConfiguration) -> Result<()> {
    let xml = config
        .to_xml(EncodingMode::Encoded)
        .context("failed to serialize configuration")?;
    let tmp = file.with_extension("xml.tmp");
    fs::write(&tmp, xml).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, file).with_context(|| format!("failed to replace {}", file.display()))?;
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────────

fn cmd_encode(mode: EncodingMode, passphrase: &str, value: &str) -> Result<ExitCode> {
    let key = passphrase_key(passphrase)?;
    let encoded = encoder::encode(value, mode, &key).context("failed to encode value")?;
    println!("{encoded}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_decode(passphrase: &str, value: &str) -> Result<ExitCode> {
    let key = passphrase_key(passphrase)?;
    let decoded = encoder::decode(value, EncodingMode::Plain, &key).context("failed to decode value")?;
    println!("{decoded}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_init(file: &Path, passphrase: Option<&str>) -> Result<ExitCode> {
    if file.exists() {
        bail!("{} already exists", file.display());
    }
    let now = Utc::now();
    let key = match passphrase {
        Some(passphrase) => passphrase_key(passphrase)?,
        None => creation_time_key(now).context("failed to derive key from createTime")?,
    };
    let config = StoredConfiguration::new_empty_at(key, now);
    save(file, &config)?;
    println!("{GREEN}created{RESET} {}", file.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_validate(file: &Path, passphrase: Option<&str>) -> Result<ExitCode> {
    let config = load(file, passphrase)?;
    let errors = config.validate_all();
    let needing_update = config.settings_needing_update();

    for (setting, messages) in &errors {
        for message in messages {
            println!("{RED}invalid{RESET} {setting}: {message}");
        }
    }
    for setting in &needing_update {
        println!("{YELLOW}outdated{RESET} {setting}: stored with an older syntax version");
    }

    if errors.is_empty() {
        println!("{GREEN}ok{RESET} {} is valid", file.display());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} setting(s) with errors", errors.len());
        Ok(ExitCode::FAILURE)
    }
}

fn cmd_set_config_password(file: &Path, passphrase: Option<&str>, password: &str) -> Result<ExitCode> {
    if util::is_blank(password) {
        bail!("configuration password must not be blank");
    }
    let mut config = load(file, passphrase)?;
    config.set_config_password(password);
    save(file, &config)?;
    println!("{GREEN}configuration password set{RESET} in {}", file.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_hash_setting(file: &Path, passphrase: Option<&str>, setting: &str) -> Result<ExitCode> {
    let key = SettingKey::from_key(setting).with_context(|| format!("unknown setting '{setting}'"))?;
    let config = load(file, passphrase)?;
    let hash = config
        .read_setting(key)
        .context("failed to read setting")?
        .value_hash()
        .context("failed to hash setting")?;
    println!("{hash}");
    Ok(ExitCode::SUCCESS)
}
