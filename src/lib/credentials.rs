//! Process-wide credentials store for the CLI.
//!
//! Credentials live in `~/.mthds/credentials`, a dotenv-style `KEY=VALUE`
//! file written with owner-only permissions. Each key resolves through three
//! layers: environment variable, then the file, then a built-in default. A
//! legacy `config.json` or `.env.local` from older installations is migrated
//! into the new format on first read, at most once per process.

use directories::BaseDirs;
use serde_json;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::{env, fmt, fs};

use util::errors::*;

pub const CREDENTIALS_FILENAME: &'static str = "credentials";

const LEGACY_CONFIG_FILENAME: &'static str = "config.json";
const LEGACY_ENV_LOCAL_FILENAME: &'static str = ".env.local";

/// Where a credential value came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    Env,
    File,
    Default,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CredentialSource::Env => write!(f, "env"),
            CredentialSource::File => write!(f, "file"),
            CredentialSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved credential value together with its provenance.
#[derive(Clone, Debug, PartialEq)]
pub struct CredentialEntry {
    pub key: &'static str,
    pub cli_key: &'static str,
    pub value: String,
    pub source: CredentialSource,
}

struct KeySpec {
    key: &'static str,
    cli_key: &'static str,
    env_name: &'static str,
    default: &'static str,
}

static KEYS: [KeySpec; 4] = [
    KeySpec {
        key: "runner",
        cli_key: "runner",
        env_name: "MTHDS_RUNNER",
        default: "api",
    },
    KeySpec {
        key: "api_url",
        cli_key: "api-url",
        env_name: "PIPELEX_API_URL",
        default: "https://api.pipelex.com",
    },
    KeySpec {
        key: "api_key",
        cli_key: "api-key",
        env_name: "PIPELEX_API_KEY",
        default: "",
    },
    KeySpec {
        key: "telemetry",
        cli_key: "telemetry",
        env_name: "DISABLE_TELEMETRY",
        // DISABLE_TELEMETRY=0 means telemetry is enabled.
        default: "0",
    },
];

lazy_static! {
    static ref MIGRATION_DONE: Mutex<bool> = Mutex::new(false);
}

fn spec_for(key: &str) -> Option<&'static KeySpec> {
    KEYS.iter().find(|spec| spec.key == key)
}

/// Maps a CLI flag name (kebab-case) to its internal key.
pub fn resolve_key(cli_key: &str) -> Option<&'static str> {
    KEYS.iter()
        .find(|spec| spec.cli_key == cli_key)
        .map(|spec| spec.key)
}

/// The CLI flag names of every recognized key.
pub fn valid_keys() -> Vec<&'static str> {
    KEYS.iter().map(|spec| spec.cli_key).collect()
}

/// The credentials store rooted at a config directory (`~/.mthds` by
/// default; injectable for tests).
pub struct CredentialsStore {
    config_dir: PathBuf,
}

impl CredentialsStore {
    pub fn new() -> CredentialsStore {
        CredentialsStore {
            config_dir: BaseDirs::new().unwrap().home_dir().join(".mthds"),
        }
    }

    pub fn at(config_dir: PathBuf) -> CredentialsStore {
        CredentialsStore { config_dir }
    }

    fn credentials_path(&self) -> PathBuf {
        self.config_dir.join(CREDENTIALS_FILENAME)
    }

    /// Resolves a single key: env > file > default.
    pub fn get(&self, key: &str) -> Res<CredentialEntry> {
        let spec = spec_for(key)
            .ok_or_else(|| format_err!("unknown credential key '{}'", key))?;

        if let Ok(value) = env::var(spec.env_name) {
            return Ok(CredentialEntry {
                key: spec.key,
                cli_key: spec.cli_key,
                value,
                source: CredentialSource::Env,
            });
        }

        let file_entries = self.read_file();
        if let Some(value) = file_entries.get(spec.env_name) {
            return Ok(CredentialEntry {
                key: spec.key,
                cli_key: spec.cli_key,
                value: value.clone(),
                source: CredentialSource::File,
            });
        }

        Ok(CredentialEntry {
            key: spec.key,
            cli_key: spec.cli_key,
            value: spec.default.to_string(),
            source: CredentialSource::Default,
        })
    }

    /// Writes one key into the credentials file, preserving the others.
    pub fn set(&self, key: &str, value: &str) -> Res<()> {
        let spec = spec_for(key)
            .ok_or_else(|| format_err!("unknown credential key '{}'", key))?;

        let mut entries = self.read_file();
        entries.insert(spec.env_name.to_string(), value.to_string());
        self.write_file(&entries)
    }

    /// Resolves every key in declaration order.
    pub fn list(&self) -> Res<Vec<CredentialEntry>> {
        let mut entries = Vec::with_capacity(KEYS.len());
        for spec in KEYS.iter() {
            entries.push(self.get(spec.key)?);
        }
        Ok(entries)
    }

    /// Telemetry is on unless DISABLE_TELEMETRY resolves to "1".
    pub fn is_telemetry_enabled(&self) -> bool {
        match self.get("telemetry") {
            Ok(entry) => entry.value != "1",
            Err(_) => true,
        }
    }

    fn read_file(&self) -> IndexMap<String, String> {
        self.migrate_if_needed();
        match fs::read_to_string(self.credentials_path()) {
            Ok(content) => parse_dotenv(&content),
            Err(_) => IndexMap::new(),
        }
    }

    fn write_file(&self, entries: &IndexMap<String, String>) -> Res<()> {
        fs::create_dir_all(&self.config_dir).map_err(|e| {
            format_err!(
                "could not create config directory {}: {}",
                self.config_dir.display(),
                e
            )
        })?;
        let path = self.credentials_path();
        ::util::write(&path, serialize_dotenv(entries).as_bytes())?;
        restrict_permissions(&path)?;
        Ok(())
    }

    fn migrate_if_needed(&self) {
        let mut done = MIGRATION_DONE.lock().unwrap();
        if *done {
            return;
        }
        *done = true;
        self.migrate_legacy();
    }

    /// Converts legacy `config.json` / `.env.local` files into the dotenv
    /// format, then deletes them. A no-op when the new file already exists.
    fn migrate_legacy(&self) {
        if self.credentials_path().is_file() {
            return;
        }

        let legacy_config = self.config_dir.join(LEGACY_CONFIG_FILENAME);
        let legacy_env_local = self.config_dir.join(LEGACY_ENV_LOCAL_FILENAME);

        let mut migrated: IndexMap<String, String> = IndexMap::new();
        let mut did_migrate = false;

        if let Ok(raw) = fs::read_to_string(&legacy_config) {
            if let Ok(config) = serde_json::from_str::<serde_json::Value>(&raw) {
                if let Some(runner) = config.get("runner").and_then(|v| v.as_str()) {
                    migrated.insert("MTHDS_RUNNER".to_string(), runner.to_string());
                }
                if let Some(api_url) = config.get("apiUrl").and_then(|v| v.as_str()) {
                    migrated.insert("PIPELEX_API_URL".to_string(), api_url.to_string());
                }
                if let Some(api_key) = config.get("apiKey").and_then(|v| v.as_str()) {
                    migrated.insert("PIPELEX_API_KEY".to_string(), api_key.to_string());
                }
                if let Some(telemetry) = config.get("telemetry").and_then(|v| v.as_bool()) {
                    let value = if telemetry { "0" } else { "1" };
                    migrated.insert("DISABLE_TELEMETRY".to_string(), value.to_string());
                }
                did_migrate = true;
            }
        }

        if let Ok(content) = fs::read_to_string(&legacy_env_local) {
            let entries = parse_dotenv(&content);
            if let Some(value) = entries.get("DISABLE_TELEMETRY") {
                migrated.insert("DISABLE_TELEMETRY".to_string(), value.clone());
            }
            did_migrate = true;
        }

        if did_migrate {
            if self.write_file(&migrated).is_ok() {
                let _ = fs::remove_file(&legacy_config);
                let _ = fs::remove_file(&legacy_env_local);
            }
        }
    }
}

fn parse_dotenv(content: &str) -> IndexMap<String, String> {
    let mut entries = IndexMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(eq) = trimmed.find('=') {
            let key = trimmed[..eq].trim().to_string();
            let value = trimmed[eq + 1..].trim().to_string();
            entries.insert(key, value);
        }
    }
    entries
}

fn serialize_dotenv(entries: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(&format!("{}={}\n", key, value));
    }
    out
}

#[cfg(unix)]
fn restrict_permissions(path: &::std::path::Path) -> Res<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, permissions)
        .map_err(|e| format_err!("could not set permissions on {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &::std::path::Path) -> Res<()> {
    Ok(())
}
