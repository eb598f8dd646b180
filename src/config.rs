//! Run configuration from a `.env` file and the process environment.
//!
//! Process environment variables win over values in the `.env` file, and
//! command-line flags win over both. Empty values count as unset.

use std::{
    collections::HashMap,
    env, fmt,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info};
use regex::Regex;

use crate::{
    database::DEFAULT_SQLPLUS,
    encoding::{DEFAULT_LEGACY_ENCODING, LegacyCodec},
    loader::DEFAULT_SQLLDR,
};

pub const DEFAULT_ENV_FILE: &str = ".env";

/// Database login passed to the external Oracle clients.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub dsn: String,
}

impl Credentials {
    pub fn connect_string(&self) -> String {
        format!("{}/{}@{}", self.user, self.password, self.dsn)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .field("dsn", &self.dsn)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub file_path: Option<PathBuf>,
    pub table_name: Option<String>,
    pub ctl_file_path: Option<PathBuf>,
    pub db_url: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub legacy_encoding: String,
    pub sqlldr_path: PathBuf,
    pub sqlplus_path: PathBuf,
}

impl Config {
    /// Reads `env_file` (which must exist when given) or `./.env` when present.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        let file_values = match env_file {
            Some(path) => read_env_file(path)?,
            None if Path::new(DEFAULT_ENV_FILE).is_file() => {
                read_env_file(Path::new(DEFAULT_ENV_FILE))?
            }
            None => {
                info!("No {DEFAULT_ENV_FILE} file found; using process environment only");
                HashMap::new()
            }
        };
        Ok(Self::from_lookup(|key| {
            env::var(key).ok().or_else(|| file_values.get(key).cloned())
        }))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Config {
            file_path: get("FILE_PATH").map(PathBuf::from),
            table_name: get("TABLE_NAME"),
            ctl_file_path: get("CTL_FILE_PATH").map(PathBuf::from),
            db_url: get("DB_URL"),
            db_user: get("DB_USER"),
            db_password: get("DB_PASSWORD"),
            legacy_encoding: get("LEGACY_ENCODING")
                .unwrap_or_else(|| DEFAULT_LEGACY_ENCODING.to_string()),
            sqlldr_path: get("SQLLDR_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLLDR)),
            sqlplus_path: get("SQLPLUS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLPLUS)),
        }
    }

    pub fn with_overrides(
        mut self,
        file: Option<PathBuf>,
        table: Option<String>,
        legacy_encoding: Option<String>,
    ) -> Self {
        if let Some(file) = file {
            self.file_path = Some(file);
        }
        if let Some(table) = table {
            self.table_name = Some(table);
        }
        if let Some(encoding) = legacy_encoding {
            self.legacy_encoding = encoding;
        }
        self
    }

    pub fn data_file(&self) -> Result<&Path> {
        self.file_path
            .as_deref()
            .ok_or_else(|| anyhow!("FILE_PATH is not set (use --file or the FILE_PATH variable)"))
    }

    pub fn table(&self) -> Result<&str> {
        let table = self
            .table_name
            .as_deref()
            .ok_or_else(|| anyhow!("TABLE_NAME is not set (use --table or the TABLE_NAME variable)"))?;
        if !table_name_pattern().is_match(table) {
            bail!(
                "Table name '{table}' is not a valid Oracle identifier \
                 (letters, digits, '_', '$', '#', starting with a letter)"
            );
        }
        Ok(table)
    }

    pub fn codec(&self) -> Result<LegacyCodec> {
        LegacyCodec::for_label(&self.legacy_encoding)
            .with_context(|| format!("Resolving LEGACY_ENCODING '{}'", self.legacy_encoding))
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let require = |value: &Option<String>, key: &str| {
            value
                .clone()
                .ok_or_else(|| anyhow!("{key} is not set; it is required to reach the database"))
        };
        Ok(Credentials {
            user: require(&self.db_user, "DB_USER")?,
            password: require(&self.db_password, "DB_PASSWORD")?,
            dsn: require(&self.db_url, "DB_URL")?,
        })
    }
}

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_$#]*$").expect("valid table pattern"))
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("Opening env file {path:?}"))?
        .collect::<std::result::Result<HashMap<_, _>, _>>()
        .with_context(|| format!("Parsing env file {path:?}"))?;
    debug!("Loaded {} value(s) from {:?}", entries.len(), path);
    info!("{path:?} loaded");
    Ok(entries)
}
