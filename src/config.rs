//! Layered settings: built-in defaults < TOML file < `GEXVIEW_*` environment.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::engine::types::Symbol;
use crate::error::ConfigError;
use crate::view::columns::ColumnSpec;

pub const DEFAULT_CONFIG_NAME: &str = "gexview";
pub const ENV_PREFIX: &str = "GEXVIEW";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_symbol: String,
    /// Options offered by the symbol selector.
    pub symbols: Vec<String>,
    /// Field keys, in display order.
    pub columns: Vec<String>,
    pub api: ApiSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
    pub file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_symbol: "SPY".into(),
            symbols: vec!["SPY".into()],
            columns: ["symbol", "zerogex", "strike", "gamma"].map(String::from).to_vec(),
            api: ApiSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.thf-labs.com/v1".into(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: "info".into(), file: None }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("symbols")
        .with_list_parse_key("columns")
}

impl Settings {
    /// Loads `.env`, then `path` (required) or `./gexview.toml` (optional), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_from(path, env_source())
    }

    fn load_from(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let mut settings: Settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    // Normalises symbols and makes sure every column names a real field.
    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.columns.is_empty() {
            return Err(ConfigError::NoColumns);
        }
        let default = Symbol::new(&self.default_symbol)
            .map_err(|_| ConfigError::InvalidSymbol(self.default_symbol.clone()))?;
        let mut symbols = Vec::with_capacity(self.symbols.len() + 1);
        for raw in &self.symbols {
            let s = Symbol::new(raw).map_err(|_| ConfigError::InvalidSymbol(raw.clone()))?;
            if !symbols.contains(&s) {
                symbols.push(s);
            }
        }
        if !symbols.contains(&default) {
            symbols.insert(0, default.clone());
        }
        self.default_symbol = default.to_string();
        self.symbols = symbols.into_iter().map(String::from).collect();
        ColumnSpec::from_keys(&self.columns)?;
        Ok(())
    }

    pub fn default_symbol(&self) -> Result<Symbol, ConfigError> {
        Symbol::new(&self.default_symbol).map_err(|_| ConfigError::InvalidSymbol(self.default_symbol.clone()))
    }

    pub fn symbol_options(&self) -> Vec<Symbol> {
        self.symbols.iter().filter_map(|s| Symbol::new(s).ok()).collect()
    }

    pub fn column_spec(&self) -> Result<ColumnSpec, ConfigError> {
        ColumnSpec::from_keys(&self.columns)
    }
}
