use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

// Instrument identifier, e.g. "SPY". Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, FetchError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FetchError::Validation(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = FetchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

// Monotonic per-orchestrator fetch counter. Higher = more recent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next(self) -> Self {
        RequestId(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Names of the fields a [`RowRecord`] carries. Columns can only point at one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Symbol,
    ZeroGex,
    Strike,
    Gamma,
}

impl FieldKey {
    pub const ALL: [FieldKey; 4] = [FieldKey::Symbol, FieldKey::ZeroGex, FieldKey::Strike, FieldKey::Gamma];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Symbol => "symbol",
            FieldKey::ZeroGex => "zerogex",
            FieldKey::Strike => "strike",
            FieldKey::Gamma => "gamma",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Borrowed view of one field's raw value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
}

// One renderable table row, as produced by the row transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub symbol: String,
    pub zerogex: f64,
    pub strike: f64,
    pub gamma: f64,
}

impl RowRecord {
    pub fn get(&self, key: FieldKey) -> FieldValue<'_> {
        match key {
            FieldKey::Symbol => FieldValue::Text(&self.symbol),
            FieldKey::ZeroGex => FieldValue::Number(self.zerogex),
            FieldKey::Strike => FieldValue::Number(self.strike),
            FieldKey::Gamma => FieldValue::Number(self.gamma),
        }
    }
}

/// Rows in transformer output order.
pub type RowSequence = Vec<RowRecord>;

/// Lifecycle of the table's data. Exactly one variant holds at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading { symbol: Symbol },
    Ready { symbol: Symbol, rows: RowSequence },
    Failed { message: String },
}

impl LoadState {
    /// Rows the table should show: empty unless `Ready`.
    pub fn rows(&self) -> &[RowRecord] {
        match self {
            LoadState::Ready { rows, .. } => rows,
            _ => &[],
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Failed { message } => Some(message),
            _ => None,
        }
    }
}
