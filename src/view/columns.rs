//! Column configuration for the gamma table.
//!
//! A [`ColumnSpec`] is plain data: which field each column shows, its header,
//! whether it can be sorted, and how a raw value turns into display text.

use crate::engine::types::{FieldKey, FieldValue};
use crate::error::ConfigError;

/// Maps a raw field value to display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    /// Numbers with a fixed number of decimals; text passes through.
    Fixed(usize),
}

impl Formatter {
    pub fn apply(self, value: FieldValue<'_>) -> String {
        match (self, value) {
            (Formatter::Fixed(decimals), FieldValue::Number(n)) => format!("{n:.decimals$}"),
            (_, FieldValue::Text(s)) => s.to_string(),
        }
    }
}

/// Presentation hint. The table uses it for alignment only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellClass {
    Symbol,
    Numeric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: FieldKey,
    pub header: &'static str,
    pub sortable: bool,
    pub formatter: Option<Formatter>,
    pub class: CellClass,
}

impl Column {
    /// Default column for a field: 2 decimals for price-like fields, 4 for gamma.
    pub fn for_field(key: FieldKey) -> Self {
        match key {
            FieldKey::Symbol => Column {
                key,
                header: "Symbol",
                sortable: true,
                formatter: None,
                class: CellClass::Symbol,
            },
            FieldKey::ZeroGex => Column::numeric(key, "Zero GEX", 2),
            FieldKey::Strike => Column::numeric(key, "Strike", 2),
            FieldKey::Gamma => Column::numeric(key, "Gamma", 4),
        }
    }

    fn numeric(key: FieldKey, header: &'static str, decimals: usize) -> Self {
        Column {
            key,
            header,
            sortable: true,
            formatter: Some(Formatter::Fixed(decimals)),
            class: CellClass::Numeric,
        }
    }

    /// Display text for one cell. Without a formatter values are stringified as-is.
    pub fn format(&self, value: FieldValue<'_>) -> String {
        match self.formatter {
            Some(f) => f.apply(value),
            None => match value {
                FieldValue::Text(s) => s.to_string(),
                FieldValue::Number(n) => n.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    columns: Vec<Column>,
}

impl ColumnSpec {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Builds a spec from field names, e.g. from settings.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self, ConfigError> {
        let columns = keys
            .iter()
            .map(|k| {
                k.as_ref()
                    .parse::<FieldKey>()
                    .map(Column::for_field)
                    .map_err(ConfigError::UnknownColumn)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn position(&self, key: FieldKey) -> Option<usize> {
        self.columns.iter().position(|c| c.key == key)
    }
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self::new(FieldKey::ALL.into_iter().map(Column::for_field).collect())
    }
}
