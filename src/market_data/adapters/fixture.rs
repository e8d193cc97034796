// Serves a gamma dataset from a JSON file on disk. Used for offline runs and demos.

use std::path::PathBuf;

use tracing::debug;

use super::{GammaProvider, RawDataset};
use crate::engine::types::Symbol;
use crate::error::ProviderError;

pub struct FixtureProvider {
    path: PathBuf,
}

impl FixtureProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl GammaProvider for FixtureProvider {
    async fn get_gamma_data(&self, symbol: &Symbol) -> Result<RawDataset, ProviderError> {
        debug!(path = %self.path.display(), %symbol, "reading fixture");
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ProviderError::Io(format!("{}: {}", self.path.display(), e)))?;
        let value = serde_json::from_str(&text).map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(RawDataset(value))
    }
}
