// Shared trait + payload for remote gamma data sources

use crate::engine::types::Symbol;
use crate::error::ProviderError;

/// Whatever a provider returned for a symbol. The orchestrator never looks
/// inside; only the row transformer interprets it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDataset(pub serde_json::Value);

#[async_trait::async_trait]
pub trait GammaProvider: Send + Sync {
    async fn get_gamma_data(&self, symbol: &Symbol) -> Result<RawDataset, ProviderError>;
}

pub mod fixture;
pub mod thf;
pub mod thf_types;
