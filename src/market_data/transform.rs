// Converts a provider's raw dataset into flat table rows.
// Pure and synchronous: same input, same rows, in the same order.

use crate::engine::types::{RowRecord, RowSequence};
use crate::error::TransformError;
use crate::market_data::adapters::thf_types::GammaPayload;
use crate::market_data::adapters::RawDataset;

pub trait RowTransformer: Send + Sync {
    fn transform(&self, raw: &RawDataset) -> Result<RowSequence, TransformError>;
}

/// One row per strike level, each stamped with the dataset's symbol and zero-GEX.
#[derive(Debug, Default, Clone, Copy)]
pub struct DealerGammaTransformer;

impl DealerGammaTransformer {
    fn check_shape(value: &serde_json::Value) -> Result<(), TransformError> {
        let obj = value
            .as_object()
            .ok_or_else(|| TransformError::Malformed("expected a JSON object".into()))?;
        if !obj.contains_key("symbol") {
            return Err(TransformError::MissingField("symbol"));
        }
        if !["zeroGex", "zero_gex", "zerogex"].iter().any(|k| obj.contains_key(*k)) {
            return Err(TransformError::MissingField("zeroGex"));
        }
        if !obj.contains_key("levels") {
            return Err(TransformError::MissingField("levels"));
        }
        Ok(())
    }
}

impl RowTransformer for DealerGammaTransformer {
    fn transform(&self, raw: &RawDataset) -> Result<RowSequence, TransformError> {
        Self::check_shape(&raw.0)?;
        let payload: GammaPayload = serde_json::from_value(raw.0.clone())
            .map_err(|e| TransformError::Malformed(e.to_string()))?;

        let symbol = payload.symbol.trim();
        if symbol.is_empty() {
            return Err(TransformError::EmptySymbol);
        }

        Ok(payload
            .levels
            .iter()
            .map(|lvl| RowRecord {
                symbol: symbol.to_string(),
                zerogex: payload.zero_gex,
                strike: lvl.strike,
                gamma: lvl.gamma,
            })
            .collect())
    }
}
