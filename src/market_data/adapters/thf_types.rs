// Wire types for GET /dealer-gamma/{symbol}
//
// {"symbol": "SPY", "zeroGex": 451.2, "levels": [{"strike": 450, "gamma": 0.0123}, ...]}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GammaPayload {
    pub symbol: String,
    #[serde(rename = "zeroGex", alias = "zero_gex", alias = "zerogex")]
    pub zero_gex: f64,
    pub levels: Vec<GammaLevel>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GammaLevel {
    pub strike: f64,
    pub gamma: f64,
    // open interest etc. are ignored for now
}
