// Market data module entrypoint
pub mod adapters;   // remote gamma sources (HTTP service, JSON fixture)
pub mod transform;  // raw dataset -> table rows
