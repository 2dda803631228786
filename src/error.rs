use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshMapError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid dataset: {0}")]
    Dataset(#[source] serde_json::Error),
    #[error("invalid config: {0}")]
    ConfigJson(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    ConfigJson5(#[from] json5::Error),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("raster error: {0}")]
    Raster(String),
}
