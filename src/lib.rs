pub mod canvas;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dump;
pub mod error;
pub mod geo;
pub mod layers;
pub mod map;
pub mod model;
#[cfg(feature = "png")]
pub mod raster;
pub mod spatial;
pub mod text_metrics;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, load_config};
pub use error::MeshMapError;
pub use layers::TileLayer;
pub use layers::markers::{Navigator, Selection};
pub use map::{MapView, MeshMap};
pub use model::Dataset;
