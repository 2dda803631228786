//! Tile sources drawn on top of the base map.
//!
//! Every layer follows the same contract: `set_data` rebuilds all cached
//! state from a fresh dataset, `create_tile` only reads that state. Tiles
//! may be requested in any order and any number of times.

pub mod clients;
pub mod labels;
pub mod markers;

use crate::canvas::TileCanvas;
use crate::geo::{TileCoord, ZoomRange};
use crate::model::Dataset;

pub use clients::ClientLayer;
pub use labels::LabelLayer;
pub use markers::MarkerLayer;

pub trait TileLayer {
    fn set_data(&mut self, dataset: &Dataset);

    fn create_tile(&self, coord: TileCoord) -> TileCanvas;

    fn zooms(&self) -> ZoomRange;

    /// Stacking order, higher layers are drawn later.
    fn z_index(&self) -> i32;
}
