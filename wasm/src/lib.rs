use meshmap_tiles::dump::PlacementDump;
use meshmap_tiles::geo::TileCoord;
use meshmap_tiles::text_metrics::FixedAdvanceMeasurer;
use meshmap_tiles::{Config, Dataset, MeshMap};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TileSourceOptions {
    /// Average glyph advance in em; browsers have no font database to read.
    advance_em: Option<f32>,
}

fn to_js(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn build_map(config_json: Option<String>, options_json: Option<String>) -> Result<MeshMap, String> {
    let config = match config_json {
        Some(raw) => meshmap_tiles::config::parse_config(&raw).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    let options = match options_json {
        Some(raw) => serde_json::from_str::<TileSourceOptions>(&raw).map_err(|e| e.to_string())?,
        None => TileSourceOptions::default(),
    };
    let measurer = match options.advance_em {
        Some(advance) => FixedAdvanceMeasurer::new(advance),
        None => FixedAdvanceMeasurer::default(),
    };
    MeshMap::with_measurer(config, Box::new(measurer)).map_err(|e| e.to_string())
}

/// Tile source for a browser map: feed it the dataset, ask it for tiles.
#[wasm_bindgen]
pub struct MeshTileSource {
    map: MeshMap,
}

#[wasm_bindgen]
impl MeshTileSource {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>, options_json: Option<String>) -> Result<MeshTileSource, JsValue> {
        build_map(config_json, options_json)
            .map(|map| MeshTileSource { map })
            .map_err(to_js)
    }

    /// Replaces the dataset and recomputes every layer.
    #[wasm_bindgen(js_name = setData)]
    pub fn set_data(&mut self, dataset_json: &str) -> Result<(), JsValue> {
        let dataset = Dataset::from_json(dataset_json).map_err(to_js)?;
        self.map.set_data(&dataset);
        Ok(())
    }

    /// SVG markup for one tile; an empty `<svg>` when nothing is drawn.
    #[wasm_bindgen(js_name = createTile)]
    pub fn create_tile(&self, z: u8, x: u32, y: u32) -> String {
        self.map.tile_canvas(TileCoord::new(x, y, z)).to_svg()
    }

    /// Label placement as JSON, for debugging overlays.
    #[wasm_bindgen(js_name = placementJson)]
    pub fn placement_json(&self) -> Result<String, JsValue> {
        match self.map.placement() {
            Some(placement) => PlacementDump::from_placement(placement).to_json().map_err(to_js),
            None => Ok("null".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::build_map;
    use meshmap_tiles::geo::TileCoord;
    use meshmap_tiles::Dataset;

    #[test]
    fn renders_tiles_after_set_data() {
        let dataset = r#"{
            "nodes": {
                "online": [{
                    "node_id": "c04a00dd692a",
                    "hostname": "ffhh-one",
                    "location": {"latitude": 53.55, "longitude": 9.99},
                    "clients": 3, "clients_wifi24": 3
                }]
            }
        }"#;
        let mut map = build_map(None, Some(r#"{"advanceEm": 0.5}"#.to_string())).unwrap();
        map.set_data(&Dataset::from_json(dataset).unwrap());

        let world = map.projection().project(meshmap_tiles::geo::LatLng::new(53.55, 9.99), 16);
        let svg = map
            .tile_canvas(TileCoord::new((world.x / 256.0) as u32, (world.y / 256.0) as u32, 16))
            .to_svg();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("ffhh-one"));
        assert_eq!(svg.matches("r=\"3.00\"").count(), 3);
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(build_map(Some(r#"{"labelZoom": 25}"#.to_string()), None).is_err());
    }
}
