use crate::layers::labels::LabelPlacement;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct PlacementDump {
    pub margin: f64,
    pub labels: Vec<LabelDump>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LabelDump {
    pub node_id: String,
    pub text: String,
    pub category: String,
    pub lat: f64,
    pub lng: f64,
    pub anchor: String,
    pub offset: [f64; 2],
    pub width: f64,
    pub height: f64,
    pub min_zoom: u8,
}

impl PlacementDump {
    pub fn from_placement(placement: &LabelPlacement) -> Self {
        let labels = placement
            .labels()
            .iter()
            .map(|label| LabelDump {
                node_id: label.node_id.clone(),
                text: label.text.clone(),
                category: format!("{:?}", label.category).to_lowercase(),
                lat: label.position.lat,
                lng: label.position.lng,
                anchor: label.anchor.name(),
                offset: [label.offset.x, label.offset.y],
                width: label.width,
                height: label.height,
                min_zoom: label.min_zoom,
            })
            .collect();

        PlacementDump {
            margin: placement.margin(),
            labels,
            dropped: placement.dropped().to_vec(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn write_placement_dump(path: &Path, placement: &LabelPlacement) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = PlacementDump::from_placement(placement);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
