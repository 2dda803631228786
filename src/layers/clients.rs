//! Client density clouds.
//!
//! Every online node is surrounded by one small dot per connected client,
//! packed onto concentric orbits and coloured by radio band.

use super::TileLayer;
use crate::canvas::TileCanvas;
use crate::config::Config;
use crate::error::MeshMapError;
use crate::geo::{LatLng, Point, Projection, Rect, TileCoord, ZoomRange};
use crate::model::{ClientCounts, Dataset, NodeId};
use crate::spatial::SpatialIndex;
use std::f64::consts::PI;

pub const DOT_RADIUS: f64 = 3.0;
/// Spacing factor between neighbouring dots and orbits.
pub const PACKING: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientBand {
    Wifi24,
    Wifi5,
    Other,
}

impl ClientBand {
    /// Band of the `index`-th dot. Bands are consumed in order and never
    /// revisited; dots beyond the wifi sub-totals are `Other`.
    pub fn for_dot(index: u32, counts: &ClientCounts) -> Self {
        let index = u64::from(index);
        let wifi24 = u64::from(counts.wifi24);
        if index < wifi24 {
            ClientBand::Wifi24
        } else if index < wifi24 + u64::from(counts.wifi5) {
            ClientBand::Wifi5
        } else {
            ClientBand::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientDot {
    pub center: Point,
    pub orbit: u32,
    pub band: ClientBand,
}

/// Start angle of a node's cloud, derived from the 11th and 12th characters
/// of its id read as hex. Only the leading hex digits of that pair count;
/// ids without any start at angle 0.
pub fn start_angle(node_id: &str) -> f64 {
    let digits: String = node_id
        .chars()
        .skip(10)
        .take(2)
        .take_while(char::is_ascii_hexdigit)
        .collect();
    u8::from_str_radix(&digits, 16)
        .map(|value| f64::from(value) / 255.0 * 2.0 * PI)
        .unwrap_or(0.0)
}

/// Radial layout of `counts.total` dots around `center`.
///
/// Orbit `k` has radius `start_distance + k * 2 * DOT_RADIUS * PACKING` and
/// `floor(PI * radius / (PACKING * DOT_RADIUS))` equally spaced slots,
/// rotated by `start_angle`. Slots fill orbit by orbit.
pub fn layout_client_dots(
    center: Point,
    start_angle: f64,
    counts: &ClientCounts,
    start_distance: f64,
) -> Vec<ClientDot> {
    let total = counts.total;
    let mut dots = Vec::with_capacity(total as usize);
    let mut placed = 0u32;
    let mut orbit = 0u32;
    while placed < total {
        let distance = start_distance + f64::from(orbit) * 2.0 * DOT_RADIUS * PACKING;
        let slots = (PI * distance / (PACKING * DOT_RADIUS)).floor().max(0.0) as u32;
        let take = slots.min(total - placed);
        for slot in 0..take {
            let angle = 2.0 * PI / f64::from(slots) * f64::from(slot) + start_angle;
            dots.push(ClientDot {
                center: center.offset(distance * angle.cos(), distance * angle.sin()),
                orbit,
                band: ClientBand::for_dot(placed, counts),
            });
            placed += 1;
        }
        orbit += 1;
    }
    dots
}

#[derive(Debug, Clone)]
struct CloudNode {
    node_id: NodeId,
    position: LatLng,
    counts: ClientCounts,
    start_angle: f64,
}

pub struct ClientLayer {
    projection: Projection,
    zooms: ZoomRange,
    margin: f64,
    start_distance: f64,
    colors: [String; 3],
    nodes: Vec<CloudNode>,
    index: Option<SpatialIndex<usize>>,
}

impl ClientLayer {
    pub fn new(config: &Config) -> Result<Self, MeshMapError> {
        Ok(Self {
            projection: config.map.projection(),
            zooms: config.map.client_zooms()?,
            margin: config.map.client_margin,
            start_distance: config.map.client_start_distance,
            colors: [
                config.theme.client_wifi24.clone(),
                config.theme.client_wifi5.clone(),
                config.theme.client_other.clone(),
            ],
            nodes: Vec::new(),
            index: None,
        })
    }

    pub fn color(&self, band: ClientBand) -> &str {
        match band {
            ClientBand::Wifi24 => &self.colors[0],
            ClientBand::Wifi5 => &self.colors[1],
            ClientBand::Other => &self.colors[2],
        }
    }

    /// Start angle cached for a node by the last refresh.
    pub fn cached_start_angle(&self, node_id: &str) -> Option<f64> {
        self.nodes
            .iter()
            .find(|node| node.node_id == node_id)
            .map(|node| node.start_angle)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl TileLayer for ClientLayer {
    fn set_data(&mut self, dataset: &Dataset) {
        let mut inconsistent = 0usize;
        self.nodes = dataset
            .online_located()
            .filter_map(|node| {
                let counts = node.client_counts();
                if !counts.is_consistent() {
                    inconsistent += 1;
                    tracing::debug!(
                        node = %node.node_id,
                        clients = counts.total,
                        wifi24 = counts.wifi24,
                        wifi5 = counts.wifi5,
                        other = counts.other,
                        "client band counts do not add up"
                    );
                }
                Some(CloudNode {
                    node_id: node.node_id.clone(),
                    position: node.position()?,
                    counts,
                    start_angle: start_angle(&node.node_id),
                })
            })
            .collect();
        if inconsistent > 0 {
            tracing::warn!(
                nodes = inconsistent,
                "client band counts disagree with totals; drawing them unchanged"
            );
        }

        let entries = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (Rect::point(node.position.lng, node.position.lat), idx))
            .collect();
        self.index = Some(SpatialIndex::bulk_load(entries));
        tracing::info!(nodes = self.nodes.len(), "client layer updated");
    }

    fn create_tile(&self, coord: TileCoord) -> TileCanvas {
        let mut canvas = TileCanvas::new(self.projection.tile_size);
        let Some(index) = &self.index else {
            return canvas;
        };
        if !self.zooms.contains(coord.z) {
            return canvas;
        }

        let origin = coord.origin(self.projection.tile_size);
        let bbox = self.projection.tile_bbox(origin, coord.z, self.margin);
        let mut hits: Vec<usize> = index.search(&bbox.to_rect()).map(|(_, idx)| *idx).collect();
        hits.sort_unstable();

        for idx in hits {
            let node = &self.nodes[idx];
            let world = self.projection.project(node.position, coord.z);
            let local = Point::new(world.x - origin.x, world.y - origin.y);
            for dot in layout_client_dots(local, node.start_angle, &node.counts, self.start_distance) {
                canvas.fill_circle(dot.center, DOT_RADIUS, self.color(dot.band));
            }
        }
        canvas
    }

    fn zooms(&self) -> ZoomRange {
        self.zooms
    }

    fn z_index(&self) -> i32 {
        5
    }
}
