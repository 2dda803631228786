//! Zoom-stable node labels.
//!
//! On every refresh each located node gets at most one label position,
//! chosen among eight anchors around its icon, together with the lowest
//! zoom from which the label is shown. A label committed for zoom `z` stays
//! visible at every higher zoom, and no two labels (or a label and any
//! icon) intersect at any zoom where both are visible.
//!
//! Placement works on one occupancy index per zoom level. Each index is
//! seeded with all icon footprints before any label is placed, then labels
//! are committed one at a time in category priority order. Later labels see
//! everything committed before them, so earlier labels win contested space.

use super::TileLayer;
use super::markers::Selection;
use crate::canvas::{DrawOp, Fill, Stroke, TextAlign, TextBaseline, TextRun, TileCanvas};
use crate::config::Config;
use crate::error::MeshMapError;
use crate::geo::{LatLng, Point, Projection, Rect, TileCoord, ZoomRange};
use crate::model::{Dataset, GroupedNodes, NodeCategory, NodeId};
use crate::spatial::SpatialIndex;
use crate::text_metrics::TextMeasure;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::time::Instant;

/// Extra scale applied to labels at the lowest zoom; shrinks linearly to
/// zero at the highest zoom.
const ZOOMED_OUT_GROWTH: f64 = 1.41;
const LINE_HEIGHT: f32 = 1.2;
const HALO_WIDTH: f64 = 5.0;
const HALO_MITER_LIMIT: f64 = 2.0;

/// Text alignment, baseline and direction (in eighths of a turn, y down) of
/// a label relative to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub align: TextAlign,
    pub baseline: TextBaseline,
    pub eighths: u8,
}

impl Anchor {
    const fn new(align: TextAlign, baseline: TextBaseline, eighths: u8) -> Self {
        Self {
            align,
            baseline,
            eighths,
        }
    }

    /// Offset vector of length `distance` in the anchor's direction.
    pub fn offset(&self, distance: f64) -> Point {
        let angle = f64::from(self.eighths) / 8.0 * 2.0 * PI;
        Point::new(distance * angle.cos(), distance * angle.sin())
    }

    pub fn name(&self) -> String {
        let align = match self.align {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        };
        let baseline = match self.baseline {
            TextBaseline::Top => "top",
            TextBaseline::Middle => "middle",
            TextBaseline::Ideographic => "ideographic",
        };
        format!("{align}/{baseline}")
    }
}

/// Candidate anchors in preference order.
pub const ANCHORS: [Anchor; 8] = [
    Anchor::new(TextAlign::Left, TextBaseline::Middle, 0),
    Anchor::new(TextAlign::Center, TextBaseline::Top, 6),
    Anchor::new(TextAlign::Right, TextBaseline::Middle, 4),
    Anchor::new(TextAlign::Left, TextBaseline::Top, 7),
    Anchor::new(TextAlign::Left, TextBaseline::Ideographic, 1),
    Anchor::new(TextAlign::Right, TextBaseline::Top, 5),
    Anchor::new(TextAlign::Center, TextBaseline::Ideographic, 2),
    Anchor::new(TextAlign::Right, TextBaseline::Ideographic, 3),
];

#[derive(Debug, Clone, PartialEq)]
pub struct LabelStyle {
    pub font_size: f32,
    /// Distance of the text anchor point from the node.
    pub distance: f64,
    /// Whether a halo is stroked under the text.
    pub stroke: bool,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelStyles {
    pub new: LabelStyle,
    pub lost: LabelStyle,
    pub online: LabelStyle,
    pub offline: LabelStyle,
}

impl LabelStyles {
    pub fn from_config(config: &Config) -> Self {
        let regular = |color: &str| LabelStyle {
            font_size: 11.0,
            distance: 8.0,
            stroke: true,
            color: color.to_string(),
        };
        Self {
            new: regular(&config.theme.label_new_color),
            lost: regular(&config.icons.lost.color),
            online: regular(&config.theme.text_color),
            offline: LabelStyle {
                font_size: 9.0,
                distance: 5.0,
                stroke: false,
                color: config.icons.offline.color.clone(),
            },
        }
    }

    pub fn get(&self, category: NodeCategory) -> &LabelStyle {
        match category {
            NodeCategory::New => &self.new,
            NodeCategory::Lost => &self.lost,
            NodeCategory::Online => &self.online,
            NodeCategory::Offline => &self.offline,
        }
    }
}

/// A label waiting for placement.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelCandidate {
    pub node_id: NodeId,
    pub text: String,
    pub position: LatLng,
    pub category: NodeCategory,
    pub width: f64,
    pub height: f64,
    pub distance: f64,
}

/// A committed label.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub node_id: NodeId,
    pub text: String,
    pub position: LatLng,
    pub category: NodeCategory,
    pub width: f64,
    pub height: f64,
    pub anchor: Anchor,
    pub offset: Point,
    /// Lowest zoom at which the label is shown (inclusive).
    pub min_zoom: u8,
}

impl PlacedLabel {
    pub fn is_visible_at(&self, zoom: u8) -> bool {
        zoom >= self.min_zoom
    }

    /// Rectangle the text covers on screen at zoom `z`, without the
    /// zoomed-out growth used for reservation.
    pub fn drawn_rect(&self, projection: &Projection, z: u8) -> Rect {
        let point = projection.project(self.position, z);
        anchored_rect(point, self.offset, self.anchor, self.width, self.height)
    }

    /// Rectangle the label reserves at zoom `z`.
    pub fn rect_at(&self, projection: &Projection, zooms: &ZoomRange, z: u8) -> Rect {
        let point = projection.project(self.position, z);
        label_rect(point, self.offset, self.anchor, self.width, self.height, zooms, z)
    }
}

/// Scale factor applied to label boxes at zoom `z`: `1 + 1.41` at the
/// lowest zoom down to `1` at the highest.
pub fn margin_factor(zooms: &ZoomRange, z: u8) -> f64 {
    1.0 + ZOOMED_OUT_GROWTH * (1.0 - zooms.fraction(z))
}

pub fn label_rect(
    point: Point,
    offset: Point,
    anchor: Anchor,
    width: f64,
    height: f64,
    zooms: &ZoomRange,
    z: u8,
) -> Rect {
    let margin = margin_factor(zooms, z);
    anchored_rect(point, offset, anchor, width * margin, height * margin)
}

/// Box of a `width` x `height` text aligned at `point + offset`.
fn anchored_rect(point: Point, offset: Point, anchor: Anchor, width: f64, height: f64) -> Rect {
    let dx = match anchor.align {
        TextAlign::Left => 0.0,
        TextAlign::Right => -width,
        TextAlign::Center => -width / 2.0,
    };
    let dy = match anchor.baseline {
        TextBaseline::Top => 0.0,
        TextBaseline::Ideographic => -height,
        TextBaseline::Middle => -height / 2.0,
    };
    let x = point.x + offset.x + dx;
    let y = point.y + offset.y + dy;
    Rect::new(x, y, x + width, y + height)
}

/// One rectangle index per zoom level in the range.
pub struct OccupancyIndex {
    zooms: ZoomRange,
    levels: Vec<SpatialIndex<()>>,
}

impl OccupancyIndex {
    /// Seeds every level with a square footprint of `radius` around each
    /// position.
    pub fn with_icons(
        positions: &[LatLng],
        projection: &Projection,
        zooms: ZoomRange,
        radius: f64,
    ) -> Self {
        let levels = (zooms.min..=zooms.max)
            .map(|z| {
                SpatialIndex::bulk_load(
                    positions
                        .iter()
                        .map(|pos| (Rect::around(projection.project(*pos, z), radius), ()))
                        .collect(),
                )
            })
            .collect();
        Self { zooms, levels }
    }

    fn level(&self, z: u8) -> &SpatialIndex<()> {
        &self.levels[usize::from(z - self.zooms.min)]
    }

    pub fn is_occupied(&self, z: u8, rect: &Rect) -> bool {
        self.zooms.contains(z) && self.level(z).intersects_any(rect)
    }

    pub fn occupy(&mut self, z: u8, rect: Rect) {
        if self.zooms.contains(z) {
            let idx = usize::from(z - self.zooms.min);
            self.levels[idx].insert(rect, ());
        }
    }
}

pub struct PlacementParams {
    pub projection: Projection,
    pub zooms: ZoomRange,
    pub node_radius: f64,
    /// Base padding for tile queries; the widest placed label is added.
    pub tile_margin: f64,
}

/// Result of one placement run.
pub struct LabelPlacement {
    labels: Vec<PlacedLabel>,
    dropped: Vec<NodeId>,
    by_node: HashMap<NodeId, usize>,
    index: SpatialIndex<usize>,
    margin: f64,
}

impl LabelPlacement {
    pub fn labels(&self) -> &[PlacedLabel] {
        &self.labels
    }

    /// Nodes that could not be labelled at any zoom.
    pub fn dropped(&self) -> &[NodeId] {
        &self.dropped
    }

    pub fn get(&self, node_id: &str) -> Option<&PlacedLabel> {
        self.by_node.get(node_id).map(|idx| &self.labels[*idx])
    }

    /// Padding in pixels applied around tiles when querying labels.
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Placed labels anchored inside `bounds`, in placement order.
    pub fn search(&self, bounds: &Rect) -> Vec<&PlacedLabel> {
        let mut hits: Vec<usize> = self.index.search(bounds).map(|(_, idx)| *idx).collect();
        hits.sort_unstable();
        hits.into_iter().map(|idx| &self.labels[idx]).collect()
    }

    /// Topmost label drawn over the world pixel `world` at `zoom`.
    pub fn label_at(&self, projection: &Projection, world: Point, zoom: u8) -> Option<&PlacedLabel> {
        let bounds = projection.bounds_around(world, zoom, self.margin).to_rect();
        let hit = Rect::point(world.x, world.y);
        self.search(&bounds)
            .into_iter()
            .rev()
            .find(|label| label.is_visible_at(zoom) && label.drawn_rect(projection, zoom).intersects(&hit))
    }
}

/// Zoom from which `candidate` could be shown with `anchor`: one above the
/// highest zoom with a conflict, `zooms.max + 1` if it conflicts at the top.
fn feasible_zoom(
    candidate: &LabelCandidate,
    anchor: Anchor,
    occupancy: &OccupancyIndex,
    params: &PlacementParams,
) -> u8 {
    let offset = anchor.offset(candidate.distance);
    for z in params.zooms.descending() {
        let point = params.projection.project(candidate.position, z);
        let rect = label_rect(
            point,
            offset,
            anchor,
            candidate.width,
            candidate.height,
            &params.zooms,
            z,
        );
        if occupancy.is_occupied(z, &rect) {
            return z + 1;
        }
    }
    params.zooms.min
}

/// Places `candidates` in the given order.
pub fn place_labels(candidates: Vec<LabelCandidate>, params: &PlacementParams) -> LabelPlacement {
    let positions: Vec<LatLng> = candidates.iter().map(|c| c.position).collect();
    let mut occupancy = OccupancyIndex::with_icons(
        &positions,
        &params.projection,
        params.zooms,
        params.node_radius,
    );

    let mut labels = Vec::new();
    let mut dropped = Vec::new();
    for candidate in candidates {
        let mut best: Option<(Anchor, u8)> = None;
        for anchor in ANCHORS {
            let zoom = feasible_zoom(&candidate, anchor, &occupancy, params);
            if best.is_none_or(|(_, best_zoom)| zoom < best_zoom) {
                best = Some((anchor, zoom));
            }
        }
        let Some((anchor, min_zoom)) = best.filter(|(_, zoom)| *zoom <= params.zooms.max) else {
            tracing::debug!(node = %candidate.node_id, "no room for label at any zoom");
            dropped.push(candidate.node_id);
            continue;
        };

        let label = PlacedLabel {
            offset: anchor.offset(candidate.distance),
            node_id: candidate.node_id,
            text: candidate.text,
            position: candidate.position,
            category: candidate.category,
            width: candidate.width,
            height: candidate.height,
            anchor,
            min_zoom,
        };
        for z in (min_zoom..=params.zooms.max).rev() {
            occupancy.occupy(z, label.rect_at(&params.projection, &params.zooms, z));
        }
        labels.push(label);
    }

    let widest = labels.iter().map(|label| label.width).fold(0.0, f64::max);
    let index = SpatialIndex::bulk_load(
        labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (Rect::point(label.position.lng, label.position.lat), idx))
            .collect(),
    );
    let by_node = labels
        .iter()
        .enumerate()
        .map(|(idx, label)| (label.node_id.clone(), idx))
        .collect();

    LabelPlacement {
        labels,
        dropped,
        by_node,
        index,
        margin: params.tile_margin + widest,
    }
}

/// Measures every located node's label, in category priority order.
pub fn build_candidates(
    groups: &GroupedNodes,
    styles: &LabelStyles,
    font_family: &str,
    measurer: &mut dyn TextMeasure,
) -> Vec<LabelCandidate> {
    groups
        .in_priority_order()
        .filter_map(|(category, node)| {
            let style = styles.get(category);
            Some(LabelCandidate {
                node_id: node.node_id.clone(),
                position: node.position()?,
                category,
                width: f64::from(measurer.width(&node.hostname, style.font_size, font_family)),
                height: f64::from(style.font_size * LINE_HEIGHT),
                distance: style.distance,
                text: node.hostname.clone(),
            })
        })
        .collect()
}

pub struct LabelLayer {
    projection: Projection,
    zooms: ZoomRange,
    node_radius: f64,
    tile_margin: f64,
    styles: LabelStyles,
    font_family: String,
    halo: String,
    measurer: Box<dyn TextMeasure>,
    placement: Option<LabelPlacement>,
}

impl LabelLayer {
    pub fn new(config: &Config, measurer: Box<dyn TextMeasure>) -> Result<Self, MeshMapError> {
        Ok(Self {
            projection: config.map.projection(),
            zooms: config.map.label_zooms()?,
            node_radius: config.map.node_radius,
            tile_margin: config.map.label_margin,
            styles: LabelStyles::from_config(config),
            font_family: config.theme.font_family.clone(),
            halo: config.theme.label_halo(),
            measurer,
            placement: None,
        })
    }

    pub fn placement(&self) -> Option<&LabelPlacement> {
        self.placement.as_ref()
    }

    pub fn styles(&self) -> &LabelStyles {
        &self.styles
    }

    /// Node whose label is drawn over the world pixel `world` at `zoom`.
    pub fn hit_test(&self, world: Point, zoom: u8) -> Option<Selection> {
        if !self.zooms.contains(zoom) {
            return None;
        }
        let label = self.placement.as_ref()?.label_at(&self.projection, world, zoom)?;
        Some(Selection::Node(label.node_id.clone()))
    }

    fn draw_label(&self, canvas: &mut TileCanvas, label: &PlacedLabel, point: Point) {
        let style = self.styles.get(label.category);
        let run = TextRun {
            text: label.text.clone(),
            position: point.offset(label.offset.x, label.offset.y),
            font_size: style.font_size,
            font_family: self.font_family.clone(),
            align: label.anchor.align,
            baseline: label.anchor.baseline,
        };
        if style.stroke {
            canvas.push(DrawOp::StrokeText {
                run: run.clone(),
                stroke: Stroke {
                    color: self.halo.clone(),
                    width: HALO_WIDTH,
                    opacity: 1.0,
                    miter_limit: Some(HALO_MITER_LIMIT),
                },
            });
        }
        canvas.push(DrawOp::FillText {
            run,
            fill: Fill::solid(&style.color),
        });
    }
}

impl TileLayer for LabelLayer {
    fn set_data(&mut self, dataset: &Dataset) {
        let started = Instant::now();
        let groups = dataset.grouped();
        let candidates = build_candidates(
            &groups,
            &self.styles,
            &self.font_family,
            self.measurer.as_mut(),
        );
        let params = PlacementParams {
            projection: self.projection,
            zooms: self.zooms,
            node_radius: self.node_radius,
            tile_margin: self.tile_margin,
        };
        let placement = place_labels(candidates, &params);
        tracing::info!(
            placed = placement.labels().len(),
            dropped = placement.dropped().len(),
            zoom_levels = self.zooms.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "label placement updated"
        );
        self.placement = Some(placement);
    }

    fn create_tile(&self, coord: TileCoord) -> TileCanvas {
        let mut canvas = TileCanvas::new(self.projection.tile_size);
        let Some(placement) = &self.placement else {
            return canvas;
        };
        if !self.zooms.contains(coord.z) {
            return canvas;
        }

        let origin = coord.origin(self.projection.tile_size);
        let bbox = self
            .projection
            .tile_bbox(origin, coord.z, placement.margin());
        for label in placement.search(&bbox.to_rect()) {
            if !label.is_visible_at(coord.z) {
                continue;
            }
            let world = self.projection.project(label.position, coord.z);
            let local = Point::new(world.x - origin.x, world.y - origin.y);
            self.draw_label(&mut canvas, label, local);
        }
        canvas
    }

    fn zooms(&self) -> ZoomRange {
        self.zooms
    }

    fn z_index(&self) -> i32 {
        6
    }
}
