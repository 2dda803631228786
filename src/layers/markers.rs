//! Node markers and link lines.
//!
//! Every located node is drawn as a circle styled by its state. Links
//! between located nodes are drawn underneath, coloured by link quality.
//! The layer also answers hit tests so a host can turn a click into a
//! [`Selection`].

use super::TileLayer;
use crate::canvas::{DrawOp, Fill, Stroke, TileCanvas};
use crate::config::{Config, IconConfig, IconStyle};
use crate::geo::{LatLng, Point, Projection, Rect, TileCoord, ZoomRange};
use crate::model::{Dataset, LinkId, Node, NodeCategory, NodeId};
use crate::spatial::SpatialIndex;
use crate::theme::Theme;
use chrono::{DateTime, Utc};

pub const LINK_WEIGHT: f64 = 4.0;
pub const LINK_OPACITY: f64 = 0.5;
/// Extra pixels around a link line that still count as a hit.
const LINK_TOLERANCE: f64 = 3.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// What a click on the map resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Node(NodeId),
    Link(LinkId),
}

/// Receives selections. The map never navigates on its own.
pub trait Navigator {
    fn navigate(&mut self, selection: &Selection);
}

impl<F: FnMut(&Selection)> Navigator for F {
    fn navigate(&mut self, selection: &Selection) {
        self(selection)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub node_id: NodeId,
    pub position: LatLng,
    pub category: NodeCategory,
    pub style: IconStyle,
}

impl Marker {
    /// Radius within which a click selects the marker.
    fn reach(&self) -> f64 {
        if self.style.stroke {
            self.style.radius + self.style.weight / 2.0
        } else {
            self.style.radius
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkLine {
    pub link_id: LinkId,
    pub source: LatLng,
    pub target: LatLng,
    pub color: String,
}

/// Days between `lastseen` and `now`; `None` when either is unknown.
fn age_in_days(lastseen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<f64> {
    let lastseen = lastseen?;
    Some((now - lastseen).num_seconds() as f64 / SECONDS_PER_DAY)
}

/// Style of the marker for `node` in `category`, or `None` for lost nodes
/// that have been gone longer than `max_age` days.
pub fn marker_style<'a>(
    category: NodeCategory,
    node: &Node,
    now: DateTime<Utc>,
    icons: &'a IconConfig,
    max_age: f64,
    max_age_alert: f64,
) -> Option<&'a IconStyle> {
    match category {
        NodeCategory::New if node.has_uplink() => Some(&icons.new_uplink),
        NodeCategory::New => Some(&icons.new),
        NodeCategory::Online if node.has_uplink() => Some(&icons.online_uplink),
        NodeCategory::Online => Some(&icons.online),
        NodeCategory::Offline => Some(&icons.offline),
        NodeCategory::Lost => match age_in_days(node.lastseen, now) {
            Some(age) if age <= max_age_alert => Some(&icons.alert),
            Some(age) if age <= max_age => Some(&icons.lost),
            Some(_) => None,
            None => Some(&icons.lost),
        },
    }
}

/// Draw order from bottom to top.
const DRAW_ORDER: [NodeCategory; 4] = [
    NodeCategory::Offline,
    NodeCategory::Lost,
    NodeCategory::Online,
    NodeCategory::New,
];

pub struct MarkerLayer {
    projection: Projection,
    zooms: ZoomRange,
    icons: IconConfig,
    theme: Theme,
    max_age: f64,
    max_age_alert: f64,
    markers: Vec<Marker>,
    marker_index: SpatialIndex<usize>,
    links: Vec<LinkLine>,
    link_index: SpatialIndex<usize>,
    /// Largest marker reach, used to pad tile queries.
    padding: f64,
}

impl MarkerLayer {
    pub fn new(config: &Config) -> Self {
        Self {
            projection: config.map.projection(),
            zooms: config.map.marker_zooms(),
            icons: config.icons.clone(),
            theme: config.theme.clone(),
            max_age: config.map.max_age,
            max_age_alert: config.map.max_age_alert,
            markers: Vec::new(),
            marker_index: SpatialIndex::new(),
            links: Vec::new(),
            link_index: SpatialIndex::new(),
            padding: LINK_WEIGHT,
        }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn links(&self) -> &[LinkLine] {
        &self.links
    }

    /// Resolves a world pixel at `zoom` to the marker or link under it.
    /// Markers win over links; among several candidates the nearest wins.
    pub fn hit_test(&self, world: Point, zoom: u8) -> Option<Selection> {
        self.node_at(world, zoom)
            .or_else(|| self.link_at(world, zoom))
    }

    /// Nearest marker whose circle contains `world`.
    pub fn node_at(&self, world: Point, zoom: u8) -> Option<Selection> {
        let query = self.projection.bounds_around(world, zoom, self.padding).to_rect();
        self.marker_index
            .search(&query)
            .filter_map(|(_, idx)| {
                let marker = &self.markers[*idx];
                let distance = self.projection.project(marker.position, zoom).distance(world);
                (distance <= marker.reach()).then_some((distance, *idx))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, idx)| Selection::Node(self.markers[idx].node_id.clone()))
    }

    /// Nearest link line passing within half its weight plus a small
    /// tolerance of `world`.
    pub fn link_at(&self, world: Point, zoom: u8) -> Option<Selection> {
        let reach = LINK_WEIGHT / 2.0 + LINK_TOLERANCE;
        let query = self.projection.bounds_around(world, zoom, reach).to_rect();
        self.link_index
            .search(&query)
            .filter_map(|(_, idx)| {
                let link = &self.links[*idx];
                let a = self.projection.project(link.source, zoom);
                let b = self.projection.project(link.target, zoom);
                let distance = world.distance_to_segment(a, b);
                (distance <= reach).then_some((distance, *idx))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, idx)| Selection::Link(self.links[idx].link_id.clone()))
    }

    fn marker_op(marker: &Marker, center: Point) -> DrawOp {
        let style = &marker.style;
        DrawOp::Circle {
            center,
            radius: style.radius,
            fill: Some(Fill {
                color: style.fill_color.clone(),
                opacity: style.fill_opacity,
            }),
            stroke: style.stroke.then(|| Stroke {
                color: style.color.clone(),
                width: style.weight,
                opacity: style.opacity,
                miter_limit: None,
            }),
        }
    }
}

impl TileLayer for MarkerLayer {
    fn set_data(&mut self, dataset: &Dataset) {
        let now = dataset.now.unwrap_or_else(Utc::now);
        let groups = dataset.grouped();

        let mut markers = Vec::new();
        let mut hidden = 0usize;
        for category in DRAW_ORDER {
            for node in groups.get(category) {
                let Some(position) = node.position() else {
                    continue;
                };
                match marker_style(
                    category,
                    node,
                    now,
                    &self.icons,
                    self.max_age,
                    self.max_age_alert,
                ) {
                    Some(style) => markers.push(Marker {
                        node_id: node.node_id.clone(),
                        position,
                        category,
                        style: style.clone(),
                    }),
                    None => hidden += 1,
                }
            }
        }

        let nodes = dataset.node_dict();
        let links: Vec<LinkLine> = dataset
            .links
            .iter()
            .filter(|link| link.distance.is_some() && !link.is_vpn())
            .filter_map(|link| {
                let source = nodes.get(link.source.as_str())?.position()?;
                let target = nodes.get(link.target.as_str())?.position()?;
                Some(LinkLine {
                    link_id: link.id.clone(),
                    source,
                    target,
                    color: self.theme.link_color(link.mean_tq()),
                })
            })
            .collect();

        self.padding = markers
            .iter()
            .map(Marker::reach)
            .fold(LINK_WEIGHT, f64::max);
        self.marker_index = SpatialIndex::bulk_load(
            markers
                .iter()
                .enumerate()
                .map(|(idx, m)| (Rect::point(m.position.lng, m.position.lat), idx))
                .collect(),
        );
        self.link_index = SpatialIndex::bulk_load(
            links
                .iter()
                .enumerate()
                .map(|(idx, link)| {
                    let rect = Rect::new(
                        link.source.lng.min(link.target.lng),
                        link.source.lat.min(link.target.lat),
                        link.source.lng.max(link.target.lng),
                        link.source.lat.max(link.target.lat),
                    );
                    (rect, idx)
                })
                .collect(),
        );
        tracing::debug!(
            markers = markers.len(),
            hidden_lost = hidden,
            links = links.len(),
            "marker layer updated"
        );
        self.markers = markers;
        self.links = links;
    }

    fn create_tile(&self, coord: TileCoord) -> TileCanvas {
        let mut canvas = TileCanvas::new(self.projection.tile_size);
        if !self.zooms.contains(coord.z) {
            return canvas;
        }
        let origin = coord.origin(self.projection.tile_size);
        let local = |pos: LatLng| {
            let world = self.projection.project(pos, coord.z);
            Point::new(world.x - origin.x, world.y - origin.y)
        };

        let link_bounds = self
            .projection
            .tile_bbox(origin, coord.z, LINK_WEIGHT)
            .to_rect();
        let mut link_hits: Vec<usize> = self
            .link_index
            .search(&link_bounds)
            .map(|(_, idx)| *idx)
            .collect();
        link_hits.sort_unstable();
        for idx in link_hits {
            let link = &self.links[idx];
            canvas.push(DrawOp::Polyline {
                points: vec![local(link.source), local(link.target)],
                stroke: Stroke {
                    color: link.color.clone(),
                    width: LINK_WEIGHT,
                    opacity: LINK_OPACITY,
                    miter_limit: None,
                },
            });
        }

        let marker_bounds = self
            .projection
            .tile_bbox(origin, coord.z, self.padding)
            .to_rect();
        let mut marker_hits: Vec<usize> = self
            .marker_index
            .search(&marker_bounds)
            .map(|(_, idx)| *idx)
            .collect();
        marker_hits.sort_unstable();
        for idx in marker_hits {
            let marker = &self.markers[idx];
            canvas.push(Self::marker_op(marker, local(marker.position)));
        }
        canvas
    }

    fn zooms(&self) -> ZoomRange {
        self.zooms
    }

    fn z_index(&self) -> i32 {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, Location, Neighbour, NodeSets};
    use chrono::Duration;

    fn located(id: &str, lat: f64, lng: f64) -> Node {
        let mut node = Node::new(id, id);
        node.location = Some(Location {
            latitude: lat,
            longitude: lng,
        });
        node
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn link(id: &str, source: &str, target: &str, link_type: &str, distance: Option<f64>) -> Link {
        Link {
            id: id.to_string(),
            link_type: link_type.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            source_tq: 1.0,
            target_tq: 0.0,
            distance,
        }
    }

    #[test]
    fn lost_nodes_fade_with_age() {
        let icons = IconConfig::default();
        let mut node = located("gone", 53.5, 10.0);
        let style = |node: &Node| marker_style(NodeCategory::Lost, node, now(), &icons, 14.0, 3.0);

        node.lastseen = Some(now() - Duration::days(1));
        assert_eq!(style(&node), Some(&icons.alert));
        node.lastseen = Some(now() - Duration::days(10));
        assert_eq!(style(&node), Some(&icons.lost));
        node.lastseen = Some(now() - Duration::days(20));
        assert_eq!(style(&node), None);
        node.lastseen = None;
        assert_eq!(style(&node), Some(&icons.lost));
    }

    #[test]
    fn uplink_nodes_use_uplink_style() {
        let icons = IconConfig::default();
        let mut node = located("up", 53.5, 10.0);
        node.neighbours.push(Neighbour {
            node_id: "gw".to_string(),
            link_type: "vpn".to_string(),
        });
        let style = marker_style(NodeCategory::Online, &node, now(), &icons, 14.0, 3.0);
        assert_eq!(style, Some(&icons.online_uplink));
        let style = marker_style(NodeCategory::New, &node, now(), &icons, 14.0, 3.0);
        assert_eq!(style, Some(&icons.new_uplink));
    }

    fn dataset() -> Dataset {
        Dataset {
            nodes: NodeSets {
                online: vec![located("a", 53.5, 10.0), located("b", 53.5, 10.001)],
                offline: vec![located("c", 53.501, 10.0), Node::new("d", "d")],
                ..NodeSets::default()
            },
            links: vec![
                link("a-b", "a", "b", "wifi", Some(70.0)),
                link("a-c", "a", "c", "vpn", Some(110.0)),
                link("b-c", "b", "c", "wifi", None),
                link("a-d", "a", "d", "wifi", Some(5.0)),
            ],
            now: Some(now()),
        }
    }

    #[test]
    fn only_located_non_vpn_links_with_distance_are_drawn() {
        let mut layer = MarkerLayer::new(&Config::default());
        layer.set_data(&dataset());
        assert_eq!(layer.markers().len(), 3);
        assert_eq!(layer.links().len(), 1);
        assert_eq!(layer.links()[0].link_id, "a-b");
        assert_eq!(layer.links()[0].color, "rgb(122, 117, 19)");
    }

    #[test]
    fn tile_draws_links_below_markers() {
        let config = Config::default();
        let mut layer = MarkerLayer::new(&config);
        layer.set_data(&dataset());
        let projection = config.map.projection();
        let p = projection.project(LatLng::new(53.5, 10.0005), 14);
        let canvas = layer.create_tile(TileCoord::new((p.x / 256.0) as u32, (p.y / 256.0) as u32, 14));
        let ops = canvas.ops();
        assert!(matches!(&ops[0], DrawOp::Polyline { stroke, .. } if stroke.width == LINK_WEIGHT));
        assert_eq!(ops.iter().filter(|op| matches!(op, DrawOp::Circle { .. })).count(), 3);
        assert!(matches!(&ops[1], DrawOp::Circle { radius, .. } if *radius == config.icons.offline.radius));
    }

    #[test]
    fn new_markers_are_drawn_on_top() {
        let mut lost = located("lost", 53.5, 10.0);
        lost.lastseen = Some(now() - Duration::days(1));
        let dataset = Dataset {
            nodes: NodeSets {
                online: vec![located("fresh", 53.5, 10.0), located("up", 53.5, 10.0)],
                offline: vec![located("down", 53.5, 10.0), lost.clone()],
                new: vec![located("fresh", 53.5, 10.0)],
                lost: vec![lost],
            },
            now: Some(now()),
            ..Dataset::default()
        };
        let mut layer = MarkerLayer::new(&Config::default());
        layer.set_data(&dataset);
        let order: Vec<(NodeCategory, &str)> = layer
            .markers()
            .iter()
            .map(|m| (m.category, m.node_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (NodeCategory::Offline, "down"),
                (NodeCategory::Lost, "lost"),
                (NodeCategory::Online, "up"),
                (NodeCategory::New, "fresh"),
            ]
        );
    }

    #[test]
    fn hit_test_prefers_markers_then_links() {
        let config = Config::default();
        let mut layer = MarkerLayer::new(&config);
        layer.set_data(&dataset());
        let projection = config.map.projection();
        let zoom = 18;

        let a = projection.project(LatLng::new(53.5, 10.0), zoom);
        let b = projection.project(LatLng::new(53.5, 10.001), zoom);
        assert_eq!(layer.hit_test(a.offset(2.0, 1.0), zoom), Some(Selection::Node("a".to_string())));

        let middle = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0 + 3.0);
        assert_eq!(layer.hit_test(middle, zoom), Some(Selection::Link("a-b".to_string())));
        assert_eq!(layer.hit_test(middle.offset(0.0, 40.0), zoom), None);
    }

    #[test]
    fn closures_are_navigators() {
        let mut seen = Vec::new();
        let mut navigator = |selection: &Selection| seen.push(selection.clone());
        navigator.navigate(&Selection::Node("a".to_string()));
        assert_eq!(seen, vec![Selection::Node("a".to_string())]);
    }
}
