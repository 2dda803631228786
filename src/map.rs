//! The map façade: a view over the host map and the layers drawn on it.
//!
//! `MapView` holds the state a tiling host keeps (container size, centre,
//! zoom) plus an optional active area, the part of the container that is
//! not covered by UI chrome. Centre and bounds queries honour the active
//! area. `MeshMap` owns one instance of each overlay layer and is the only
//! place that fans a dataset out to them.

use crate::canvas::TileCanvas;
use crate::config::Config;
use crate::error::MeshMapError;
use crate::geo::{GeoBounds, LatLng, Point, Projection, TileCoord};
use crate::layers::labels::LabelPlacement;
use crate::layers::markers::{Navigator, Selection};
use crate::layers::{ClientLayer, LabelLayer, MarkerLayer, TileLayer};
use crate::model::Dataset;
use crate::text_metrics::{FontMeasurer, TextMeasure};

/// Container-relative rectangle of the visible part of the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveArea {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    projection: Projection,
    width: u32,
    height: u32,
    /// Geographic position of the container centre.
    center: LatLng,
    zoom: u8,
    active_area: Option<ActiveArea>,
}

impl MapView {
    pub fn new(projection: Projection, width: u32, height: u32, center: LatLng, zoom: u8) -> Self {
        Self {
            projection,
            width,
            height,
            center,
            zoom,
            active_area: None,
        }
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn active_area(&self) -> Option<ActiveArea> {
        self.active_area
    }

    /// Restricts the view to `area`. With `keep_center` the visible centre
    /// stays on the same position.
    pub fn set_active_area(&mut self, area: ActiveArea, keep_center: bool) {
        let center = self.center();
        self.active_area = Some(area);
        if keep_center {
            self.set_view(center, self.zoom);
        }
    }

    /// Top-left and bottom-right container pixels of the viewport. An active
    /// area without a size falls back to the whole container.
    pub fn viewport_bounds(&self) -> (Point, Point) {
        let full = (
            Point::default(),
            Point::new(f64::from(self.width), f64::from(self.height)),
        );
        match self.active_area {
            Some(area) if area.width > 0.0 && area.height > 0.0 => (
                Point::new(area.left, area.top),
                Point::new(area.left + area.width, area.top + area.height),
            ),
            _ => full,
        }
    }

    /// Container centre minus viewport centre.
    pub fn offset(&self) -> Point {
        let (min, max) = self.viewport_bounds();
        Point::new(
            f64::from(self.width) / 2.0 - (min.x + max.x) / 2.0,
            f64::from(self.height) / 2.0 - (min.y + max.y) / 2.0,
        )
    }

    /// Centre of the viewport, i.e. what the user perceives as the centre.
    pub fn center(&self) -> LatLng {
        if self.active_area.is_none() {
            return self.center;
        }
        let offset = self.offset();
        let point = self.projection.project(self.center, self.zoom);
        self.projection
            .unproject(point.offset(-offset.x, -offset.y), self.zoom)
    }

    /// Centre of the whole container.
    pub fn container_center(&self) -> LatLng {
        self.center
    }

    /// Moves the viewport centre to `center`.
    pub fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.zoom = zoom;
        self.center = match self.active_area {
            Some(_) => {
                let offset = self.offset();
                let point = self.projection.project(center, zoom);
                self.projection
                    .unproject(point.offset(offset.x, offset.y), zoom)
            }
            None => center,
        };
    }

    /// Highest zoom in `[min_zoom, max_zoom]` at which `bounds` fits the
    /// viewport; the view is centred on the bounds.
    pub fn fit_bounds(&mut self, bounds: GeoBounds, min_zoom: u8, max_zoom: u8) {
        let (min, max) = self.viewport_bounds();
        let size = Point::new(max.x - min.x, max.y - min.y);
        let nw = self
            .projection
            .project(LatLng::new(bounds.north, bounds.west), 0);
        let se = self
            .projection
            .project(LatLng::new(bounds.south, bounds.east), 0);
        let span_x = (se.x - nw.x).abs();
        let span_y = (se.y - nw.y).abs();
        let scale = (size.x / span_x).min(size.y / span_y);
        let zoom = if scale.is_finite() && scale > 0.0 {
            scale.log2().floor().clamp(f64::from(min_zoom), f64::from(max_zoom)) as u8
        } else {
            max_zoom
        };
        let center = self.projection.unproject(
            Point::new((nw.x + se.x) / 2.0, (nw.y + se.y) / 2.0),
            0,
        );
        self.set_view(center, zoom);
    }

    /// World pixel of the container's top-left corner.
    pub fn pixel_origin(&self) -> Point {
        let center = self.projection.project(self.center, self.zoom);
        center.offset(-f64::from(self.width) / 2.0, -f64::from(self.height) / 2.0)
    }

    pub fn container_to_world(&self, point: Point) -> Point {
        let origin = self.pixel_origin();
        origin.offset(point.x, point.y)
    }

    pub fn container_to_lat_lng(&self, point: Point) -> LatLng {
        self.projection
            .unproject(self.container_to_world(point), self.zoom)
    }

    pub fn lat_lng_to_container(&self, pos: LatLng) -> Point {
        let origin = self.pixel_origin();
        let world = self.projection.project(pos, self.zoom);
        Point::new(world.x - origin.x, world.y - origin.y)
    }

    /// Geographic bounds of the viewport.
    pub fn bounds(&self) -> GeoBounds {
        let (min, max) = self.viewport_bounds();
        let top_left = self.container_to_lat_lng(min);
        let bottom_right = self.container_to_lat_lng(max);
        GeoBounds {
            south: bottom_right.lat,
            west: top_left.lng,
            north: top_left.lat,
            east: bottom_right.lng,
        }
    }

    /// Tiles intersecting the container, nearest to the centre first. Zooms
    /// whose tile columns do not fit a `u32` have no tiles.
    pub fn visible_tiles(&self) -> Vec<TileCoord> {
        let Some(count) = 1u64
            .checked_shl(u32::from(self.zoom))
            .filter(|count| *count <= u64::from(u32::MAX) + 1)
            .map(|count| count as i64)
        else {
            tracing::warn!(zoom = self.zoom, "zoom out of tile range, no tiles");
            return Vec::new();
        };
        let size = f64::from(self.projection.tile_size);
        let origin = self.pixel_origin();
        let first = |v: f64| ((v / size).floor() as i64).clamp(0, count - 1);
        let last = |v: f64| (((v / size).ceil() as i64) - 1).clamp(0, count - 1);
        let (x0, x1) = (first(origin.x), last(origin.x + f64::from(self.width)));
        let (y0, y1) = (first(origin.y), last(origin.y + f64::from(self.height)));

        let mut tiles = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                tiles.push(TileCoord::new(x as u32, y as u32, self.zoom));
            }
        }
        let center = self.projection.project(self.center, self.zoom);
        let distance = |tile: &TileCoord| {
            let origin = tile.origin(self.projection.tile_size);
            Point::new(origin.x + size / 2.0, origin.y + size / 2.0).distance(center)
        };
        tiles.sort_by(|a, b| distance(a).total_cmp(&distance(b)).then(a.cmp(b)));
        tiles
    }
}

/// All overlay layers of one map instance.
pub struct MeshMap {
    config: Config,
    markers: MarkerLayer,
    clients: ClientLayer,
    labels: LabelLayer,
}

impl MeshMap {
    /// Uses system fonts for label measurement.
    pub fn new(config: Config) -> Result<Self, MeshMapError> {
        Self::with_measurer(config, Box::new(FontMeasurer::new()))
    }

    pub fn with_measurer(
        config: Config,
        measurer: Box<dyn TextMeasure>,
    ) -> Result<Self, MeshMapError> {
        config.map.validate()?;
        Ok(Self {
            markers: MarkerLayer::new(&config),
            clients: ClientLayer::new(&config)?,
            labels: LabelLayer::new(&config, measurer)?,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn projection(&self) -> Projection {
        self.config.map.projection()
    }

    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    pub fn clients(&self) -> &ClientLayer {
        &self.clients
    }

    pub fn labels(&self) -> &LabelLayer {
        &self.labels
    }

    pub fn placement(&self) -> Option<&LabelPlacement> {
        self.labels.placement()
    }

    /// A view of this map; `zoom` must not exceed the configured maximum.
    pub fn view(
        &self,
        width: u32,
        height: u32,
        center: LatLng,
        zoom: u8,
    ) -> Result<MapView, MeshMapError> {
        if zoom > self.config.map.max_zoom {
            return Err(MeshMapError::Config(format!(
                "view zoom {zoom} exceeds maxZoom {}",
                self.config.map.max_zoom
            )));
        }
        Ok(MapView::new(self.projection(), width, height, center, zoom))
    }

    /// Layers from bottom to top.
    pub fn layers(&self) -> Vec<&dyn TileLayer> {
        let mut layers: Vec<&dyn TileLayer> = vec![&self.markers, &self.clients, &self.labels];
        layers.sort_by_key(|layer| layer.z_index());
        layers
    }

    /// Rebuilds every layer from `dataset`.
    pub fn set_data(&mut self, dataset: &Dataset) {
        self.markers.set_data(dataset);
        self.clients.set_data(dataset);
        self.labels.set_data(dataset);
    }

    /// All layers' drawing for one tile, bottom layer first.
    pub fn tile_canvas(&self, coord: TileCoord) -> TileCanvas {
        let mut canvas = TileCanvas::new(self.config.map.tile_size);
        for layer in self.layers() {
            canvas.append(layer.create_tile(coord));
        }
        canvas
    }

    /// Resolves a click at a container pixel and hands the result to
    /// `navigator`. Markers are tested first, then labels, then links.
    pub fn select_at(
        &self,
        view: &MapView,
        point: Point,
        navigator: &mut dyn Navigator,
    ) -> Option<Selection> {
        let world = view.container_to_world(point);
        let zoom = view.zoom();
        let selection = self
            .markers
            .node_at(world, zoom)
            .or_else(|| self.labels.hit_test(world, zoom))
            .or_else(|| self.markers.link_at(world, zoom))?;
        tracing::debug!(?selection, "map selection");
        navigator.navigate(&selection);
        Some(selection)
    }

    #[cfg(feature = "png")]
    pub fn render_tile(&self, rasterizer: &crate::raster::Rasterizer, coord: TileCoord) -> crate::raster::Tile {
        rasterizer.rasterize(&self.tile_canvas(coord))
    }

    /// Renders everything visible in `view` into one image.
    #[cfg(feature = "png")]
    pub fn render_view(
        &self,
        rasterizer: &crate::raster::Rasterizer,
        view: &MapView,
    ) -> Result<resvg::tiny_skia::Pixmap, MeshMapError> {
        let origin = view.pixel_origin();
        let tile_size = self.config.map.tile_size;
        let placements = view
            .visible_tiles()
            .into_iter()
            .map(|coord| {
                let tile_origin = coord.origin(tile_size);
                let x = (tile_origin.x - origin.x).round() as i32;
                let y = (tile_origin.y - origin.y).round() as i32;
                (self.render_tile(rasterizer, coord), x, y)
            })
            .collect();
        let (width, height) = view.size();
        crate::raster::stitch(width, height, placements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::DrawOp;
    use crate::model::{Location, Node, NodeSets};
    use crate::text_metrics::FixedAdvanceMeasurer;

    fn view() -> MapView {
        MapView::new(Projection::default(), 800, 600, LatLng::new(53.55, 9.99), 15)
    }

    #[test]
    fn empty_active_area_falls_back_to_container() {
        let mut view = view();
        view.set_active_area(
            ActiveArea {
                left: 300.0,
                top: 0.0,
                width: 0.0,
                height: 600.0,
            },
            false,
        );
        assert_eq!(view.viewport_bounds(), (Point::new(0.0, 0.0), Point::new(800.0, 600.0)));
        assert_eq!(view.offset(), Point::new(0.0, 0.0));
    }

    #[test]
    fn active_area_shifts_the_perceived_center() {
        let mut view = view();
        let before = view.center();
        view.set_active_area(
            ActiveArea {
                left: 200.0,
                top: 0.0,
                width: 600.0,
                height: 600.0,
            },
            true,
        );
        assert_eq!(view.offset(), Point::new(-100.0, 0.0));
        let after = view.center();
        assert!((after.lat - before.lat).abs() < 1e-9);
        assert!((after.lng - before.lng).abs() < 1e-9);
        // The container centre moved left so the viewport centre stays put.
        assert!(view.container_center().lng < before.lng);
        let bounds = view.bounds();
        let corner = view.container_to_lat_lng(Point::new(200.0, 0.0));
        assert!((bounds.west - corner.lng).abs() < 1e-9);
    }

    #[test]
    fn visible_tiles_cover_the_container() {
        let view = view();
        let tiles = view.visible_tiles();
        let origin = view.pixel_origin();
        for tile in &tiles {
            let o = tile.origin(256);
            assert!(o.x < origin.x + 800.0 && o.x + 256.0 > origin.x);
            assert!(o.y < origin.y + 600.0 && o.y + 256.0 > origin.y);
        }
        assert!(tiles.len() >= 12 && tiles.len() <= 20);
        let center = Projection::default().project(view.center(), 15);
        assert_eq!(tiles[0], TileCoord::new((center.x / 256.0) as u32, (center.y / 256.0) as u32, 15));
    }

    #[test]
    fn out_of_range_zooms_have_no_tiles() {
        let center = LatLng::new(0.0, 0.0);
        for zoom in [33, 40, 63, 64, 255] {
            let view = MapView::new(Projection::default(), 100, 100, center, zoom);
            assert!(view.visible_tiles().is_empty(), "zoom {zoom}");
        }
        let deepest = MapView::new(Projection::default(), 100, 100, center, 32);
        assert!(!deepest.visible_tiles().is_empty());
    }

    #[test]
    fn views_above_max_zoom_are_rejected() {
        let map = mesh_map();
        let center = LatLng::new(53.55, 9.99);
        assert!(map.view(800, 600, center, 20).is_ok());
        assert!(matches!(map.view(800, 600, center, 21), Err(MeshMapError::Config(_))));
        assert!(map.view(800, 600, center, 63).is_err());
    }

    #[test]
    fn fit_bounds_picks_a_zoom_that_fits() {
        let mut view = view();
        let bounds = GeoBounds {
            south: 53.5,
            west: 9.9,
            north: 53.6,
            east: 10.1,
        };
        view.fit_bounds(bounds, 0, 18);
        let shown = view.bounds();
        assert!(shown.west <= bounds.west && shown.east >= bounds.east);
        assert!(shown.south <= bounds.south && shown.north >= bounds.north);
        assert!((view.center().lat - 53.55).abs() < 0.01);
    }

    fn mesh_map() -> MeshMap {
        MeshMap::with_measurer(Config::default(), Box::new(FixedAdvanceMeasurer::new(0.5))).unwrap()
    }

    #[test]
    fn tiles_stack_markers_clients_labels() {
        let mut map = mesh_map();
        let mut node = Node::new("c04a00dd692a", "ffhh-one");
        node.location = Some(Location {
            latitude: 53.55,
            longitude: 9.99,
        });
        node.clients = 2;
        node.clients_wifi24 = 2;
        map.set_data(&Dataset {
            nodes: NodeSets {
                online: vec![node],
                ..NodeSets::default()
            },
            ..Dataset::default()
        });

        let zooms: Vec<i32> = map.layers().iter().map(|l| l.z_index()).collect();
        assert_eq!(zooms, vec![4, 5, 6]);

        let p = map.projection().project(LatLng::new(53.55, 9.99), 16);
        let canvas = map.tile_canvas(TileCoord::new((p.x / 256.0) as u32, (p.y / 256.0) as u32, 16));
        let kinds: Vec<&str> = canvas
            .ops()
            .iter()
            .map(|op| match op {
                DrawOp::Circle { stroke: None, radius, .. } if *radius == 3.0 => "dot",
                DrawOp::Circle { .. } => "marker",
                DrawOp::Polyline { .. } => "link",
                DrawOp::StrokeText { .. } => "halo",
                DrawOp::FillText { .. } => "text",
            })
            .collect();
        assert_eq!(kinds, vec!["marker", "dot", "dot", "halo", "text"]);
    }

    #[test]
    fn selection_goes_through_the_navigator() {
        let mut map = mesh_map();
        let mut node = Node::new("a", "a");
        node.location = Some(Location {
            latitude: 53.55,
            longitude: 9.99,
        });
        map.set_data(&Dataset {
            nodes: NodeSets {
                online: vec![node],
                ..NodeSets::default()
            },
            ..Dataset::default()
        });

        let view = view();
        let at = view.lat_lng_to_container(LatLng::new(53.55, 9.99));
        let mut seen = Vec::new();
        let mut navigator = |selection: &Selection| seen.push(selection.clone());
        let selection = map.select_at(&view, at, &mut navigator);
        assert_eq!(selection, Some(Selection::Node("a".to_string())));
        assert!(map.select_at(&view, at.offset(100.0, 100.0), &mut navigator).is_none());
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn clicking_a_label_selects_its_node() {
        let mut map = mesh_map();
        let mut node = Node::new("c04a00dd6901", "ffhh-label");
        node.location = Some(Location {
            latitude: 53.55,
            longitude: 9.99,
        });
        map.set_data(&Dataset {
            nodes: NodeSets {
                online: vec![node],
                ..NodeSets::default()
            },
            ..Dataset::default()
        });

        let view = view();
        let at = view.lat_lng_to_container(LatLng::new(53.55, 9.99));
        // The label starts 8px right of the node and is 55px wide.
        let mut navigator = |_: &Selection| {};
        let selection = map.select_at(&view, at.offset(30.0, 0.0), &mut navigator);
        assert_eq!(selection, Some(Selection::Node("c04a00dd6901".to_string())));
        assert!(map.select_at(&view, at.offset(30.0, 12.0), &mut navigator).is_none());
    }
}
