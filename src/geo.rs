use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Latitude beyond which spherical Mercator is clamped.
const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Pixel coordinates, y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Shortest distance from `self` to the segment `a`-`b`.
    pub fn distance_to_segment(self, a: Point, b: Point) -> f64 {
        let l2 = (b.x - a.x).powi(2) + (b.y - a.y).powi(2);
        if l2 == 0.0 {
            return self.distance(a);
        }
        let t = ((self.x - a.x) * (b.x - a.x) + (self.y - a.y) * (b.y - a.y)) / l2;
        let t = t.clamp(0.0, 1.0);
        self.distance(Point::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)))
    }
}

/// Axis-aligned rectangle. Bounds are inclusive, so touching rectangles
/// intersect and a zero-area rectangle is a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    pub fn around(center: Point, radius: f64) -> Self {
        Self::new(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Like [`Rect::intersects`] but ignores contact along an edge.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }
}

/// Geographic bounding box as used for zoom independent index queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn contains(&self, pos: LatLng) -> bool {
        pos.lat >= self.south && pos.lat <= self.north && pos.lng >= self.west && pos.lng <= self.east
    }

    /// Rectangle in (lng, lat) space, the layout used by the geo indices.
    pub fn to_rect(self) -> Rect {
        Rect::new(self.west, self.south, self.east, self.north)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Parses `z/x/y`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('/');
        let z = parts.next()?.trim().parse().ok()?;
        let x = parts.next()?.trim().parse().ok()?;
        let y = parts.next()?.trim().parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { x, y, z })
    }

    /// Top-left corner of the tile in world pixels at its own zoom.
    pub fn origin(&self, tile_size: u32) -> Point {
        Point::new(
            f64::from(self.x) * f64::from(tile_size),
            f64::from(self.y) * f64::from(tile_size),
        )
    }
}

/// Inclusive range of integer zoom levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    pub fn contains(&self, zoom: u8) -> bool {
        zoom >= self.min && zoom <= self.max
    }

    pub fn len(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Zoom levels from `max` down to `min`.
    pub fn descending(&self) -> impl Iterator<Item = u8> {
        (self.min..=self.max).rev()
    }

    /// 0 at `min`, 1 at `max`. A single-level range counts as fully zoomed out.
    pub fn fraction(&self, zoom: u8) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        f64::from(zoom.saturating_sub(self.min)) / f64::from(self.max - self.min)
    }
}

/// Spherical Mercator projection into world pixels (EPSG:3857 with a
/// `tile_size` pixel square world at zoom 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub tile_size: u32,
}

impl Projection {
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }

    pub fn scale(&self, zoom: u8) -> f64 {
        f64::from(self.tile_size) * 2f64.powi(i32::from(zoom))
    }

    pub fn project(&self, pos: LatLng, zoom: u8) -> Point {
        let scale = self.scale(zoom);
        let lat = pos.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = pos.lng / 360.0 + 0.5;
        let y = 0.5 - (PI / 4.0 + lat / 2.0).tan().ln() / (2.0 * PI);
        Point::new(x * scale, y * scale)
    }

    pub fn unproject(&self, point: Point, zoom: u8) -> LatLng {
        let scale = self.scale(zoom);
        let lng = (point.x / scale - 0.5) * 360.0;
        let merc = (0.5 - point.y / scale) * 2.0 * PI;
        let lat = (2.0 * merc.exp().atan() - PI / 2.0).to_degrees();
        LatLng::new(lat, lng)
    }

    /// Geographic box covering the tile whose top-left world pixel is
    /// `origin`, grown by `margin` pixels on each side.
    pub fn tile_bbox(&self, origin: Point, zoom: u8, margin: f64) -> GeoBounds {
        let size = f64::from(self.tile_size);
        let top_left = self.unproject(origin.offset(-margin, -margin), zoom);
        let bottom_right = self.unproject(origin.offset(margin + size, margin + size), zoom);
        GeoBounds {
            south: bottom_right.lat,
            west: top_left.lng,
            north: top_left.lat,
            east: bottom_right.lng,
        }
    }

    /// Geographic box covering `radius` pixels around a world pixel.
    pub fn bounds_around(&self, center: Point, zoom: u8, radius: f64) -> GeoBounds {
        let top_left = self.unproject(center.offset(-radius, -radius), zoom);
        let bottom_right = self.unproject(center.offset(radius, radius), zoom);
        GeoBounds {
            south: bottom_right.lat,
            west: top_left.lng,
            north: top_left.lat,
            east: bottom_right.lng,
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new(256)
    }
}
