use crate::canvas::TileCanvas;
use crate::error::MeshMapError;
use resvg::tiny_skia::{Pixmap, PixmapPaint, Transform};
use std::path::Path;

/// A rendered tile. `None` stands for a fully transparent tile, which is
/// what a layer returns when it has nothing to draw or drawing failed.
pub struct Tile {
    pub size: u32,
    pixmap: Option<Pixmap>,
}

impl Tile {
    pub fn blank(size: u32) -> Self {
        Self { size, pixmap: None }
    }

    pub fn is_blank(&self) -> bool {
        self.pixmap.is_none()
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    pub fn into_pixmap(self) -> Result<Pixmap, MeshMapError> {
        match self.pixmap {
            Some(pixmap) => Ok(pixmap),
            None => Pixmap::new(self.size, self.size)
                .ok_or_else(|| MeshMapError::Raster("failed to allocate pixmap".to_string())),
        }
    }

    pub fn encode_png(self) -> Result<Vec<u8>, MeshMapError> {
        self.into_pixmap()?
            .encode_png()
            .map_err(|err| MeshMapError::Raster(err.to_string()))
    }

    pub fn save_png(self, path: &Path) -> Result<(), MeshMapError> {
        let bytes = self.encode_png()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Turns recorded canvases into pixels through usvg/resvg. The font
/// database is loaded once per rasterizer.
pub struct Rasterizer {
    options: usvg::Options<'static>,
}

impl Rasterizer {
    pub fn new(font_family: &str) -> Self {
        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        options.font_family = font_family.to_string();
        Self { options }
    }

    /// Never fails: anything that goes wrong yields a blank tile.
    pub fn rasterize(&self, canvas: &TileCanvas) -> Tile {
        if canvas.is_blank() {
            return Tile::blank(canvas.size);
        }
        match self.try_rasterize(canvas) {
            Ok(pixmap) => Tile {
                size: canvas.size,
                pixmap: Some(pixmap),
            },
            Err(err) => {
                tracing::warn!(error = %err, "tile rendering failed, returning blank tile");
                Tile::blank(canvas.size)
            }
        }
    }

    fn try_rasterize(&self, canvas: &TileCanvas) -> Result<Pixmap, MeshMapError> {
        let tree = usvg::Tree::from_str(&canvas.to_svg(), &self.options)
            .map_err(|err| MeshMapError::Raster(err.to_string()))?;
        let mut pixmap = Pixmap::new(canvas.size, canvas.size)
            .ok_or_else(|| MeshMapError::Raster("failed to allocate pixmap".to_string()))?;
        resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());
        Ok(pixmap)
    }
}

/// Copies tiles into one image; `placements` holds each tile and the pixel
/// offset of its top-left corner.
pub fn stitch(
    width: u32,
    height: u32,
    placements: Vec<(Tile, i32, i32)>,
) -> Result<Pixmap, MeshMapError> {
    let mut target = Pixmap::new(width, height)
        .ok_or_else(|| MeshMapError::Raster("failed to allocate pixmap".to_string()))?;
    for (tile, x, y) in placements {
        if let Some(pixmap) = tile.pixmap() {
            target.draw_pixmap(
                x,
                y,
                pixmap.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;

    #[test]
    fn blank_canvas_gives_blank_tile() {
        let rasterizer = Rasterizer::new("sans-serif");
        let tile = rasterizer.rasterize(&TileCanvas::new(256));
        assert!(tile.is_blank());
        let png = tile.encode_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn circles_are_painted() {
        let rasterizer = Rasterizer::new("sans-serif");
        let mut canvas = TileCanvas::new(64);
        canvas.fill_circle(Point::new(32.0, 32.0), 10.0, "#ff0000");
        let tile = rasterizer.rasterize(&canvas);
        let pixmap = tile.pixmap().unwrap();
        let center = pixmap.pixel(32, 32).unwrap();
        assert_eq!(center.red(), 255);
        assert_eq!(center.alpha(), 255);
        let corner = pixmap.pixel(0, 0).unwrap();
        assert_eq!(corner.alpha(), 0);
    }

    #[test]
    fn stitch_offsets_tiles() {
        let rasterizer = Rasterizer::new("sans-serif");
        let mut canvas = TileCanvas::new(16);
        canvas.fill_circle(Point::new(8.0, 8.0), 8.0, "#00ff00");
        let tile = rasterizer.rasterize(&canvas);
        let image = stitch(32, 16, vec![(tile, 16, 0)]).unwrap();
        assert_eq!(image.pixel(24, 8).unwrap().alpha(), 255);
        assert_eq!(image.pixel(8, 8).unwrap().alpha(), 0);
    }
}
