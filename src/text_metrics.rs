//! Label text measurement.
//!
//! Placement only needs advance widths. `FontMeasurer` resolves a CSS font
//! family list against the system fonts and sums glyph advances, while
//! `FixedAdvanceMeasurer` gives reproducible metrics for tests and for
//! hosts that measure text themselves.

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use std::collections::HashMap;
use ttf_parser::Face;

/// Advance used for characters the font has no glyph for, in ems.
const FALLBACK_ADVANCE_EM: f32 = 0.56;

pub trait TextMeasure {
    /// Width in pixels of `text` set in `font_size` px `font_family`.
    fn width(&mut self, text: &str, font_size: f32, font_family: &str) -> f32;
}

/// Every character advances by `advance_em * font_size`.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvanceMeasurer {
    pub advance_em: f32,
}

impl FixedAdvanceMeasurer {
    pub fn new(advance_em: f32) -> Self {
        Self { advance_em }
    }
}

impl Default for FixedAdvanceMeasurer {
    fn default() -> Self {
        Self::new(FALLBACK_ADVANCE_EM)
    }
}

impl TextMeasure for FixedAdvanceMeasurer {
    fn width(&mut self, text: &str, font_size: f32, _font_family: &str) -> f32 {
        text.chars().filter(|ch| *ch != '\n').count() as f32 * self.advance_em * font_size
    }
}

/// Measures with real font metrics. Faces are loaded lazily per family list
/// and cached for the lifetime of the measurer.
pub struct FontMeasurer {
    db: Database,
    loaded_system_fonts: bool,
    cache: HashMap<String, Option<FontFace>>,
}

impl FontMeasurer {
    pub fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            cache: HashMap::new(),
        }
    }

    /// Uses only the given font database instead of the system fonts.
    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            loaded_system_fonts: true,
            cache: HashMap::new(),
        }
    }

    fn face(&mut self, font_family: &str) -> Option<&mut FontFace> {
        let key = normalize_family_key(font_family);
        if !self.cache.contains_key(&key) {
            let face = self.load_face(&key);
            if face.is_none() {
                tracing::debug!(family = %key, "no font face found, using fallback advances");
            }
            self.cache.insert(key.clone(), face);
        }
        self.cache.get_mut(&key).and_then(|face| face.as_mut())
    }

    fn load_face(&mut self, font_family: &str) -> Option<FontFace> {
        #[derive(Clone, Copy)]
        enum FamilyToken {
            Generic(Family<'static>),
            Name(usize),
        }

        let mut names: Vec<String> = Vec::new();
        let mut order: Vec<FamilyToken> = Vec::new();
        for part in font_family.split(',') {
            let raw = part.trim().trim_matches('"').trim_matches('\'');
            if raw.is_empty() {
                continue;
            }
            match raw.to_ascii_lowercase().as_str() {
                "serif" => order.push(FamilyToken::Generic(Family::Serif)),
                "sans-serif" | "system-ui" | "-apple-system" => {
                    order.push(FamilyToken::Generic(Family::SansSerif))
                }
                "monospace" => order.push(FamilyToken::Generic(Family::Monospace)),
                _ => {
                    order.push(FamilyToken::Name(names.len()));
                    names.push(raw.to_string());
                }
            }
        }
        if order.is_empty() {
            order.push(FamilyToken::Generic(Family::SansSerif));
        }
        let families: Vec<Family<'_>> = order
            .iter()
            .map(|token| match *token {
                FamilyToken::Generic(family) => family,
                FamilyToken::Name(idx) => Family::Name(names[idx].as_str()),
            })
            .collect();

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let id = self.db.query(&Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        })?;
        self.db
            .with_face_data(id, |data, index| FontFace::parse(data.to_vec(), index))
            .flatten()
    }
}

impl Default for FontMeasurer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextMeasure for FontMeasurer {
    fn width(&mut self, text: &str, font_size: f32, font_family: &str) -> f32 {
        if text.is_empty() || font_size <= 0.0 {
            return 0.0;
        }
        match self.face(font_family) {
            Some(face) => face.measure_width(text, font_size),
            None => FixedAdvanceMeasurer::default().width(text, font_size, font_family),
        }
    }
}

struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    ascii_advances: [u16; 128],
    advance_cache: HashMap<char, Option<u16>>,
}

impl FontFace {
    fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let units_per_em = face.units_per_em().max(1);
        let mut ascii_advances = [0u16; 128];
        for byte in 0u8..=127 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii_advances[byte as usize] = face.glyph_hor_advance(glyph).unwrap_or(0);
            }
        }
        Some(Self {
            data,
            index,
            units_per_em,
            ascii_advances,
            advance_cache: HashMap::new(),
        })
    }

    fn measure_width(&mut self, text: &str, font_size: f32) -> f32 {
        let scale = font_size / f32::from(self.units_per_em);
        let fallback = font_size * FALLBACK_ADVANCE_EM;

        let mut width = 0.0f32;
        let mut face: Option<Face<'_>> = None;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let advance = if ch.is_ascii() {
                Some(self.ascii_advances[ch as usize]).filter(|advance| *advance > 0)
            } else if let Some(cached) = self.advance_cache.get(&ch) {
                *cached
            } else {
                if face.is_none() {
                    face = Face::parse(&self.data, self.index).ok();
                }
                let advance = face.as_ref().and_then(|face| {
                    face.glyph_index(ch)
                        .and_then(|glyph| face.glyph_hor_advance(glyph))
                });
                self.advance_cache.insert(ch, advance);
                advance
            };
            width += match advance {
                Some(advance) => f32::from(advance) * scale,
                None => fallback,
            };
        }
        width.max(0.0)
    }
}

fn normalize_family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_string()
    }
}
