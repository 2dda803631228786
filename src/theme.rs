use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RGB_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*rgb\(([^)]*)\)\s*$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    /// Page background, also the source of the label halo colour.
    pub background: String,
    /// Page text colour, used for online node labels.
    pub text_color: String,
    pub label_new_color: String,
    pub client_wifi24: String,
    pub client_wifi5: String,
    pub client_other: String,
    pub tq_from: String,
    pub tq_to: String,
}

impl Theme {
    pub fn light() -> Self {
        Self {
            font_family: "sans-serif".to_string(),
            background: "rgb(255, 255, 255)".to_string(),
            text_color: "rgb(0, 0, 0)".to_string(),
            label_new_color: "#459c18".to_string(),
            client_wifi24: "rgba(220, 0, 103, 0.7)".to_string(),
            client_wifi5: "rgba(10, 156, 146, 0.7)".to_string(),
            client_other: "rgba(227, 166, 25, 0.7)".to_string(),
            tq_from: "#F02311".to_string(),
            tq_to: "#04C714".to_string(),
        }
    }

    pub fn dark() -> Self {
        Self {
            background: "rgb(34, 34, 34)".to_string(),
            text_color: "rgb(255, 255, 255)".to_string(),
            ..Self::light()
        }
    }

    /// Translucent background used to stroke label halos. An `rgb(...)`
    /// background gains an alpha of 0.7, anything else is used as is.
    pub fn label_halo(&self) -> String {
        match RGB_FUNCTION.captures(&self.background) {
            Some(caps) => format!("rgba({},0.7)", &caps[1]),
            None => self.background.clone(),
        }
    }

    /// Link colour for a link quality in `[0, 1]`.
    pub fn link_color(&self, tq: f64) -> String {
        match (parse_color(&self.tq_from), parse_color(&self.tq_to)) {
            (Some(from), Some(to)) => from.interpolate(to, tq).to_css(),
            _ => self.tq_to.clone(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::light()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn interpolate(self, to: Rgb, t: f64) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let mix = |a: u8, b: u8| -> u8 {
            (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8
        };
        Rgb {
            r: mix(self.r, to.r),
            g: mix(self.g, to.g),
            b: mix(self.b, to.b),
        }
    }

    pub fn to_css(self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Parses `#rgb`, `#rrggbb` and `rgb(r, g, b)`.
pub fn parse_color(text: &str) -> Option<Rgb> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        let expand = |digit: &str| u8::from_str_radix(digit, 16).ok().map(|v| v * 17);
        return match hex.len() {
            3 => Some(Rgb {
                r: expand(&hex[0..1])?,
                g: expand(&hex[1..2])?,
                b: expand(&hex[2..3])?,
            }),
            6 => Some(Rgb {
                r: u8::from_str_radix(&hex[0..2], 16).ok()?,
                g: u8::from_str_radix(&hex[2..4], 16).ok()?,
                b: u8::from_str_radix(&hex[4..6], 16).ok()?,
            }),
            _ => None,
        };
    }
    let caps = RGB_FUNCTION.captures(text)?;
    let mut parts = caps[1].split(',').map(|part| part.trim().parse::<u8>().ok());
    let rgb = Rgb {
        r: parts.next()??,
        g: parts.next()??,
        b: parts.next()??,
    };
    parts.next().is_none().then_some(rgb)
}
