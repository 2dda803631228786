use crate::error::MeshMapError;
use crate::geo::{Projection, ZoomRange};
use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub tile_size: u32,
    /// Lowest zoom at which labels are drawn.
    pub label_zoom: u8,
    /// Lowest zoom at which client clouds are drawn.
    pub client_zoom: u8,
    /// Highest zoom of every overlay, normally the base layer's max zoom.
    pub max_zoom: u8,
    /// Icon footprint radius reserved around each node for labels.
    pub node_radius: f64,
    /// Base tile query padding for labels; the widest label is added on top.
    pub label_margin: f64,
    /// Tile query padding for client clouds.
    pub client_margin: f64,
    pub client_start_distance: f64,
    /// Days after which a lost node is no longer drawn.
    pub max_age: f64,
    /// Days during which a lost node is drawn with the alert style.
    pub max_age_alert: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            label_zoom: 13,
            client_zoom: 15,
            max_zoom: 20,
            node_radius: 4.0,
            label_margin: 16.0,
            client_margin: 50.0,
            client_start_distance: 10.0,
            max_age: 14.0,
            max_age_alert: 3.0,
        }
    }
}

impl MapConfig {
    pub fn projection(&self) -> Projection {
        Projection::new(self.tile_size)
    }

    pub fn label_zooms(&self) -> Result<ZoomRange, MeshMapError> {
        zoom_range("labelZoom", self.label_zoom, self.max_zoom)
    }

    pub fn client_zooms(&self) -> Result<ZoomRange, MeshMapError> {
        zoom_range("clientZoom", self.client_zoom, self.max_zoom)
    }

    /// Markers are visible at every zoom up to the maximum.
    pub fn marker_zooms(&self) -> ZoomRange {
        ZoomRange {
            min: 0,
            max: self.max_zoom,
        }
    }

    pub fn validate(&self) -> Result<(), MeshMapError> {
        if self.tile_size == 0 {
            return Err(MeshMapError::Config("tileSize must be positive".to_string()));
        }
        if self.max_zoom > 30 {
            return Err(MeshMapError::Config(format!(
                "maxZoom {} exceeds 30",
                self.max_zoom
            )));
        }
        self.label_zooms()?;
        self.client_zooms()?;
        Ok(())
    }
}

fn zoom_range(name: &str, min: u8, max: u8) -> Result<ZoomRange, MeshMapError> {
    ZoomRange::new(min, max)
        .ok_or_else(|| MeshMapError::Config(format!("{name} {min} is above maxZoom {max}")))
}

/// Fully resolved circle marker style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconStyle {
    pub color: String,
    pub fill_color: String,
    pub radius: f64,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
    pub stroke: bool,
}

impl IconStyle {
    fn base() -> Self {
        Self {
            color: "#3388ff".to_string(),
            fill_color: "#3388ff".to_string(),
            radius: 6.0,
            weight: 2.0,
            opacity: 0.6,
            fill_opacity: 0.6,
            stroke: true,
        }
    }

    fn apply(&mut self, patch: &IconStylePatch) {
        if let Some(v) = &patch.color {
            self.color = v.clone();
        }
        if let Some(v) = &patch.fill_color {
            self.fill_color = v.clone();
        }
        if let Some(v) = patch.radius {
            self.radius = v;
        }
        if let Some(v) = patch.weight {
            self.weight = v;
        }
        if let Some(v) = patch.opacity {
            self.opacity = v;
        }
        if let Some(v) = patch.fill_opacity {
            self.fill_opacity = v;
        }
        if let Some(v) = patch.stroke {
            self.stroke = v;
        }
    }

    fn patched(&self, patch: &IconStylePatch) -> Self {
        let mut style = self.clone();
        style.apply(patch);
        style
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IconStylePatch {
    color: Option<String>,
    fill_color: Option<String>,
    radius: Option<f64>,
    weight: Option<f64>,
    opacity: Option<f64>,
    fill_opacity: Option<f64>,
    stroke: Option<bool>,
}

impl IconStylePatch {
    fn colored(color: &str, fill: &str, radius: f64) -> Self {
        Self {
            color: Some(color.to_string()),
            fill_color: Some(fill.to_string()),
            radius: Some(radius),
            ..Default::default()
        }
    }

    fn uplink() -> Self {
        Self {
            stroke: Some(true),
            radius: Some(4.0),
            weight: Some(10.0),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconConfig {
    pub online: IconStyle,
    pub online_uplink: IconStyle,
    pub offline: IconStyle,
    pub lost: IconStyle,
    pub alert: IconStyle,
    pub new: IconStyle,
    pub new_uplink: IconStyle,
}

impl Default for IconConfig {
    fn default() -> Self {
        let base = IconStyle::base();
        let online = base.patched(&IconStylePatch {
            stroke: Some(false),
            ..IconStylePatch::colored("#1566A9", "#1566A9", 8.0)
        });
        let online_uplink = online.patched(&IconStylePatch {
            fill_color: Some("#cde".to_string()),
            ..IconStylePatch::uplink()
        });
        let new = base.patched(&IconStylePatch {
            color: Some("#1566A9".to_string()),
            fill_color: Some("#93E929".to_string()),
            ..Default::default()
        });
        let new_uplink = new.patched(&IconStylePatch::uplink());
        Self {
            online,
            online_uplink,
            offline: base.patched(&IconStylePatch::colored("#D43E2A", "#D43E2A", 3.0)),
            lost: base.patched(&IconStylePatch::colored("#D43E2A", "#D43E2A", 4.0)),
            alert: base.patched(&IconStylePatch::colored("#D43E2A", "#D43E2A", 5.0)),
            new,
            new_uplink,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub theme: Theme,
    pub map: MapConfig,
    pub icons: IconConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    font_family: Option<String>,
    background: Option<String>,
    text_color: Option<String>,
    tile_size: Option<u32>,
    label_zoom: Option<u8>,
    client_zoom: Option<u8>,
    max_zoom: Option<u8>,
    node_radius: Option<f64>,
    max_age: Option<f64>,
    max_age_alert: Option<f64>,
    client: Option<ClientColorsFile>,
    map: Option<MapColorsFile>,
    icon: Option<IconFile>,
}

#[derive(Debug, Deserialize)]
struct ClientColorsFile {
    wifi24: Option<String>,
    wifi5: Option<String>,
    other: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapColorsFile {
    label_new_color: Option<String>,
    tq_from: Option<String>,
    tq_to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IconFile {
    online: Option<IconStylePatch>,
    #[serde(rename = "online.uplink")]
    online_uplink: Option<IconStylePatch>,
    offline: Option<IconStylePatch>,
    lost: Option<IconStylePatch>,
    alert: Option<IconStylePatch>,
    new: Option<IconStylePatch>,
    #[serde(rename = "new.uplink")]
    new_uplink: Option<IconStylePatch>,
}

pub fn load_config(path: Option<&Path>) -> Result<Config, MeshMapError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let contents = std::fs::read_to_string(path)?;
    let is_json5 = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json5"))
        .unwrap_or(false);
    if is_json5 {
        parse_config_json5(&contents)
    } else {
        parse_config(&contents)
    }
}

pub fn parse_config(contents: &str) -> Result<Config, MeshMapError> {
    let parsed: ConfigFile = serde_json::from_str(contents)?;
    apply_config_file(parsed)
}

pub fn parse_config_json5(contents: &str) -> Result<Config, MeshMapError> {
    let parsed: ConfigFile = json5::from_str(contents)?;
    apply_config_file(parsed)
}

fn apply_config_file(parsed: ConfigFile) -> Result<Config, MeshMapError> {
    let mut config = Config::default();

    if let Some(theme_name) = parsed.theme.as_deref() {
        match theme_name {
            "dark" => config.theme = Theme::dark(),
            "light" | "default" => config.theme = Theme::light(),
            other => {
                return Err(MeshMapError::Config(format!("unknown theme '{other}'")));
            }
        }
    }
    if let Some(v) = parsed.font_family {
        config.theme.font_family = v;
    }
    if let Some(v) = parsed.background {
        config.theme.background = v;
    }
    if let Some(v) = parsed.text_color {
        config.theme.text_color = v;
    }
    if let Some(client) = parsed.client {
        if let Some(v) = client.wifi24 {
            config.theme.client_wifi24 = v;
        }
        if let Some(v) = client.wifi5 {
            config.theme.client_wifi5 = v;
        }
        if let Some(v) = client.other {
            config.theme.client_other = v;
        }
    }
    if let Some(map) = parsed.map {
        if let Some(v) = map.label_new_color {
            config.theme.label_new_color = v;
        }
        if let Some(v) = map.tq_from {
            config.theme.tq_from = v;
        }
        if let Some(v) = map.tq_to {
            config.theme.tq_to = v;
        }
    }

    if let Some(v) = parsed.tile_size {
        config.map.tile_size = v;
    }
    if let Some(v) = parsed.label_zoom {
        config.map.label_zoom = v;
    }
    if let Some(v) = parsed.client_zoom {
        config.map.client_zoom = v;
    }
    if let Some(v) = parsed.max_zoom {
        config.map.max_zoom = v;
    }
    if let Some(v) = parsed.node_radius {
        config.map.node_radius = v;
    }
    if let Some(v) = parsed.max_age {
        config.map.max_age = v;
    }
    if let Some(v) = parsed.max_age_alert {
        config.map.max_age_alert = v;
    }

    if let Some(icon) = parsed.icon {
        let icons = &mut config.icons;
        let pairs = [
            (&mut icons.online, icon.online),
            (&mut icons.online_uplink, icon.online_uplink),
            (&mut icons.offline, icon.offline),
            (&mut icons.lost, icon.lost),
            (&mut icons.alert, icon.alert),
            (&mut icons.new, icon.new),
            (&mut icons.new_uplink, icon.new_uplink),
        ];
        for (style, patch) in pairs {
            if let Some(patch) = patch {
                style.apply(&patch);
            }
        }
    }

    config.map.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.map.label_zoom, 13);
        assert_eq!(config.map.client_zoom, 15);
        assert_eq!(config.icons.online.radius, 8.0);
        assert!(!config.icons.online.stroke);
        assert_eq!(config.icons.online_uplink.fill_color, "#cde");
        assert_eq!(config.icons.online_uplink.color, "#1566A9");
        assert_eq!(config.icons.new.radius, 6.0);
        assert_eq!(config.icons.new_uplink.weight, 10.0);
        assert!(config.map.validate().is_ok());
    }

    #[test]
    fn overlays_partial_config() {
        let config = parse_config(
            r##"{
                "theme": "dark",
                "labelZoom": 10,
                "maxZoom": 18,
                "client": {"wifi5": "#00f"},
                "map": {"labelNewColor": "#0f0"},
                "icon": {"offline": {"radius": 2}}
            }"##,
        )
        .unwrap();
        assert_eq!(config.map.label_zoom, 10);
        assert_eq!(config.map.max_zoom, 18);
        assert_eq!(config.theme.client_wifi5, "#00f");
        assert_eq!(config.theme.label_new_color, "#0f0");
        assert_eq!(config.theme.background, "rgb(34, 34, 34)");
        assert_eq!(config.icons.offline.radius, 2.0);
        assert_eq!(config.icons.offline.color, "#D43E2A");
    }

    #[test]
    fn accepts_json5() {
        let config = parse_config_json5("{ clientZoom: 16, // comment\n }").unwrap();
        assert_eq!(config.map.client_zoom, 16);
    }

    #[test]
    fn rejects_inverted_zoom_range() {
        assert!(parse_config(r#"{"labelZoom": 19, "maxZoom": 18}"#).is_err());
        assert!(parse_config(r#"{"tileSize": 0}"#).is_err());
        assert!(parse_config(r#"{"theme": "neon"}"#).is_err());
    }
}
