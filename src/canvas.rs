//! Recorded tile drawing.
//!
//! Layers paint into a `TileCanvas`, which keeps the draw calls in order so
//! they can be inspected, composed with other layers, and serialised to SVG
//! for rasterisation.

use crate::geo::Point;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl TextAlign {
    fn svg_anchor(self) -> &'static str {
        match self {
            TextAlign::Left => "start",
            TextAlign::Center => "middle",
            TextAlign::Right => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextBaseline {
    Top,
    Middle,
    Ideographic,
}

impl TextBaseline {
    fn svg_baseline(self) -> &'static str {
        match self {
            TextBaseline::Top => "text-before-edge",
            TextBaseline::Middle => "central",
            TextBaseline::Ideographic => "ideographic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub color: String,
    pub width: f64,
    pub opacity: f64,
    pub miter_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub color: String,
    pub opacity: f64,
}

impl Fill {
    pub fn solid(color: &str) -> Self {
        Self {
            color: color.to_string(),
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub position: Point,
    pub font_size: f32,
    pub font_family: String,
    pub align: TextAlign,
    pub baseline: TextBaseline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Circle {
        center: Point,
        radius: f64,
        fill: Option<Fill>,
        stroke: Option<Stroke>,
    },
    Polyline {
        points: Vec<Point>,
        stroke: Stroke,
    },
    StrokeText {
        run: TextRun,
        stroke: Stroke,
    },
    FillText {
        run: TextRun,
        fill: Fill,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileCanvas {
    pub size: u32,
    ops: Vec<DrawOp>,
}

impl TileCanvas {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn is_blank(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn fill_circle(&mut self, center: Point, radius: f64, color: &str) {
        self.ops.push(DrawOp::Circle {
            center,
            radius,
            fill: Some(Fill::solid(color)),
            stroke: None,
        });
    }

    pub fn push(&mut self, op: DrawOp) {
        self.ops.push(op);
    }

    /// Draws `other` on top of this canvas.
    pub fn append(&mut self, other: TileCanvas) {
        self.ops.extend(other.ops);
    }

    pub fn to_svg(&self) -> String {
        let size = self.size;
        let mut svg = String::new();
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{size}\" height=\"{size}\" viewBox=\"0 0 {size} {size}\">"
        );
        for op in &self.ops {
            write_op(&mut svg, op);
        }
        svg.push_str("</svg>");
        svg
    }
}

fn write_op(svg: &mut String, op: &DrawOp) {
    match op {
        DrawOp::Circle {
            center,
            radius,
            fill,
            stroke,
        } => {
            let _ = write!(
                svg,
                "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\"{}{}/>",
                center.x,
                center.y,
                radius,
                fill_attrs(fill.as_ref()),
                stroke_attrs(stroke.as_ref())
            );
        }
        DrawOp::Polyline { points, stroke } => {
            if points.len() < 2 {
                return;
            }
            let coords: Vec<String> = points
                .iter()
                .map(|p| format!("{:.2},{:.2}", p.x, p.y))
                .collect();
            let _ = write!(
                svg,
                "<polyline points=\"{}\" fill=\"none\" stroke-linecap=\"round\" stroke-linejoin=\"round\"{}/>",
                coords.join(" "),
                stroke_attrs(Some(stroke))
            );
        }
        DrawOp::StrokeText { run, stroke } => {
            let _ = write!(
                svg,
                "{} fill=\"none\"{}>{}</text>",
                text_open(run),
                stroke_attrs(Some(stroke)),
                escape_xml(&run.text)
            );
        }
        DrawOp::FillText { run, fill } => {
            let _ = write!(
                svg,
                "{}{}>{}</text>",
                text_open(run),
                fill_attrs(Some(fill)),
                escape_xml(&run.text)
            );
        }
    }
}

fn text_open(run: &TextRun) -> String {
    format!(
        "<text x=\"{:.2}\" y=\"{:.2}\" font-family=\"{}\" font-size=\"{}\" text-anchor=\"{}\" dominant-baseline=\"{}\"",
        run.position.x,
        run.position.y,
        escape_xml(&run.font_family),
        run.font_size,
        run.align.svg_anchor(),
        run.baseline.svg_baseline()
    )
}

fn fill_attrs(fill: Option<&Fill>) -> String {
    match fill {
        Some(fill) if fill.opacity < 1.0 => format!(
            " fill=\"{}\" fill-opacity=\"{}\"",
            escape_xml(&fill.color),
            fill.opacity
        ),
        Some(fill) => format!(" fill=\"{}\"", escape_xml(&fill.color)),
        None => " fill=\"none\"".to_string(),
    }
}

fn stroke_attrs(stroke: Option<&Stroke>) -> String {
    let Some(stroke) = stroke else {
        return String::new();
    };
    let mut attrs = format!(
        " stroke=\"{}\" stroke-width=\"{}\"",
        escape_xml(&stroke.color),
        stroke.width
    );
    if stroke.opacity < 1.0 {
        let _ = write!(attrs, " stroke-opacity=\"{}\"", stroke.opacity);
    }
    if let Some(limit) = stroke.miter_limit {
        let _ = write!(attrs, " stroke-linejoin=\"miter\" stroke-miterlimit=\"{limit}\"");
    }
    attrs
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
