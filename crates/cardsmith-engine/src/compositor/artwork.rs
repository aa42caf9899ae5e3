//! Vector layers of the fallback card, written as SVG and rasterized with
//! resvg.

use std::f32::consts::{FRAC_PI_2, PI};
use std::sync::{Arc, OnceLock};

use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{fontdb, Options, Tree};

use super::CompositeLayout;
use crate::error::PipelineError;

pub const BANNER_TEXT: &str = "Merry Christmas!";

const GOLD: &str = "#ffd700";
const BERRY_RED: &str = "#c41e3a";

// (cx, cy, r, opacity)
const SNOWFLAKES: [(u32, u32, u32, f32); 10] = [
    (100, 100, 4, 0.8),
    (200, 150, 3, 0.7),
    (1050, 120, 5, 0.9),
    (950, 180, 3, 0.6),
    (1100, 250, 4, 0.8),
    (150, 650, 5, 0.7),
    (1000, 680, 4, 0.8),
    (600, 80, 3, 0.7),
    (300, 700, 4, 0.6),
    (900, 600, 3, 0.7),
];

#[derive(Debug, Clone, Copy)]
enum Motif {
    Sparkle,
    Star,
    Tree,
}

/// A decorative glyph placed like a line of text: `(x, y)` is the baseline
/// start and `size` the font size.
#[derive(Debug, Clone, Copy)]
struct Glyph {
    motif: Motif,
    x: f32,
    y: f32,
    size: f32,
    opacity: f32,
}

const fn glyph(motif: Motif, x: f32, y: f32, size: f32, opacity: f32) -> Glyph {
    Glyph {
        motif,
        x,
        y,
        size,
        opacity,
    }
}

const DECORATIONS: [Glyph; 7] = [
    glyph(Motif::Sparkle, 120.0, 250.0, 50.0, 0.9),
    glyph(Motif::Sparkle, 1020.0, 350.0, 45.0, 0.8),
    glyph(Motif::Star, 550.0, 700.0, 40.0, 0.9),
    glyph(Motif::Star, 200.0, 500.0, 35.0, 0.7),
    glyph(Motif::Sparkle, 950.0, 550.0, 38.0, 0.8),
    glyph(Motif::Tree, 50.0, 750.0, 80.0, 1.0),
    glyph(Motif::Tree, 1070.0, 750.0, 80.0, 1.0),
];

// Drawn over the banner ends.
const HOLLY: [Glyph; 2] = [
    glyph(Motif::Tree, 220.0, 100.0, 50.0, 1.0),
    glyph(Motif::Tree, 930.0, 100.0, 50.0, 1.0),
];

impl Glyph {
    fn center(&self) -> (f32, f32) {
        (self.x + self.size / 2.0, self.y - self.size * 0.35)
    }

    fn to_svg(self) -> String {
        let (cx, cy) = self.center();
        let s = self.size;
        match self.motif {
            Motif::Sparkle => format!(
                concat!(
                    r#"<g opacity="{}"><path d="{}" fill="{}"/>"#,
                    r##"<path d="{}" fill="#ffffff"/></g>"##,
                ),
                self.opacity,
                star_path(cx, cy, s * 0.45, s * 0.1, 4),
                GOLD,
                star_path(cx + s * 0.3, cy - s * 0.3, s * 0.18, s * 0.05, 4),
            ),
            Motif::Star => format!(
                r#"<path d="{}" fill="{GOLD}" opacity="{}"/>"#,
                star_path(cx, cy, s * 0.45, s * 0.19, 5),
                self.opacity,
            ),
            Motif::Tree => {
                let mut tiers = String::new();
                let layers = [(-0.45, -0.1, 0.22), (-0.3, 0.1, 0.3), (-0.15, 0.3, 0.38)];
                for (apex, base, half) in layers {
                    tiers.push_str(&format!(
                        "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} Z ",
                        cx,
                        cy + s * apex,
                        cx + s * half,
                        cy + s * base,
                        cx - s * half,
                        cy + s * base,
                    ));
                }
                format!(
                    concat!(
                        r##"<g opacity="{}"><path d="{}" fill="#2e7d32"/>"##,
                        r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" "#,
                        r##"fill="#6b3e1f"/>"##,
                        r#"<path d="{}" fill="{}"/></g>"#,
                    ),
                    self.opacity,
                    tiers.trim_end(),
                    cx - s * 0.06,
                    cy + s * 0.3,
                    s * 0.12,
                    s * 0.15,
                    star_path(cx, cy - s * 0.45, s * 0.1, s * 0.04, 5),
                    GOLD,
                )
            }
        }
    }
}

fn star_path(cx: f32, cy: f32, outer: f32, inner: f32, points: u32) -> String {
    let mut d = String::new();
    for i in 0..points * 2 {
        let radius = if i % 2 == 0 { outer } else { inner };
        let angle = -FRAC_PI_2 + i as f32 * PI / points as f32;
        let command = if i == 0 { 'M' } else { 'L' };
        d.push_str(&format!(
            "{command}{:.1},{:.1} ",
            cx + radius * angle.cos(),
            cy + radius * angle.sin()
        ));
    }
    d.push('Z');
    d
}

/// Gradient card face with snow, sparkles, stars, trees and the title
/// banner.
pub fn background_svg(layout: &CompositeLayout) -> String {
    let (w, h) = (layout.canvas_width, layout.canvas_height);
    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
<defs>
<linearGradient id="festive" x1="0%" y1="0%" x2="100%" y2="100%">
<stop offset="0%" stop-color="#0a3d0a"/>
<stop offset="50%" stop-color="#165016"/>
<stop offset="100%" stop-color="#8b0000"/>
</linearGradient>
<radialGradient id="depth" cx="50%" cy="50%">
<stop offset="0%" stop-color="#ffffff" stop-opacity="0.1"/>
<stop offset="100%" stop-color="#000000" stop-opacity="0.3"/>
</radialGradient>
<filter id="shadow" x="-10%" y="-20%" width="120%" height="160%">
<feDropShadow dx="2" dy="2" stdDeviation="2" flood-color="#000000" flood-opacity="0.5"/>
</filter>
</defs>
<rect width="{w}" height="{h}" fill="url(#festive)"/>
<rect width="{w}" height="{h}" fill="url(#depth)"/>
"##
    );

    for (cx, cy, r, opacity) in SNOWFLAKES {
        svg.push_str(&format!(
            "<circle cx=\"{cx}\" cy=\"{cy}\" r=\"{r}\" fill=\"#ffffff\" opacity=\"{opacity}\"/>\n"
        ));
    }
    for glyph in DECORATIONS {
        svg.push_str(&glyph.to_svg());
        svg.push('\n');
    }

    let banner_x = (w.saturating_sub(700)) / 2;
    svg.push_str(&format!(
        concat!(
            r#"<rect x="{x}" y="40" width="700" height="100" rx="20" "#,
            r#"fill="{red}" opacity="0.95"/>"#,
            "\n",
            r#"<rect x="{x}" y="40" width="700" height="100" rx="20" "#,
            r#"fill="url(#depth)" opacity="0.3"/>"#,
            "\n",
            r#"<text x="{mid}" y="105" font-family="Arial, Helvetica, sans-serif" "#,
            r##"font-size="60" font-weight="bold" fill="#ffffff" text-anchor="middle" "##,
            r#"filter="url(#shadow)">{text}</text>"#,
            "\n",
        ),
        x = banner_x,
        red = BERRY_RED,
        mid = w / 2,
        text = BANNER_TEXT,
    ));
    for glyph in HOLLY {
        svg.push_str(&glyph.to_svg());
        svg.push('\n');
    }
    svg.push_str("</svg>\n");
    svg
}

/// Transparent square overlay: gold outer ring, green inner ring and a
/// three-berry cluster at each cardinal point.
pub fn wreath_svg(layout: &CompositeLayout) -> String {
    let s = layout.wreath_size();
    let c = s / 2;
    let mut svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" "#,
            r#"width="{s}" height="{s}" viewBox="0 0 {s} {s}">"#,
            "\n",
            r#"<circle cx="{c}" cy="{c}" r="{outer}" fill="none" "#,
            r##"stroke="#d4af37" stroke-width="12" opacity="0.9"/>"##,
            "\n",
            r#"<circle cx="{c}" cy="{c}" r="{inner}" fill="none" "#,
            r##"stroke="#228b22" stroke-width="8" opacity="0.8"/>"##,
            "\n",
        ),
        s = s,
        c = c,
        outer = c.saturating_sub(5),
        inner = c.saturating_sub(20),
    );

    let far = s.saturating_sub(15);
    let near = s.saturating_sub(20);
    let clusters = [
        [(c, 15, 6), (c + 10, 20, 5), (c.saturating_sub(10), 20, 5)],
        [(c, far, 6), (c + 10, near, 5), (c.saturating_sub(10), near, 5)],
        [(15, c, 6), (20, c + 10, 5), (20, c.saturating_sub(10), 5)],
        [(far, c, 6), (near, c + 10, 5), (near, c.saturating_sub(10), 5)],
    ];
    for (cx, cy, r) in clusters.into_iter().flatten() {
        svg.push_str(&format!(
            "<circle cx=\"{cx}\" cy=\"{cy}\" r=\"{r}\" fill=\"{BERRY_RED}\"/>\n"
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

fn system_fonts() -> &'static Arc<fontdb::Database> {
    static FONTS: OnceLock<Arc<fontdb::Database>> = OnceLock::new();
    FONTS.get_or_init(|| {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        Arc::new(db)
    })
}

/// Renders an SVG document onto a transparent `width` x `height` layer.
pub fn rasterize(
    svg: &str,
    width: u32,
    height: u32,
    stage: &'static str,
) -> Result<RgbaImage, PipelineError> {
    let mut options = Options::default();
    options.fontdb = Arc::clone(system_fonts());
    let tree = Tree::from_str(svg, &options).map_err(|err| PipelineError::composite(stage, err))?;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| PipelineError::composite(stage, format!("empty {width}x{height} canvas")))?;
    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

    let mut layer = RgbaImage::new(width, height);
    for (pixel, source) in layer.pixels_mut().zip(pixmap.pixels()) {
        let color = source.demultiply();
        *pixel = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    Ok(layer)
}
