//! Template styling: fonts and colors per [`Template`].
//!
//! Styles only affect rendering. The builder never looks at them.

use crate::types::Template;
use serde::{Deserialize, Serialize};

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Upper-case hex form without `#`, as Office XML expects.
    pub fn hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    /// Linear blend towards `other`; `t` is clamped to `0.0..=1.0`.
    pub fn mix(&self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let channel = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgb(
            channel(self.0, other.0),
            channel(self.1, other.1),
            channel(self.2, other.2),
        )
    }

    pub fn to_array(&self) -> [u8; 3] {
        [self.0, self.1, self.2]
    }
}

/// Fonts and colors for one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStyle {
    pub font_family: String,
    /// Title size in points.
    pub title_size: u32,
    /// Body size in points.
    pub body_size: u32,
    pub title_color: Rgb,
    pub body_color: Rgb,
    pub background: Rgb,
    pub accent: Rgb,
}

impl TemplateStyle {
    /// Style for a template.
    pub fn for_template(template: Template) -> Self {
        match template {
            Template::Minimal => Self {
                font_family: "Arial".into(),
                title_size: 24,
                body_size: 18,
                title_color: Rgb(0, 0, 0),
                body_color: Rgb(64, 64, 64),
                background: Rgb(255, 255, 255),
                accent: Rgb(0, 120, 215),
            },
            Template::Corporate => Self {
                font_family: "Calibri".into(),
                title_size: 28,
                body_size: 20,
                title_color: Rgb(0, 51, 102),
                body_color: Rgb(51, 51, 51),
                background: Rgb(248, 248, 248),
                accent: Rgb(0, 176, 80),
            },
            Template::Bold => Self {
                font_family: "Arial Black".into(),
                title_size: 32,
                body_size: 22,
                title_color: Rgb(192, 0, 0),
                body_color: Rgb(0, 0, 0),
                background: Rgb(255, 255, 240),
                accent: Rgb(255, 165, 0),
            },
        }
    }

    /// Series colors for charts, starting with the accent.
    pub fn palette(&self, count: usize) -> Vec<Rgb> {
        let anchors = [self.accent, self.title_color, self.body_color];
        (0..count)
            .map(|idx| {
                let base = anchors[idx % anchors.len()];
                let round = (idx / anchors.len()) as f32;
                base.mix(self.background, (round * 0.3).min(0.75))
            })
            .collect()
    }
}

impl Template {
    pub fn style(&self) -> TemplateStyle {
        TemplateStyle::for_template(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(Rgb(0, 120, 215).hex(), "0078D7");
        assert_eq!(Rgb(255, 255, 255).hex(), "FFFFFF");
    }

    #[test]
    fn test_template_styles_differ() {
        let minimal = Template::Minimal.style();
        let corporate = Template::Corporate.style();
        let bold = Template::Bold.style();
        assert_eq!(minimal.font_family, "Arial");
        assert_eq!(corporate.title_size, 28);
        assert_eq!(bold.accent, Rgb(255, 165, 0));
        assert_ne!(minimal.accent, corporate.accent);
    }

    #[test]
    fn test_palette_starts_with_accent() {
        let style = Template::Corporate.style();
        let palette = style.palette(5);
        assert_eq!(palette.len(), 5);
        assert_eq!(palette[0], style.accent);
        assert_ne!(palette[3], palette[0]);
    }

    #[test]
    fn test_mix_endpoints() {
        assert_eq!(Rgb(0, 0, 0).mix(Rgb(200, 100, 50), 0.0), Rgb(0, 0, 0));
        assert_eq!(Rgb(0, 0, 0).mix(Rgb(200, 100, 50), 1.0), Rgb(200, 100, 50));
    }
}
