//! Text item type.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Font weight for text items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

/// Horizontal alignment of a text item relative to its placement point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// A text item. `position` is the top-left of the laid-out text after
/// alignment has been applied at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub content: String,
    pub position: Point,
    pub font_size: f64,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default)]
    pub align: TextAlign,
}

fn default_font_family() -> String {
    "sans-serif".to_string()
}

impl TextItem {
    pub fn new(content: impl Into<String>, position: Point, font_size: f64) -> Self {
        Self {
            content: content.into(),
            position,
            font_size,
            font_family: default_font_family(),
            font_weight: FontWeight::default(),
            align: TextAlign::default(),
        }
    }

    /// Estimated width of the widest line. Real metrics belong to the
    /// rendering surface; the estimate only drives hit testing and guides.
    pub fn estimated_width(&self) -> f64 {
        let max_chars = self
            .content
            .lines()
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0);
        max_chars as f64 * self.font_size * 0.6
    }

    /// Estimated height over all lines.
    pub fn estimated_height(&self) -> f64 {
        let lines = self.content.lines().count().max(1);
        lines as f64 * self.font_size * 1.2
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            self.position.x + self.estimated_width(),
            self.position.y + self.estimated_height(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_bounds_grow_with_content() {
        let short = TextItem::new("hi", Point::new(0.0, 0.0), 20.0);
        let long = TextItem::new("hello there", Point::new(0.0, 0.0), 20.0);
        assert!(long.bounds().width() > short.bounds().width());
    }

    #[test]
    fn test_multiline_height() {
        let text = TextItem::new("one\ntwo\nthree", Point::new(0.0, 0.0), 10.0);
        assert!((text.estimated_height() - 36.0).abs() < f64::EPSILON);
    }
}
