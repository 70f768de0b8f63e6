//! Layout extraction: grounding markup → pixel and normalised boxes.
//!
//! The engine emits repeated blocks of the form
//! `<|ref|>LABEL<|/ref|><|det|>[[x1,y1,x2,y2], …]<|/det|>` with coordinates
//! on a virtual 0–999 grid. This module scans the raw output for those
//! blocks, scales each 4-tuple into the page's pixel space, and groups the
//! boxes under stable per-label ids.
//!
//! Extraction is lossy by contract: malformed coordinate lists, non-4-tuple
//! entries and non-numeric values are skipped per entry, and an unreadable
//! page image degrades to empty metadata with null dimensions. A page never
//! fails because its markup does.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

/// Virtual coordinate grid the engine emits boxes on.
const COORD_GRID: f64 = 999.0;

static REF_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<\|ref\|>(.*?)<\|/ref\|><\|det\|>(.*?)<\|/det\|>")
        .expect("grounding markup pattern is valid")
});

/// One region's bounding box in both coordinate systems.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutBox {
    /// Position of this box within its item's coordinate list.
    pub index: usize,
    /// `[x1, y1, x2, y2]` in pixels, clamped into the page and at least
    /// 1 px wide and tall.
    pub absolute: [u32; 4],
    /// Same rectangle normalised to 0–1, rounded to 6 decimal places.
    pub normalized: [f64; 4],
}

/// A labeled region: one `<|ref|>…<|det|>…` block that yielded boxes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutItem {
    /// Stable id: `label-<matchIndex>`. The match index counts every block
    /// in the raw text, so a skipped malformed block still consumes one.
    pub id: String,
    pub label: String,
    pub boxes: Vec<LayoutBox>,
}

/// Per-page layout. Dimensions are null when the page image was unreadable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub items: Vec<LayoutItem>,
}

impl LayoutMetadata {
    fn empty() -> Self {
        Self {
            width: None,
            height: None,
            items: Vec::new(),
        }
    }
}

/// Extract layout metadata from raw engine output and the page image.
pub fn extract(raw_text: &str, image_path: &Path) -> LayoutMetadata {
    if raw_text.is_empty() {
        return LayoutMetadata::empty();
    }

    let (width, height) = match image::image_dimensions(image_path) {
        Ok(dims) => dims,
        Err(e) => {
            warn!(
                "unable to read {} for layout extraction: {e}",
                image_path.display()
            );
            return LayoutMetadata::empty();
        }
    };

    let mut items = Vec::new();
    for (match_idx, captures) in REF_PATTERN.captures_iter(raw_text).enumerate() {
        let label = captures[1].to_string();
        let boxes = parse_boxes(&captures[2], width, height);
        if !boxes.is_empty() {
            items.push(LayoutItem {
                id: format!("{label}-{match_idx}"),
                label,
                boxes,
            });
        }
    }

    LayoutMetadata {
        width: Some(width),
        height: Some(height),
        items,
    }
}

/// Parse one block's coordinate list. Entries that are not 4-tuples of
/// numbers are skipped; a list that fails to parse at all yields no boxes.
fn parse_boxes(coords_literal: &str, width: u32, height: u32) -> Vec<LayoutBox> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(coords_literal.trim()) else {
        return Vec::new();
    };
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    let mut boxes = Vec::new();
    for (box_idx, entry) in entries.iter().enumerate() {
        let Some(tuple) = entry.as_array() else {
            continue;
        };
        if tuple.len() != 4 {
            continue;
        }
        let nums: Vec<f64> = tuple.iter().filter_map(|v| v.as_f64()).collect();
        if nums.len() != 4 {
            continue;
        }

        let x1 = scale(nums[0], width);
        let y1 = scale(nums[1], height);
        let x2 = scale(nums[2], width).max(x1 + 1);
        let y2 = scale(nums[3], height).max(y1 + 1);

        boxes.push(LayoutBox {
            index: box_idx,
            absolute: [x1, y1, x2, y2],
            normalized: [
                round6(ratio(x1, width)),
                round6(ratio(y1, height)),
                round6(ratio(x2, width)),
                round6(ratio(y2, height)),
            ],
        });
    }
    boxes
}

/// Clamp a grid coordinate to 0–999 and scale linearly into pixel space.
fn scale(coord: f64, dimension: u32) -> u32 {
    (coord.clamp(0.0, COORD_GRID) / COORD_GRID * f64::from(dimension)) as u32
}

fn ratio(value: u32, dimension: u32) -> f64 {
    if dimension == 0 {
        0.0
    } else {
        f64::from(value) / f64::from(dimension)
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
