use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

// Label attached to every annotation produced from a region description
pub const REGION_LABEL: &str = "region_description";

// Tag identifying where the records came from
pub const DATA_SOURCE: &str = "visual_genome";

// Task tag written into every record
pub const TASK_TYPE: &str = "region_caption";

// A pixel-space box given as top-left corner plus extent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

// A raw region annotation: a box that may overflow the image, plus its caption
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub bbox: PixelBox,
    pub phrase: String,
}

/// One decoded dataset item as handed over by a source.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub id: String,
    pub image_path: String,
    pub image: RgbImage,
    pub regions: Vec<Region>,
}

impl SourceItem {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A box in normalized `[0, 1]` coordinates, ordered `(x_min, y_min, x_max, y_max)`.
///
/// Serialized as a plain four-element JSON array. The `Display` output is the
/// same text as the JSON serialization, so a box printed into a prompt can be
/// located again in the serialized record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 4]", from = "[f64; 4]")]
pub struct NormalizedBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl NormalizedBox {
    pub fn to_array(self) -> [f64; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}

impl From<NormalizedBox> for [f64; 4] {
    fn from(bbox: NormalizedBox) -> Self {
        bbox.to_array()
    }
}

impl From<[f64; 4]> for NormalizedBox {
    fn from([x_min, y_min, x_max, y_max]: [f64; 4]) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }
}

impl fmt::Display for NormalizedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(&self.to_array()).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialAnnotation {
    pub label: String,
    pub bbox_2d: NormalizedBox,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Gpt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub from: Speaker,
    pub value: String,
}

impl ConversationTurn {
    pub fn human(value: impl Into<String>) -> Self {
        Self {
            from: Speaker::Human,
            value: value.into(),
        }
    }

    pub fn gpt(value: impl Into<String>) -> Self {
        Self {
            from: Speaker::Gpt,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub image_size: [u32; 2],
    pub image_path: String,
}

// The unified instruction-tuning record; field order here is the on-disk field order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub id: String,
    pub data_source: String,
    pub task_type: String,
    pub media: Media,
    pub spatial_annotations: Vec<SpatialAnnotation>,
    pub conversations: Vec<ConversationTurn>,
}

// Struct to hold what a pipeline run produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub records_written: usize,
    pub source_exhausted: bool,
}
