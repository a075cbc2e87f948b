//! Region descriptions to unified instruction records
//!
//! This library converts region-description datasets (pixel-space boxes with
//! captions) into a unified JSON Lines schema for multimodal instruction tuning,
//! and verifies that the coordinate normalization survives a round trip.

pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod types;
pub mod utils;
pub mod verify;

// Re-export commonly used types and functions
pub use config::{Args, PipelineConfig};
pub use error::EtlError;
pub use normalize::{denormalize, normalize, normalize_point, normalize_trajectory};
pub use pipeline::{run_pipeline, write_records};
pub use schema::build_record;
pub use source::ManifestSource;
pub use types::{
    ConversationTurn, Media, NormalizedBox, PipelineSummary, PixelBox, Region, SourceItem,
    SpatialAnnotation, Speaker, UnifiedRecord,
};
pub use verify::{check_round_trip, OverlayRenderer, Renderer, RoundTripReport};
