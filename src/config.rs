use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_OUTPUT: &str = "unified_region_data.jsonl";

pub const DEFAULT_VERIFY_IMAGE: &str = "verify_region_description.png";

/// Command-line arguments for converting region descriptions to unified instruction records.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// JSON Lines manifest of region descriptions, one image per line
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Directory image paths are resolved against (defaults to the manifest's directory)
    #[arg(long = "images_root")]
    pub images_root: Option<PathBuf>,

    /// Output JSONL file
    #[arg(short = 'o', long = "output", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Maximum number of items to read from the manifest
    #[arg(short = 'n', long = "num_samples", default_value_t = 100, value_parser = validate_count)]
    pub num_samples: usize,

    /// Maximum number of regions kept per image
    #[arg(long = "max_regions", default_value_t = 10, value_parser = validate_count)]
    pub max_regions: usize,

    /// Where to write the verification overlay of the first item
    #[arg(long = "verify_image", default_value = DEFAULT_VERIFY_IMAGE)]
    pub verify_image: PathBuf,

    /// TrueType font for captions in the verification image (system font if omitted)
    #[arg(long = "font")]
    pub font: Option<PathBuf>,
}

/// Settings the pipeline runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub num_samples: usize,
    pub max_regions: usize,
    pub output_path: PathBuf,
}

impl From<&Args> for PipelineConfig {
    fn from(args: &Args) -> Self {
        Self {
            num_samples: args.num_samples,
            max_regions: args.max_regions,
            output_path: args.output.clone(),
        }
    }
}

// Validate that a count is a positive integer
pub fn validate_count(s: &str) -> Result<usize, String> {
    match usize::from_str(s) {
        Ok(val) if val > 0 => Ok(val),
        _ => Err("value must be a positive integer".to_string()),
    }
}
