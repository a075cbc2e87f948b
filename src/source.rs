//! Streaming reader for region-description manifests
//!
//! A manifest is a JSON Lines file with one object per image:
//!
//! ```json
//! {"id": 1, "image_path": "1.jpg", "regions": [{"x": 10, "y": 10, "width": 100, "height": 50, "phrase": "a red car"}]}
//! ```
//!
//! Entries are parsed one at a time straight from the file stream, so the
//! memory footprint does not depend on the size of the manifest.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;
use log::debug;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::EtlError;
use crate::types::{PixelBox, Region, SourceItem};

// Image identifiers come as numbers in Visual Genome dumps and as strings elsewhere
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntryId {
    Number(u64),
    Text(String),
}

impl EntryId {
    fn into_string(self) -> String {
        match self {
            EntryId::Number(n) => n.to_string(),
            EntryId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ManifestRegion {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    phrase: String,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: EntryId,
    image_path: String,
    #[serde(default)]
    image_data: Option<String>,
    #[serde(default)]
    regions: Vec<ManifestRegion>,
}

/// Lazy, single-pass source of [`SourceItem`]s read from a manifest.
///
/// Once the manifest is exhausted, or an error has been yielded, the source
/// only returns `None`.
pub struct ManifestSource<R: Read> {
    entries: serde_json::StreamDeserializer<'static, serde_json::de::IoRead<R>, ManifestEntry>,
    images_root: PathBuf,
    done: bool,
}

impl ManifestSource<BufReader<File>> {
    /// Open a manifest file. Image paths resolve against `images_root`, or
    /// against the manifest's own directory when none is given.
    pub fn open(manifest: &Path, images_root: Option<&Path>) -> Result<Self, EtlError> {
        let file = File::open(manifest).map_err(|e| {
            EtlError::source_unavailable(format!("cannot open {}", manifest.display()), e)
        })?;
        let images_root = match images_root {
            Some(root) => root.to_path_buf(),
            None => manifest
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        Ok(Self::from_reader(BufReader::new(file), images_root))
    }
}

impl<R: Read> ManifestSource<R> {
    pub fn from_reader(reader: R, images_root: impl Into<PathBuf>) -> Self {
        Self {
            entries: serde_json::Deserializer::from_reader(reader).into_iter(),
            images_root: images_root.into(),
            done: false,
        }
    }

    fn load_item(&self, entry: ManifestEntry) -> Result<SourceItem, EtlError> {
        let id = entry.id.into_string();
        let image = load_image(&self.images_root, &entry.image_path, entry.image_data.as_deref())
            .map_err(|e| match e {
                EtlError::SourceUnavailable { context, source } => EtlError::SourceUnavailable {
                    context: format!("item {}: {}", id, context),
                    source,
                },
                other => other,
            })?;

        let regions = entry
            .regions
            .into_iter()
            .map(|r| Region {
                bbox: PixelBox::new(r.x, r.y, r.width, r.height),
                phrase: r.phrase,
            })
            .collect();

        Ok(SourceItem {
            id,
            image_path: entry.image_path,
            image,
            regions,
        })
    }
}

impl<R: Read> Iterator for ManifestSource<R> {
    type Item = Result<SourceItem, EtlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.entries.next() {
            None => {
                self.done = true;
                return None;
            }
            Some(Err(e)) => Err(EtlError::source_unavailable("malformed manifest entry", e)),
            Some(Ok(entry)) => self.load_item(entry),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

/// Decode the image of an entry, preferring the file on disk and falling back
/// to base64 data embedded in the manifest.
fn load_image(
    images_root: &Path,
    image_path: &str,
    image_data: Option<&str>,
) -> Result<RgbImage, EtlError> {
    let path = images_root.join(image_path);
    if path.is_file() {
        let image = image::open(&path).map_err(|e| {
            EtlError::source_unavailable(format!("cannot decode {}", path.display()), e)
        })?;
        return Ok(image.to_rgb8());
    }

    match image_data.filter(|data| !data.is_empty()) {
        Some(data) => {
            debug!("Image {} not on disk, decoding embedded data", path.display());
            let bytes = STANDARD
                .decode(data)
                .map_err(|e| EtlError::source_unavailable("invalid base64 image data", e))?;
            let image = image::load_from_memory(&bytes)
                .map_err(|e| EtlError::source_unavailable("cannot decode embedded image", e))?;
            Ok(image.to_rgb8())
        }
        None => Err(EtlError::source_unavailable(
            format!("image {} not found", path.display()),
            "no embedded image data",
        )),
    }
}
