use log::debug;

use crate::error::EtlError;
use crate::normalize::normalize;
use crate::types::{
    ConversationTurn, Media, NormalizedBox, SourceItem, Speaker, SpatialAnnotation,
    UnifiedRecord, DATA_SOURCE, REGION_LABEL, TASK_TYPE,
};

/// Record id for a source identifier
pub fn record_id(identifier: &str) -> String {
    format!("{}_{}", DATA_SOURCE, identifier)
}

/// The human prompt asking about one region
pub fn region_prompt(bbox: &NormalizedBox) -> String {
    format!("Describe the region at <box>{}</box>.", bbox)
}

/// Build the unified record for one source item.
///
/// Only the first `max_regions` regions are kept, in source order. Each kept
/// region yields one spatial annotation and one human/gpt turn pair; the gpt
/// turn carries the phrase exactly as the source gave it. An item without
/// regions still produces a record, with empty annotations and conversations.
pub fn build_record(item: &SourceItem, max_regions: usize) -> Result<UnifiedRecord, EtlError> {
    let (width, height) = (item.width(), item.height());
    let regions = &item.regions[..item.regions.len().min(max_regions)];

    let mut spatial_annotations = Vec::with_capacity(regions.len());
    let mut conversations = Vec::with_capacity(regions.len() * 2);

    for region in regions {
        let bbox_2d = normalize(region.bbox, width as f64, height as f64)?;

        conversations.push(ConversationTurn::human(region_prompt(&bbox_2d)));
        conversations.push(ConversationTurn::gpt(region.phrase.as_str()));
        spatial_annotations.push(SpatialAnnotation {
            label: REGION_LABEL.to_string(),
            bbox_2d,
            text: region.phrase.clone(),
        });
    }

    if regions.len() < item.regions.len() {
        debug!(
            "Item {}: kept {} of {} regions",
            item.id,
            regions.len(),
            item.regions.len()
        );
    }

    Ok(UnifiedRecord {
        id: record_id(&item.id),
        data_source: DATA_SOURCE.to_string(),
        task_type: TASK_TYPE.to_string(),
        media: Media {
            image_size: [width, height],
            image_path: item.image_path.clone(),
        },
        spatial_annotations,
        conversations,
    })
}

/// Check the pairing invariant of a record: two turns per annotation, and each
/// annotation's box text quoted in the human turn that asks about it.
pub fn is_well_formed(record: &UnifiedRecord) -> bool {
    record.conversations.len() == 2 * record.spatial_annotations.len()
        && record
            .spatial_annotations
            .iter()
            .zip(record.conversations.chunks(2))
            .all(|(annotation, pair)| {
                pair[0].from == Speaker::Human
                    && pair[1].from == Speaker::Gpt
                    && pair[0].value.contains(&annotation.bbox_2d.to_string())
                    && pair[1].value == annotation.text
            })
}
