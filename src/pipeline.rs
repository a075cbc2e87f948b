use indicatif::ProgressBar;
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::config::PipelineConfig;
use crate::error::EtlError;
use crate::schema::build_record;
use crate::types::{PipelineSummary, SourceItem, UnifiedRecord};
use crate::utils::{create_progress_bar, ensure_parent_dir};
use crate::verify::{check_round_trip, Renderer};

/// Convert at most `config.num_samples` items pulled from `source` and write
/// the resulting records to `config.output_path` as JSON Lines.
///
/// Items are pulled one at a time; nothing past the bound is requested from
/// the source. The first item is also checked for a lossless round trip and
/// handed to `renderer`. Rendering problems are logged and skipped; any other
/// error ends the run before the output file is written.
pub fn run_pipeline<I, R>(
    source: I,
    config: &PipelineConfig,
    renderer: &R,
) -> Result<PipelineSummary, EtlError>
where
    I: IntoIterator<Item = Result<SourceItem, EtlError>>,
    R: Renderer + ?Sized,
{
    let pb = create_progress_bar(config.num_samples as u64, "Items");
    let records = match collect_records(source, config, renderer, &pb) {
        Ok(records) => {
            pb.finish_with_message("Conversion complete");
            records
        }
        Err(e) => {
            pb.abandon_with_message("Conversion failed");
            return Err(e);
        }
    };

    let source_exhausted = records.len() < config.num_samples;
    if source_exhausted {
        warn!(
            "Source ran out after {} of {} requested items",
            records.len(),
            config.num_samples
        );
    }

    ensure_parent_dir(&config.output_path)?;
    let mut writer = BufWriter::new(File::create(&config.output_path)?);
    write_records(&mut writer, &records)?;
    writer.flush()?;

    info!(
        "Wrote {} records to {}",
        records.len(),
        config.output_path.display()
    );

    Ok(PipelineSummary {
        records_written: records.len(),
        source_exhausted,
    })
}

fn collect_records<I, R>(
    source: I,
    config: &PipelineConfig,
    renderer: &R,
    pb: &ProgressBar,
) -> Result<Vec<UnifiedRecord>, EtlError>
where
    I: IntoIterator<Item = Result<SourceItem, EtlError>>,
    R: Renderer + ?Sized,
{
    let mut records = Vec::new();

    for item in source.into_iter().take(config.num_samples) {
        let item = item?;
        let record = build_record(&item, config.max_regions)?;

        if records.is_empty() {
            verify_first_item(&item, &record, renderer);
        }

        records.push(record);
        pb.inc(1);
    }

    Ok(records)
}

// Diagnostic only: nothing here may change the records or stop the run
fn verify_first_item<R: Renderer + ?Sized>(item: &SourceItem, record: &UnifiedRecord, renderer: &R) {
    let report = check_round_trip(item, record);
    if report.is_lossless() {
        info!(
            "Round trip check on item {}: {} boxes, max error {:.4}px (tolerance {:.4}px)",
            item.id, report.boxes_checked, report.max_error_px, report.tolerance_px
        );
    } else {
        warn!(
            "Round trip check on item {} exceeded tolerance: max error {:.4}px > {:.4}px",
            item.id, report.max_error_px, report.tolerance_px
        );
    }

    if let Err(e) = renderer.render(&item.image, record) {
        warn!("Skipping verification image: {}", e);
    }
}

/// Write records as newline-delimited JSON, one record per line, in order.
pub fn write_records<W: Write>(writer: &mut W, records: &[UnifiedRecord]) -> Result<(), EtlError> {
    for record in records {
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
