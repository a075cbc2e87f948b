use clap::Parser;
use log::{error, info, warn};
use std::process::ExitCode;

use region2instruct::{run_pipeline, Args, ManifestSource, OverlayRenderer, PipelineConfig};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.input.exists() {
        error!(
            "The specified manifest does not exist: {}",
            args.input.display()
        );
        return ExitCode::FAILURE;
    }

    let renderer = build_renderer(&args);
    let config = PipelineConfig::from(&args);

    info!(
        "Converting up to {} items from {}",
        config.num_samples,
        args.input.display()
    );

    let source = match ManifestSource::open(&args.input, args.images_root.as_deref()) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open source: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_pipeline(source, &config, &renderer) {
        Ok(summary) => {
            info!(
                "Conversion process completed successfully: {} records written.",
                summary.records_written
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Conversion failed: {}", e);
            let mut cause = std::error::Error::source(&e);
            while let Some(inner) = cause {
                error!("  caused by: {}", inner);
                cause = inner.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn build_renderer(args: &Args) -> OverlayRenderer {
    if let Some(font_path) = &args.font {
        match OverlayRenderer::new(args.verify_image.clone()).with_font_path(font_path) {
            Ok(renderer) => return renderer,
            Err(e) => warn!(
                "Could not load font {}: {}; falling back to system fonts",
                font_path.display(),
                e
            ),
        }
    }
    OverlayRenderer::new(args.verify_image.clone()).with_system_font()
}
