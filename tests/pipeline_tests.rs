use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Cursor;
use std::path::Path;

use region2instruct::schema::is_well_formed;
use region2instruct::{
    run_pipeline, EtlError, ManifestSource, OverlayRenderer, PipelineConfig, PixelBox, Region,
    Renderer, SourceItem, UnifiedRecord,
};

// Renderer that only remembers which records it was asked to draw
#[derive(Default)]
struct RecordingRenderer {
    rendered: RefCell<Vec<String>>,
}

impl Renderer for RecordingRenderer {
    fn render(&self, _image: &RgbImage, record: &UnifiedRecord) -> Result<(), EtlError> {
        self.rendered.borrow_mut().push(record.id.clone());
        Ok(())
    }
}

struct FailingRenderer;

impl Renderer for FailingRenderer {
    fn render(&self, _image: &RgbImage, _record: &UnifiedRecord) -> Result<(), EtlError> {
        Err(EtlError::render_unavailable("no backend"))
    }
}

fn make_item(index: usize) -> SourceItem {
    SourceItem {
        id: index.to_string(),
        image_path: format!("{}.jpg", index),
        image: RgbImage::new(200, 200),
        regions: vec![Region {
            bbox: PixelBox::new(10.0, 10.0, 100.0, 50.0),
            phrase: format!("region of item {}", index),
        }],
    }
}

fn config_in(dir: &Path, num_samples: usize) -> PipelineConfig {
    PipelineConfig {
        num_samples,
        max_regions: 10,
        output_path: dir.join("out").join("records.jsonl"),
    }
}

fn read_records(path: &Path) -> Vec<UnifiedRecord> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn test_pipeline_stops_at_num_samples() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config_in(temp_dir.path(), 3);
    let renderer = RecordingRenderer::default();

    let pulled = Cell::new(0);
    let source = (0..10).map(|i| {
        pulled.set(pulled.get() + 1);
        Ok(make_item(i))
    });

    let summary = run_pipeline(source, &config, &renderer).unwrap();

    assert_eq!(summary.records_written, 3);
    assert!(!summary.source_exhausted);
    assert_eq!(pulled.get(), 3);

    let records = read_records(&config.output_path);
    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["visual_genome_0", "visual_genome_1", "visual_genome_2"]
    );
    assert!(records.iter().all(is_well_formed));
    assert_eq!(records[0].spatial_annotations[0].bbox_2d.to_array(), [0.05, 0.05, 0.55, 0.3]);

    // only the first item is rendered
    assert_eq!(*renderer.rendered.borrow(), vec!["visual_genome_0".to_string()]);
}

#[test]
fn test_pipeline_consumes_short_source() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config_in(temp_dir.path(), 5);

    let source = (0..2).map(|i| Ok(make_item(i)));
    let summary = run_pipeline(source, &config, &RecordingRenderer::default()).unwrap();

    assert_eq!(summary.records_written, 2);
    assert!(summary.source_exhausted);
    assert_eq!(read_records(&config.output_path).len(), 2);
}

#[test]
fn test_pipeline_empty_source_writes_empty_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config_in(temp_dir.path(), 4);
    let renderer = RecordingRenderer::default();

    let summary = run_pipeline(std::iter::empty(), &config, &renderer).unwrap();

    assert_eq!(summary.records_written, 0);
    assert_eq!(fs::read_to_string(&config.output_path).unwrap(), "");
    assert!(renderer.rendered.borrow().is_empty());
}

#[test]
fn test_pipeline_survives_render_failure() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config_in(temp_dir.path(), 2);

    let source = (0..2).map(|i| Ok(make_item(i)));
    let summary = run_pipeline(source, &config, &FailingRenderer).unwrap();

    assert_eq!(summary.records_written, 2);
}

#[test]
fn test_pipeline_source_error_is_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config_in(temp_dir.path(), 5);

    let source = vec![
        Ok(make_item(0)),
        Err(EtlError::source_unavailable("connection lost", "timeout")),
        Ok(make_item(2)),
    ];
    let result = run_pipeline(source, &config, &RecordingRenderer::default());

    assert!(matches!(result, Err(EtlError::SourceUnavailable { .. })));
    assert!(!config.output_path.exists());
}

#[test]
fn test_pipeline_invalid_dimension_is_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config_in(temp_dir.path(), 5);

    let mut broken = make_item(1);
    broken.image = RgbImage::new(0, 0);
    let source = vec![Ok(make_item(0)), Ok(broken)];
    let result = run_pipeline(source, &config, &RecordingRenderer::default());

    assert!(matches!(result, Err(EtlError::InvalidDimension { .. })));
    assert!(!config.output_path.exists());
}

#[test]
fn test_overlay_renderer_draws_boxes() {
    let temp_dir = tempfile::tempdir().unwrap();
    let output = temp_dir.path().join("diag").join("verify.png");
    let renderer = OverlayRenderer::new(&output);

    let item = make_item(0);
    let record = region2instruct::build_record(&item, 10).unwrap();
    renderer.render(&item.image, &record).unwrap();

    let drawn = image::open(&output).unwrap().to_rgb8();
    assert_eq!(drawn.dimensions(), (200, 200));
    // box spans x 10..110, y 10..60
    assert_eq!(*drawn.get_pixel(10, 30), Rgb([0, 255, 0]));
    assert_eq!(*drawn.get_pixel(109, 30), Rgb([0, 255, 0]));
    assert_eq!(*drawn.get_pixel(50, 10), Rgb([0, 255, 0]));
    assert_eq!(*drawn.get_pixel(60, 35), Rgb([0, 0, 0]));
    assert_eq!(*drawn.get_pixel(150, 150), Rgb([0, 0, 0]));
}

fn captioned_item(width: u32, height: u32, regions: &[(f64, f64, f64, f64, &str)]) -> SourceItem {
    SourceItem {
        id: "captioned".to_string(),
        image_path: "captioned.jpg".to_string(),
        image: RgbImage::new(width, height),
        regions: regions
            .iter()
            .map(|&(x, y, w, h, phrase)| Region {
                bbox: PixelBox::new(x, y, w, h),
                phrase: phrase.to_string(),
            })
            .collect(),
    }
}

#[test]
fn test_overlay_renderer_draws_captions() {
    // box spans x 20..120, y 80..130; a 16px caption sits on rows 62..80
    let item = captioned_item(200, 200, &[(20.0, 80.0, 100.0, 50.0, "a red kite")]);
    let record = region2instruct::build_record(&item, 10).unwrap();

    let plain = OverlayRenderer::new("unused.png").draw(&item.image, &record);
    assert_eq!(*plain.get_pixel(30, 62), Rgb([0, 0, 0]));

    let renderer = OverlayRenderer::new("unused.png").with_system_font();
    if renderer.font.is_none() {
        // no font on this machine: captions are skipped, boxes are covered above
        return;
    }
    let drawn = renderer.draw(&item.image, &record);

    // "a red kite" is 10 chars at 16 * 0.6 px each, so the label is 96px wide
    for x in [20, 60, 115] {
        assert_eq!(*drawn.get_pixel(x, 62), Rgb([0, 255, 0]), "x = {}", x);
    }
    assert_eq!(*drawn.get_pixel(19, 62), Rgb([0, 0, 0]));
    assert_eq!(*drawn.get_pixel(116, 62), Rgb([0, 0, 0]));
    assert_eq!(*drawn.get_pixel(30, 61), Rgb([0, 0, 0]));
    // the box itself is still there
    assert_eq!(*drawn.get_pixel(20, 100), Rgb([0, 255, 0]));

    // box on the top edge: caption goes inside it; non-ASCII and overlong text must not panic
    let long_caption = "w".repeat(500);
    let item = captioned_item(
        40,
        20,
        &[
            (0.0, 0.0, 30.0, 10.0, "café 猫 ☂ ü"),
            (0.0, 0.0, 40.0, 20.0, long_caption.as_str()),
        ],
    );
    let record = region2instruct::build_record(&item, 10).unwrap();
    let drawn = renderer.draw(&item.image, &record);
    assert_eq!(drawn.dimensions(), (40, 20));
    assert_eq!(*drawn.get_pixel(39, 0), Rgb([0, 255, 0]));
}

#[test]
fn test_overlay_renderer_missing_font_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("no_such_font.ttf");

    let err = OverlayRenderer::new(temp_dir.path().join("verify.png"))
        .with_font_path(&missing)
        .err()
        .expect("a missing font file must fail");

    assert!(matches!(err, EtlError::RenderUnavailable { .. }), "{:?}", err);
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("no_such_font.ttf"), "{}", err);
}

#[test]
fn test_overlay_renderer_reports_unwritable_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let renderer = OverlayRenderer::new(temp_dir.path().join("verify.not_an_image_format"));

    let item = make_item(0);
    let record = region2instruct::build_record(&item, 10).unwrap();
    let err = renderer.render(&item.image, &record).unwrap_err();

    assert!(matches!(err, EtlError::RenderUnavailable { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_manifest_source_reads_files_and_embedded_images() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = temp_dir.path();

    RgbImage::new(200, 100).save(dir.join("1.png")).unwrap();
    let embedded = STANDARD.encode(png_bytes(&RgbImage::new(64, 48)));

    let first = r#"{"id": 1, "image_path": "1.png", "regions": [{"region_id": 9, "x": 10, "y": 10, "width": 100, "height": 50, "phrase": "a dog"}]}"#;
    let second = format!(
        r#"{{"id": "abc", "image_path": "missing.png", "image_data": "{}"}}"#,
        embedded
    );
    let manifest = format!("{}\n{}\n", first, second);
    let manifest_path = dir.join("manifest.jsonl");
    fs::write(&manifest_path, manifest).unwrap();

    let items: Vec<SourceItem> = ManifestSource::open(&manifest_path, None)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "1");
    assert_eq!((items[0].width(), items[0].height()), (200, 100));
    assert_eq!(items[0].regions[0].bbox, PixelBox::new(10.0, 10.0, 100.0, 50.0));
    assert_eq!(items[0].regions[0].phrase, "a dog");
    assert_eq!(items[1].id, "abc");
    assert_eq!(items[1].image_path, "missing.png");
    assert_eq!((items[1].width(), items[1].height()), (64, 48));
    assert!(items[1].regions.is_empty());
}

#[test]
fn test_manifest_source_stops_after_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    RgbImage::new(8, 8).save(temp_dir.path().join("a.png")).unwrap();

    let manifest = concat!(
        r#"{"id": 1, "image_path": "a.png", "regions": []}"#,
        "\n",
        r#"{"id": 2}"#,
        "\n",
        r#"{"id": 3, "image_path": "a.png", "regions": []}"#,
        "\n",
    );
    let mut source = ManifestSource::from_reader(manifest.as_bytes(), temp_dir.path());

    assert!(matches!(source.next(), Some(Ok(_))));
    assert!(matches!(
        source.next(),
        Some(Err(EtlError::SourceUnavailable { .. }))
    ));
    assert!(source.next().is_none());
    assert!(source.next().is_none());
}

#[test]
fn test_manifest_source_missing_image() {
    let temp_dir = tempfile::tempdir().unwrap();
    let manifest = r#"{"id": 5, "image_path": "nowhere.png", "regions": []}"#;
    let mut source = ManifestSource::from_reader(manifest.as_bytes(), temp_dir.path());

    match source.next() {
        Some(Err(EtlError::SourceUnavailable { context, .. })) => {
            assert!(context.contains("item 5"), "{}", context)
        }
        _ => panic!("expected a missing image error"),
    }
}

#[test]
fn test_end_to_end_from_manifest() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = temp_dir.path();

    let mut manifest = String::new();
    for i in 0..10 {
        RgbImage::new(200, 200).save(dir.join(format!("{}.png", i))).unwrap();
        manifest.push_str(&format!(
            r#"{{"id": {i}, "image_path": "{i}.png", "regions": [{{"x": 10, "y": 10, "width": 100, "height": 50, "phrase": "box {i}"}}, {{"x": -5, "y": -5, "width": 250, "height": 250, "phrase": "everything"}}]}}"#
        ));
        manifest.push('\n');
    }
    let manifest_path = dir.join("regions.jsonl");
    fs::write(&manifest_path, manifest).unwrap();

    let config = config_in(dir, 3);
    let verify_image = dir.join("verify.png");
    let renderer = OverlayRenderer::new(&verify_image);
    let source = ManifestSource::open(&manifest_path, None).unwrap();

    let summary = run_pipeline(source, &config, &renderer).unwrap();
    assert_eq!(summary.records_written, 3);
    assert!(verify_image.exists());

    let records = read_records(&config.output_path);
    assert_eq!(records.len(), 3);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.id, format!("visual_genome_{}", i));
        assert_eq!(
            record.spatial_annotations[0].bbox_2d.to_array(),
            [0.05, 0.05, 0.55, 0.3]
        );
        assert_eq!(
            record.spatial_annotations[1].bbox_2d.to_array(),
            [0.0, 0.0, 1.0, 1.0]
        );
        assert_eq!(record.conversations[1].value, format!("box {}", i));
        assert!(is_well_formed(record));
    }
}
