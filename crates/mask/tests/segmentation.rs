use image::{DynamicImage, GrayImage, Luma};
use ndarray::{ArrayD, ArrayView4, Axis, IxDyn};
use stitch::{InferenceConfig, Raster, SegmentationModel, StitchError};

use mask::{
    DirectorySink, FeatureCollectionSink, Georeference, InlineSink, JsonObject, MaskError, PersistedLocation,
    PostprocessConfig, SegmentationConfig, Segmenter, property_bag, total_area,
};

/// Foreground wherever the first channel is brighter than mid-grey.
struct BrightPixelModel;

impl SegmentationModel for BrightPixelModel {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> stitch::Result<ArrayD<f32>> {
        let probabilities = batch.map_axis(Axis(3), |pixel| if pixel[0] > 0.5 { 1.0 } else { 0.0 });
        Ok(probabilities.insert_axis(Axis(3)).into_dyn())
    }

    fn name(&self) -> &str {
        "bright_pixel"
    }
}

/// Returns maps at half the tile size.
struct HalfSizeModel;

impl SegmentationModel for HalfSizeModel {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> stitch::Result<ArrayD<f32>> {
        let (n, t) = (batch.shape()[0], batch.shape()[1]);
        Ok(ArrayD::zeros(IxDyn(&[n, t / 2, t / 2])))
    }

    fn name(&self) -> &str {
        "half_size"
    }
}

fn disk_raster() -> (Raster, usize) {
    let image = GrayImage::from_fn(100, 100, |x, y| {
        let (dx, dy) = (x as i64 - 50, y as i64 - 50);
        if dx * dx + dy * dy <= 400 { Luma([255]) } else { Luma([0]) }
    });
    let pixels = image.pixels().filter(|p| p.0[0] > 0).count();
    let raster = Raster::from_dynamic_image(&DynamicImage::ImageLuma8(image)).unwrap();
    (raster, pixels)
}

fn tiled_config(min_area: f64) -> SegmentationConfig {
    SegmentationConfig {
        inference: InferenceConfig { tile_size: 64, overlap: 16, batch_size: 3, ..Default::default() },
        threshold: 0.5,
        postprocess: PostprocessConfig { min_area, ..Default::default() },
    }
}

#[test]
fn test_disk_end_to_end() {
    let (raster, pixels) = disk_raster();
    let segmenter = Segmenter::from_config(&tiled_config(50.0)).unwrap();
    let output = segmenter.run(&raster, &BrightPixelModel, &JsonObject::new()).unwrap();

    assert_eq!(output.collection.features.len(), 1);
    let area = total_area(&output.collection).unwrap();
    let ratio = area / pixels as f64;
    assert!((0.5..=1.5).contains(&ratio), "area {area} vs {pixels} pixels");

    let report = output.report;
    assert_eq!(report.feature_count, 1);
    assert_eq!(report.inference.tile_count, 4);
    assert_eq!(report.inference.batch_count, 2);
    assert_eq!(report.inference.non_finite_values, 0);
}

#[test]
fn test_bad_model_output_is_fatal() {
    let (raster, _) = disk_raster();
    let segmenter = Segmenter::from_config(&tiled_config(0.0)).unwrap();
    let result = segmenter.run(&raster, &HalfSizeModel, &JsonObject::new());

    assert!(matches!(result, Err(MaskError::Stitch(StitchError::ModelOutputShape { .. }))));
}

#[test]
fn test_unsupported_channels_are_rejected() {
    let image = DynamicImage::ImageLumaA8(image::GrayAlphaImage::new(8, 8));
    let result = Raster::from_dynamic_image(&image);
    assert!(matches!(result, Err(StitchError::UnsupportedChannels(2))));
}

#[test]
fn test_georeferenced_output_with_properties() {
    let (raster, pixels) = disk_raster();
    let mut config = tiled_config(0.0);
    config.postprocess.georeference = Some(Georeference {
        transform: [500_000.0, 0.5, 0.0, 4_000_000.0, 0.0, -0.5],
        crs: Some("EPSG:32633".to_string()),
    });
    let properties = property_bag(&serde_json::json!({
        "source": "disk.png",
        "model_version": "test",
    }))
    .unwrap();

    let output = Segmenter::from_config(&config)
        .unwrap()
        .run(&raster, &BrightPixelModel, &properties)
        .unwrap();
    let collection = output.collection;

    let area = total_area(&collection).unwrap();
    assert!((area - pixels as f64 * 0.25).abs() < 1e-6);

    let feature = &collection.features[0];
    assert_eq!(feature.property("source").and_then(|v| v.as_str()), Some("disk.png"));

    let members = collection.foreign_members.as_ref().unwrap();
    assert_eq!(members["crs"]["properties"]["name"], "EPSG:32633");
    assert_eq!(members["image_width"], 100);
}

#[test]
fn test_output_persists_through_sinks() {
    let (raster, pixels) = disk_raster();
    let segmenter = Segmenter::from_config(&tiled_config(0.0)).unwrap();
    let collection = segmenter.run(&raster, &BrightPixelModel, &JsonObject::new()).unwrap().collection;

    let dir = tempfile::tempdir().unwrap();
    let location = DirectorySink::new(dir.path()).persist(&collection, "disk").unwrap();
    let PersistedLocation::Path { path } = location else {
        panic!("expected a file path");
    };
    let reloaded: geojson::FeatureCollection = std::fs::read_to_string(path).unwrap().parse().unwrap();
    assert_eq!(total_area(&reloaded).unwrap(), pixels as f64);

    let PersistedLocation::Inline { base64 } = InlineSink.persist(&collection, "disk").unwrap() else {
        panic!("expected an inline payload");
    };
    assert_eq!(InlineSink::decode(&base64).unwrap(), collection);
}
