//! # Mask Vectorization Library
//!
//! Turns per-pixel segmentation probabilities into clean, topologically valid
//! GeoJSON polygons. Every stage sits behind a trait, so custom mask cleaners,
//! region extractors and shape postprocessors compose with the built-in ones.
//!
//! ## Core Features
//!
//! - **Thresholding**: probability surface to strictly binary mask
//! - **Mask cleaning**: morphological open/close, small object removal, hole filling
//! - **Polygonization**: exact pixel-boundary tracing with holes, 4- or 8-connected
//! - **Geometry postprocessing**: buffer, topology-preserving simplification,
//!   hole and area filters, union or repair of the polygon set
//! - **GeoJSON output**: optional affine georeferencing and CRS annotation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mask::{JsonObject, SegmentationConfig, Segmenter};
//! use stitch::{LuminanceModel, Raster};
//!
//! let image = image::open("tile.png")?;
//! let raster = Raster::from_dynamic_image(&image)?;
//!
//! let segmenter = Segmenter::from_config(&SegmentationConfig::default())?;
//! let output = segmenter.run(&raster, &LuminanceModel::default(), &JsonObject::new())?;
//! mask::save_geojson(&output.collection, "tile.geojson")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Pipeline
//!
//! ```rust,no_run
//! use mask::{BinaryMask, Connectivity, JsonObject, MorphologyMode, Pipeline, TopologyMode};
//!
//! let pipeline = Pipeline::builder()
//!     .connectivity(Connectivity::Eight)
//!     .with_morphology(MorphologyMode::Open, 3, 1)
//!     .with_min_object_area(16)
//!     .with_simplification(1.5)
//!     .with_min_area(50.0)
//!     .with_topology(TopologyMode::Clean)
//!     .build();
//!
//! let mask = BinaryMask::from_image(&image::open("mask.png")?.to_luma8());
//! let collection = pipeline.vectorize_mask(&mask, &JsonObject::new())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod algorithms;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod segmenter;
pub mod traits;
pub mod types;

pub use algorithms::*;
pub use config::{
    Connectivity, ExtractionMode, Georeference, MorphologyConfig, MorphologyMode, PostprocessConfig,
    SegmentationConfig, TopologyMode,
};
pub use error::{MaskError, Result};
pub use geojson::{FeatureCollection, JsonObject};
pub use io::{
    DirectorySink, FeatureCollectionSink, InlineSink, PersistedLocation, VectorSerializer, crs_member,
    property_bag, read_polygons, save_geojson, to_geojson_string, total_area,
};
pub use pipeline::{Pipeline, builder::PipelineBuilder};
pub use segmenter::{SegmentationOutput, SegmentationReport, Segmenter};
pub use traits::*;
pub use types::{BinaryMask, PolygonStats};
