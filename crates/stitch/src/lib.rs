//! # Tiled Segmentation Inference
//!
//! Runs an opaque per-pixel probability model over overlapping fixed-size
//! windows of an arbitrarily large raster and blends the tile outputs back into
//! a single, seam-free probability surface.
//!
//! ## Stages
//!
//! - **Window planning**: tile origins that cover every pixel, last tile flush with the far edge
//! - **Blending**: a strictly positive raised-cosine kernel that trusts tile centers over borders
//! - **Batching**: padded tiles grouped into model batches in NHWC or NCHW layout
//! - **Accumulation**: weighted sums normalized by weight, cropped to the input size
//!
//! ```rust,no_run
//! use stitch::{InferenceConfig, LuminanceModel, ProbabilityAccumulator, Raster};
//!
//! let image = image::open("tile.png")?;
//! let raster = Raster::from_dynamic_image(&image)?;
//! let accumulator = ProbabilityAccumulator::new(InferenceConfig::default())?;
//! let (surface, report) = accumulator.run(&raster, &LuminanceModel::default())?;
//! println!("{} tiles -> {}x{}", report.tile_count, surface.height(), surface.width());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod accumulate;
pub mod batch;
pub mod blend;
pub mod config;
pub mod error;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod raster;
pub mod window;

pub use accumulate::{AccumulationBuffer, InferenceReport, ProbabilityAccumulator, ProbabilitySurface, WEIGHT_EPSILON};
pub use batch::{TileBatch, TileBatcher};
pub use blend::BlendWindow;
pub use config::{InferenceConfig, PaddingMode};
pub use error::{Result, StitchError};
pub use model::{
    InputGeometry, InputLayout, LuminanceModel, ModelBackend, ModelSource, SegmentationModel, SharedModel,
    probability_maps,
};
pub use raster::Raster;
pub use window::{TileDescriptor, plan_offsets, plan_tiles};
