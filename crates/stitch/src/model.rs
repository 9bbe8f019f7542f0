use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use ndarray::{Array3, Array4, ArrayD, ArrayView4, Axis, Ix3, IxDyn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::{debug, info};

use crate::error::{Result, StitchError};

/// Axis order the model expects for its input batch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InputLayout {
    /// `[N, H, W, C]`
    #[default]
    Nhwc,
    /// `[N, C, H, W]`
    Nchw,
}

/// Opaque per-pixel probability predictor.
///
/// `predict` receives a batch of normalized tiles in the layout reported by
/// [`SegmentationModel::input_layout`] and returns one probability map per
/// tile, shaped `[N, T, T]`, `[N, T, T, 1]` or `[N, 1, T, T]`.
pub trait SegmentationModel: Send + Sync {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>>;

    fn input_layout(&self) -> InputLayout {
        InputLayout::Nhwc
    }

    fn name(&self) -> &str;
}

/// Reduce a raw model output to `[N, T, T]`.
pub fn probability_maps(output: ArrayD<f32>, batch: usize, tile: usize) -> Result<Array3<f32>> {
    let shape = output.shape().to_vec();
    let bad_shape = || StitchError::ModelOutputShape {
        expected: batch,
        tile,
        actual: shape.clone(),
    };

    let squeezed = match shape.as_slice() {
        [n, h, w] if *n == batch && *h == tile && *w == tile => output,
        [n, h, w, 1] if *n == batch && *h == tile && *w == tile => output.index_axis_move(Axis(3), 0),
        [n, 1, h, w] if *n == batch && *h == tile && *w == tile => output.index_axis_move(Axis(1), 0),
        _ => return Err(bad_shape()),
    };

    squeezed.into_dimensionality::<Ix3>().map_err(|_| bad_shape())
}

/// Mean normalized intensity across channels, used as the foreground probability.
///
/// Lets probability rasters and already-thresholded masks flow through the
/// same tiled pipeline as learned models.
#[derive(Debug, Clone, Default)]
pub struct LuminanceModel {
    pub layout: InputLayout,
}

impl SegmentationModel for LuminanceModel {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        let channel_axis = match self.layout {
            InputLayout::Nhwc => Axis(3),
            InputLayout::Nchw => Axis(1),
        };
        let mean = batch
            .mean_axis(channel_axis)
            .ok_or_else(|| StitchError::Model("empty channel axis".to_string()))?;
        Ok(mean.mapv(|v| v.clamp(0.0, 1.0)).into_dyn())
    }

    fn input_layout(&self) -> InputLayout {
        self.layout
    }

    fn name(&self) -> &str {
        "luminance"
    }
}

/// Where a model comes from. Resolved once, at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    Luminance,
    Onnx(PathBuf),
}

impl ModelSource {
    /// Pick a backend from a path or the `luminance` keyword.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == "luminance" {
            return Ok(Self::Luminance);
        }
        match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("onnx") => Ok(Self::Onnx(path.to_path_buf())),
            _ => Err(StitchError::ModelLoad(format!(
                "unrecognised model format: {}",
                path.display()
            ))),
        }
    }
}

/// Fixed input geometry for runtimes that need concrete shapes up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputGeometry {
    pub batch_size: usize,
    pub tile_size: usize,
    pub channels: usize,
    pub layout: InputLayout,
}

/// Concrete model implementations behind the [`SegmentationModel`] capability.
#[derive(Clone)]
pub enum ModelBackend {
    Luminance(LuminanceModel),
    #[cfg(feature = "onnx")]
    Onnx(Arc<crate::onnx::OnnxModel>),
    Custom(Arc<dyn SegmentationModel>),
}

impl ModelBackend {
    pub fn load(source: &ModelSource, geometry: InputGeometry) -> Result<Self> {
        match source {
            ModelSource::Luminance => Ok(Self::Luminance(LuminanceModel { layout: geometry.layout })),
            #[cfg(feature = "onnx")]
            ModelSource::Onnx(path) => {
                let model = crate::onnx::OnnxModel::load(path, geometry)?;
                Ok(Self::Onnx(Arc::new(model)))
            }
            #[cfg(not(feature = "onnx"))]
            ModelSource::Onnx(path) => Err(StitchError::BackendUnavailable(format!(
                "{} requires the `onnx` feature",
                path.display()
            ))),
        }
    }
}

impl fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelBackend").field(&self.name()).finish()
    }
}

impl SegmentationModel for ModelBackend {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        match self {
            Self::Luminance(model) => model.predict(batch),
            #[cfg(feature = "onnx")]
            Self::Onnx(model) => model.predict(batch),
            Self::Custom(model) => model.predict(batch),
        }
    }

    fn input_layout(&self) -> InputLayout {
        match self {
            Self::Luminance(model) => model.input_layout(),
            #[cfg(feature = "onnx")]
            Self::Onnx(model) => model.input_layout(),
            Self::Custom(model) => model.input_layout(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Luminance(model) => model.name(),
            #[cfg(feature = "onnx")]
            Self::Onnx(model) => model.name(),
            Self::Custom(model) => model.name(),
        }
    }
}

type Loader = Box<dyn Fn() -> Result<ModelBackend> + Send + Sync>;

/// Process-wide model handle that is loaded at most once.
///
/// The first caller of [`SharedModel::get`] runs the loader while holding the
/// gate; concurrent callers block on the gate and then observe the same
/// instance. A failed load leaves the slot empty.
pub struct SharedModel {
    loader: Loader,
    slot: Mutex<Option<Arc<ModelBackend>>>,
}

impl SharedModel {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<ModelBackend> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            slot: Mutex::new(None),
        }
    }

    pub fn from_source(source: ModelSource, geometry: InputGeometry) -> Self {
        Self::new(move || ModelBackend::load(&source, geometry))
    }

    pub fn get(&self) -> Result<Arc<ModelBackend>> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        debug!("loading segmentation model");
        let model = Arc::new((self.loader)()?);
        info!(model = model.name(), "segmentation model loaded");
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

impl fmt::Debug for SharedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedModel").field("loaded", &self.is_loaded()).finish()
    }
}

/// Build an `[N, T, T, C]` or `[N, C, T, T]` batch buffer.
pub(crate) fn batch_buffer(count: usize, tile: usize, channels: usize, layout: InputLayout) -> Array4<f32> {
    match layout {
        InputLayout::Nhwc => Array4::zeros((count, tile, tile, channels)),
        InputLayout::Nchw => Array4::zeros((count, channels, tile, tile)),
    }
}

/// Keep the first `count` items of a batch output that was run padded.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
pub(crate) fn unpad_output(shape: &[usize], values: &[f32], count: usize, tile: usize) -> Result<ArrayD<f32>> {
    let padded = match shape.first() {
        Some(&n) if n >= count && n > 0 => n,
        _ => {
            return Err(StitchError::ModelOutputShape {
                expected: count,
                tile,
                actual: shape.to_vec(),
            });
        }
    };

    let per_item = values.len() / padded;
    let mut out_shape = shape.to_vec();
    out_shape[0] = count;
    Ok(ArrayD::from_shape_vec(IxDyn(&out_shape), values[..per_item * count].to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_probability_maps_accepts_supported_shapes() {
        let nhw = ArrayD::<f32>::zeros(IxDyn(&[2, 4, 4]));
        assert_eq!(probability_maps(nhw, 2, 4).unwrap().dim(), (2, 4, 4));

        let nhw1 = ArrayD::<f32>::from_elem(IxDyn(&[2, 4, 4, 1]), 0.25);
        let maps = probability_maps(nhw1, 2, 4).unwrap();
        assert_eq!(maps.dim(), (2, 4, 4));
        assert_eq!(maps[[1, 3, 3]], 0.25);

        let n1hw = ArrayD::<f32>::zeros(IxDyn(&[3, 1, 4, 4]));
        assert_eq!(probability_maps(n1hw, 3, 4).unwrap().dim(), (3, 4, 4));
    }

    #[test]
    fn test_probability_maps_rejects_multichannel_output() {
        let two_class = ArrayD::<f32>::zeros(IxDyn(&[2, 4, 4, 2]));
        assert!(matches!(
            probability_maps(two_class, 2, 4),
            Err(StitchError::ModelOutputShape { .. })
        ));

        let wrong_batch = ArrayD::<f32>::zeros(IxDyn(&[1, 4, 4]));
        assert!(probability_maps(wrong_batch, 2, 4).is_err());

        let flat = ArrayD::<f32>::zeros(IxDyn(&[2, 16]));
        assert!(probability_maps(flat, 2, 4).is_err());
    }

    #[test]
    fn test_unpad_output_keeps_leading_items() {
        let values: Vec<f32> = (0..4 * 2 * 2).map(|v| v as f32).collect();
        let kept = unpad_output(&[4, 2, 2], &values, 3, 2).unwrap();
        assert_eq!(kept.shape(), &[3, 2, 2]);
        assert_eq!(kept[[2, 1, 1]], 11.0);
    }

    #[test]
    fn test_unpad_output_rejects_scalar_and_short_batches() {
        assert!(matches!(
            unpad_output(&[], &[0.5], 1, 4),
            Err(StitchError::ModelOutputShape { expected: 1, .. })
        ));
        assert!(matches!(
            unpad_output(&[1, 4, 4], &[0.0; 16], 2, 4),
            Err(StitchError::ModelOutputShape { .. })
        ));
    }

    #[test]
    fn test_luminance_model_averages_channels() {
        let mut batch = Array4::<f32>::zeros((1, 2, 2, 3));
        batch[[0, 0, 0, 0]] = 0.3;
        batch[[0, 0, 0, 1]] = 0.6;
        batch[[0, 0, 0, 2]] = 0.9;
        let out = LuminanceModel::default().predict(batch.view()).unwrap();
        assert_eq!(out.shape(), &[1, 2, 2]);
        assert!((out[[0, 0, 0]] - 0.6).abs() < 1e-6);

        let nchw = LuminanceModel { layout: InputLayout::Nchw };
        let out = nchw.predict(Array4::<f32>::ones((2, 3, 5, 5)).view()).unwrap();
        assert_eq!(out.shape(), &[2, 5, 5]);
    }

    #[test]
    fn test_model_source_from_path() {
        assert_eq!(ModelSource::from_path("luminance").unwrap(), ModelSource::Luminance);
        assert_eq!(
            ModelSource::from_path("models/unet/1.0.0/model.ONNX").unwrap(),
            ModelSource::Onnx(PathBuf::from("models/unet/1.0.0/model.ONNX"))
        );
        assert!(ModelSource::from_path("model.h5").is_err());
    }

    #[test]
    fn test_shared_model_loads_once_across_threads() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let shared = Arc::new(SharedModel::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            Ok(ModelBackend::Luminance(LuminanceModel::default()))
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || shared.get().unwrap())
            })
            .collect();
        let models: Vec<Arc<ModelBackend>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(shared.is_loaded());
    }

    #[test]
    fn test_shared_model_retries_after_failed_load() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let shared = SharedModel::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StitchError::ModelLoad("weights missing".to_string()))
            } else {
                Ok(ModelBackend::Luminance(LuminanceModel::default()))
            }
        });

        assert!(shared.get().is_err());
        assert!(!shared.is_loaded());
        assert!(shared.get().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_backend_requires_feature() {
        let geometry = InputGeometry {
            batch_size: 1,
            tile_size: 8,
            channels: 3,
            layout: InputLayout::Nhwc,
        };
        let result = ModelBackend::load(&ModelSource::Onnx(PathBuf::from("model.onnx")), geometry);
        assert!(matches!(result, Err(StitchError::BackendUnavailable(_))));
    }
}
