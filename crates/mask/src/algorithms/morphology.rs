use imageproc::distance_transform::Norm;
use tracing::debug;

use crate::{
    algorithms::labelling::ComponentLabels,
    config::{Connectivity, MorphologyConfig, MorphologyMode},
    error::Result,
    traits::MaskProcessor,
    types::BinaryMask,
};

/// Binary opening or closing with a diamond structuring element.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphologySmoother {
    pub mode: MorphologyMode,
    /// Odd structuring element size; the radius is `kernel_size / 2`
    pub kernel_size: u32,
    pub iterations: u32,
}

impl Default for MorphologySmoother {
    fn default() -> Self {
        Self {
            mode: MorphologyMode::Open,
            kernel_size: 3,
            iterations: 1,
        }
    }
}

impl MaskProcessor for MorphologySmoother {
    fn process(&self, mask: &BinaryMask) -> Result<BinaryMask> {
        let radius = (self.kernel_size / 2).clamp(1, u8::MAX as u32 - 1) as u8;
        let mut image = mask.as_image().clone();
        for _ in 0..self.iterations.max(1) {
            image = match self.mode {
                MorphologyMode::None => return Ok(mask.clone()),
                MorphologyMode::Open => imageproc::morphology::open(&image, Norm::L1, radius),
                MorphologyMode::Close => imageproc::morphology::close(&image, Norm::L1, radius),
            };
        }
        Ok(BinaryMask::from_image(&image))
    }

    fn name(&self) -> &str {
        "morphology"
    }
}

/// Erases foreground components with fewer than `min_area` pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct SmallObjectRemover {
    pub min_area: usize,
    pub connectivity: Connectivity,
}

impl MaskProcessor for SmallObjectRemover {
    fn process(&self, mask: &BinaryMask) -> Result<BinaryMask> {
        if self.min_area == 0 {
            return Ok(mask.clone());
        }
        let labels = ComponentLabels::new(mask, self.connectivity);
        let mut cleaned = mask.clone();
        let mut removed = 0usize;
        for region in labels.regions().iter().filter(|r| r.pixel_count < self.min_area) {
            for y in region.min_y..=region.max_y {
                for x in region.min_x..=region.max_x {
                    if labels.label_at(x, y) == region.label {
                        cleaned.set(x, y, false);
                    }
                }
            }
            removed += 1;
        }
        debug!(removed, min_area = self.min_area, "Removed small objects");
        Ok(cleaned)
    }

    fn name(&self) -> &str {
        "small_objects"
    }
}

/// Fills enclosed background regions.
///
/// A hole is a background component that does not touch the image border,
/// labelled with the complement of the foreground connectivity.
#[derive(Debug, Clone, PartialEq)]
pub struct SmallHoleFiller {
    /// Holes with fewer pixels are filled; 0 fills every hole
    pub max_area: usize,
    pub connectivity: Connectivity,
}

impl MaskProcessor for SmallHoleFiller {
    fn process(&self, mask: &BinaryMask) -> Result<BinaryMask> {
        let background = mask.inverted();
        let labels = ComponentLabels::new(&background, self.connectivity.complement());
        let mut filled = mask.clone();
        let mut holes = 0usize;
        for region in labels.regions() {
            if region.touches_border || (self.max_area > 0 && region.pixel_count >= self.max_area) {
                continue;
            }
            for y in region.min_y..=region.max_y {
                for x in region.min_x..=region.max_x {
                    if labels.label_at(x, y) == region.label {
                        filled.set(x, y, true);
                    }
                }
            }
            holes += 1;
        }
        debug!(holes, max_area = self.max_area, "Filled holes");
        Ok(filled)
    }

    fn name(&self) -> &str {
        "small_holes"
    }
}

/// Morphology, then small-object removal, then optional hole filling.
pub struct MaskCleaner {
    steps: Vec<Box<dyn MaskProcessor>>,
}

impl MaskCleaner {
    pub fn from_config(config: &MorphologyConfig, connectivity: Connectivity) -> Self {
        let mut steps: Vec<Box<dyn MaskProcessor>> = Vec::new();
        if config.mode != MorphologyMode::None {
            steps.push(Box::new(MorphologySmoother {
                mode: config.mode,
                kernel_size: config.effective_kernel_size(),
                iterations: config.iterations,
            }));
        }
        if config.min_object_area > 0 {
            steps.push(Box::new(SmallObjectRemover {
                min_area: config.min_object_area as usize,
                connectivity,
            }));
        }
        if config.remove_holes {
            steps.push(Box::new(SmallHoleFiller {
                max_area: config.min_hole_area as usize,
                connectivity,
            }));
        }
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<Box<dyn MaskProcessor>> {
        self.steps
    }
}

impl MaskProcessor for MaskCleaner {
    fn process(&self, mask: &BinaryMask) -> Result<BinaryMask> {
        let mut current = mask.clone();
        for step in &self.steps {
            current = step.process(&current)?;
        }
        Ok(current)
    }

    fn name(&self) -> &str {
        "mask_cleaner"
    }
}
