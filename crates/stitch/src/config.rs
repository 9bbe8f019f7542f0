use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{Result, StitchError};

/// How the raster is extended past its bottom/right edges so every tile fits.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaddingMode {
    /// Mirror without repeating the edge sample
    #[default]
    Reflect,
    /// Repeat the edge sample
    #[serde(alias = "edge")]
    #[strum(to_string = "replicate", serialize = "edge")]
    Replicate,
    /// Fill with zeros
    Constant,
}

/// Tiling, batching and blending parameters for one inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct InferenceConfig {
    /// Edge length of the square model window, in pixels
    #[schemars(range(min = 1))]
    pub tile_size: usize,
    /// Shared pixel width between neighbouring tiles (must be below `tile_size`)
    pub overlap: usize,
    /// Tiles per model invocation
    #[schemars(range(min = 1))]
    pub batch_size: usize,
    /// Weight tile contributions with a raised-cosine window
    pub blend: bool,
    pub padding: PaddingMode,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            tile_size: 512,
            overlap: 64,
            batch_size: 4,
            blend: true,
            padding: PaddingMode::Reflect,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(StitchError::InvalidConfig("tile_size must be at least 1".to_string()));
        }
        if self.overlap >= self.tile_size {
            return Err(StitchError::InvalidConfig(format!(
                "overlap ({}) must be smaller than tile_size ({})",
                self.overlap, self.tile_size
            )));
        }
        if self.batch_size == 0 {
            return Err(StitchError::InvalidConfig("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.tile_size.saturating_sub(self.overlap).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_is_valid() {
        let config = InferenceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stride(), 448);
    }

    #[test]
    fn test_overlap_must_be_below_tile_size() {
        let config = InferenceConfig { tile_size: 32, overlap: 32, ..Default::default() };
        assert!(matches!(config.validate(), Err(StitchError::InvalidConfig(_))));
    }

    #[test]
    fn test_padding_mode_accepts_edge_alias() {
        assert_eq!(PaddingMode::from_str("edge").unwrap(), PaddingMode::Replicate);
        let parsed: PaddingMode = serde_json::from_str("\"edge\"").unwrap();
        assert_eq!(parsed, PaddingMode::Replicate);
        assert_eq!(PaddingMode::Constant.to_string(), "constant");
    }
}
