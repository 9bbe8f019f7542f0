use chrono::{SecondsFormat, Utc};
use image::DynamicImage;
use mask::SegmentationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use stitch::Raster;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    MaskError(#[from] mask::MaskError),
    #[error(transparent)]
    StitchError(#[from] stitch::StitchError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Load a segmentation configuration, picking the parser from the file extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SegmentationConfig, CliError> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(path_ref)?;
    let config: SegmentationConfig = match path_ref.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content)?,
        Some("json") => serde_json::from_str(&content)?,
        _ => return Err(CliError::UnsupportedFileFormat),
    };
    config.validate()?;
    Ok(config)
}

/// Write a configuration back out in the format its extension names.
pub fn save_config<P: AsRef<Path>>(config: &SegmentationConfig, path: P) -> Result<(), CliError> {
    let path_ref = path.as_ref();
    let content = match path_ref.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::to_string_pretty(config)?,
        Some("json") => serde_json::to_string_pretty(config)?,
        _ => return Err(CliError::UnsupportedFileFormat),
    };
    fs::write(path_ref, content)?;
    Ok(())
}

/// Convert an image into the raster a model with `channels` input bands reads.
///
/// A single-band image is copied into all three bands of an RGB model.
pub fn model_raster(image: DynamicImage, channels: usize) -> Result<Raster, CliError> {
    let image = match (image.color().channel_count(), channels) {
        (1, 3) => match image {
            DynamicImage::ImageLuma16(_) => DynamicImage::ImageRgb16(image.to_rgb16()),
            _ => DynamicImage::ImageRgb8(image.to_rgb8()),
        },
        _ => image,
    };
    Ok(Raster::from_dynamic_image(&image)?)
}

/// Properties attached to every feature of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunProperties {
    pub source: String,
    pub model_version: String,
    /// RFC 3339, UTC
    pub generated_at: String,
}

impl RunProperties {
    pub fn now(source: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            model_version: model_version.into(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}
