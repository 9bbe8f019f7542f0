use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error(transparent)]
    Stitch(#[from] stitch::StitchError),

    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Invalid postprocessing configuration: {0}")]
    InvalidConfig(String),

    #[error("Geometric computation error: {0}")]
    GeometricComputation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

pub type Result<T> = std::result::Result<T, MaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_errors_convert() {
        let missing = image::open("/nonexistent/tile.png").unwrap_err();
        assert!(matches!(MaskError::from(missing), MaskError::ImageLoad(_)));

        let shape = stitch::StitchError::UnsupportedChannels(2);
        let error = MaskError::from(shape);
        assert!(matches!(error, MaskError::Stitch(_)));
        assert!(error.to_string().contains('2'));
    }
}
