use clap::{Parser, Subcommand};
use cli::{RunProperties, load_config, model_raster};
use color_eyre::eyre::{Result, eyre};
use mask::{
    BinaryMask, DirectorySink, FeatureCollectionSink, InlineSink, Pipeline, SegmentationConfig, Segmenter,
    Thresholder, property_bag, save_geojson,
};
use std::path::{Path, PathBuf};
use stitch::{InputGeometry, InputLayout, ModelSource, Raster, SharedModel};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Vectorize a probability or mask image into GeoJSON
    Vectorize {
        /// Grayscale image; intensity / 255 is the probability
        #[arg(short, long)]
        input: PathBuf,
        /// Path to save the GeoJSON FeatureCollection
        #[arg(short, long)]
        output: PathBuf,
        /// TOML or JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Treat every non-zero pixel as foreground instead of thresholding
        #[arg(long)]
        binary: bool,
    },
    /// Run a model over one or more rasters and vectorize the predictions
    Predict {
        /// Input rasters
        #[arg(short, long, required = true)]
        input: Vec<PathBuf>,
        /// `.onnx` model file, or `luminance` for the built-in intensity model
        #[arg(short, long, default_value = "luminance")]
        model: PathBuf,
        /// TOML or JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write `<id>.geojson` files here; without it results are returned inline as base64
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Public URL prefix reported for files written to `--output-dir`
        #[arg(long)]
        url_prefix: Option<String>,
        /// Channels the model expects
        #[arg(long, default_value = "3")]
        channels: usize,
        /// Input axis order the model expects (nhwc or nchw)
        #[arg(long, default_value = "nhwc")]
        layout: InputLayout,
        /// Version string attached to every feature (defaults to the model file stem)
        #[arg(long)]
        model_version: Option<String>,
    },
    /// Print the JSON schema of the configuration file
    Schema,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Vectorize {
            input,
            output,
            config,
            binary,
        } => {
            vectorize(input, output, config.as_deref(), *binary)?;
        }
        Commands::Predict {
            input,
            model,
            config,
            output_dir,
            url_prefix,
            channels,
            layout,
            model_version,
        } => {
            let sink: Box<dyn FeatureCollectionSink> = match output_dir {
                Some(dir) => {
                    let sink = DirectorySink::new(dir);
                    match url_prefix {
                        Some(prefix) => Box::new(sink.with_url_prefix(prefix.clone())),
                        None => Box::new(sink),
                    }
                }
                None => Box::new(InlineSink),
            };
            let geometry = (*channels, *layout);
            predict(input, model, config.as_deref(), sink.as_ref(), geometry, model_version.clone())?;
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(SegmentationConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn config_or_default(path: Option<&Path>) -> Result<SegmentationConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Ok(load_config(path)?)
        }
        None => Ok(SegmentationConfig::default()),
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn vectorize(input: &Path, output: &Path, config_path: Option<&Path>, binary: bool) -> Result<()> {
    let config = config_or_default(config_path)?;
    let pipeline = Pipeline::from_config(&config)?;
    info!("{}", pipeline.info());

    let image = image::open(input)?.to_luma8();
    let mask = if binary {
        BinaryMask::from_image(&image)
    } else {
        Thresholder::new(config.threshold).apply_gray(&image)
    };
    if mask.is_empty() {
        warn!("No foreground pixels in {:?}", input);
    }

    let properties = property_bag(&RunProperties::now(source_name(input), "mask"))?;
    let collection = pipeline.vectorize_mask(&mask, &properties)?;
    save_geojson(&collection, output)?;

    info!("Wrote {} features to {:?}", collection.features.len(), output);
    Ok(())
}

fn predict(
    inputs: &[PathBuf],
    model_path: &Path,
    config_path: Option<&Path>,
    sink: &dyn FeatureCollectionSink,
    (channels, layout): (usize, InputLayout),
    model_version: Option<String>,
) -> Result<()> {
    let config = config_or_default(config_path)?;
    let segmenter = Segmenter::from_config(&config)?;

    let source = ModelSource::from_path(model_path)?;
    let geometry = InputGeometry {
        batch_size: config.inference.batch_size,
        tile_size: config.inference.tile_size,
        channels,
        layout,
    };
    let model = SharedModel::from_source(source, geometry);
    let model_version = model_version.unwrap_or_else(|| {
        model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });

    let luminance = model_path.as_os_str() == "luminance";
    for input in inputs {
        let image = image::open(input)?;
        let raster = if luminance {
            Raster::from_dynamic_image(&image)?
        } else {
            model_raster(image, channels)?
        };
        if raster.channels() != channels && !luminance {
            return Err(eyre!(
                "{:?} has {} channels but the model expects {}",
                input,
                raster.channels(),
                channels
            ));
        }

        let backend = model.get()?;
        let properties = property_bag(&RunProperties::now(source_name(input), model_version.as_str()))?;
        let output = segmenter.run(&raster, backend.as_ref(), &properties)?;

        let id = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .ok_or_else(|| eyre!("cannot derive an id from {:?}", input))?;
        let location = sink.persist(&output.collection, &id)?;

        let summary = serde_json::json!({
            "input": input,
            "location": location,
            "report": output.report,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    info!("✅ Processed {} rasters", inputs.len());
    Ok(())
}
