use clap::{Parser, ValueEnum};
use doorguard::display::Drawable;
use doorguard::io::read_pcd;
use doorguard::pipeline::PipelineSummary;
use doorguard::{DoorPipeline, PipelineParams};
use log::{error, info};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Find a safety door in a point cloud and report the objects that cross it.
#[derive(Debug, Parser)]
#[command(name = "doorguard", version, about)]
struct CliArgs {
    /// The PCD file to process
    input: PathBuf,

    /// JSON file with pipeline parameters; missing keys keep their defaults
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Override the RANSAC seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the voxel size used for downsampling
    #[arg(long)]
    voxel_size: Option<f64>,

    /// Write the report here instead of to stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Include the display geometry in the report
    #[arg(long)]
    drawables: bool,

    /// Write the door and object meshes as STL files into this directory
    #[cfg(feature = "stl")]
    #[arg(long)]
    stl_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Serialize)]
struct Report {
    summary: PipelineSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    drawables: Option<Vec<Drawable>>,
}

fn init_logger(level: Option<LogLevel>) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(log::LevelFilter::Info);
    match level {
        Some(level) => {
            builder.parse_filters(level.as_str());
        }
        None => {
            if let Ok(filters) = std::env::var("RUST_LOG") {
                builder.parse_filters(&filters);
            }
        }
    }
    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {err}");
    }
}

fn run(cli: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut params = match &cli.params {
        Some(path) => PipelineParams::from_json_file(path)?,
        None => PipelineParams::default(),
    };
    if let Some(seed) = cli.seed {
        params.seed = seed;
    }
    if let Some(voxel_size) = cli.voxel_size {
        params.voxel_size = voxel_size;
    }

    let pipeline = DoorPipeline::new(params)?;
    let cloud = read_pcd(&cli.input)?;
    let output = pipeline.run(&cloud)?;

    #[cfg(feature = "stl")]
    if let Some(dir) = &cli.stl_dir {
        std::fs::create_dir_all(dir)?;
        if let Some(door) = &output.door_mesh {
            doorguard::io::write_stl(&dir.join("door.stl"), door)?;
        }
        for object in output.objects.iter() {
            if let Some(mesh) = &object.mesh {
                let name = format!("object_{}.stl", object.cluster.label);
                doorguard::io::write_stl(&dir.join(name), mesh)?;
            }
        }
    }

    let report = Report {
        summary: output.summary(),
        drawables: if cli.drawables {
            Some(output.drawables(params.mesh_opacity)?)
        } else {
            None
        },
    };
    let json = serde_json::to_string_pretty(&report)?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    if output.any_intersection() {
        info!("an object intersects the door");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = CliArgs::parse();
    init_logger(cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
