use anyhow::{Context, Result};
use burn_ndarray::NdArray;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use hyseg_core::mesh::icosphere;
use hyseg_core::{GridExtent, Image, Point3, Spacing3, VoxelGrid};
use hyseg_segmentation::{
    HybridCoordinator, ProgressCallback, ProgressInfo, SegmentationConfig,
};

type Backend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Developer tasks for the hyseg project")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a synthetic binary sphere and report how well it was recovered
    Phantom {
        /// Edge length of the cubic grid in voxels
        #[arg(long, default_value_t = 40)]
        size: usize,

        /// Sphere radius in voxels
        #[arg(long, default_value_t = 10.0)]
        radius: f64,

        /// Foreground intensity
        #[arg(long, default_value_t = 200.0)]
        intensity: f32,

        /// Radius of the initial icosphere mesh
        #[arg(long, default_value_t = 4.0)]
        mesh_radius: f64,

        /// Icosphere subdivision level
        #[arg(long, default_value_t = 1)]
        subdivisions: usize,

        /// JSON configuration file; missing fields take their defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the number of outer iterations
        #[arg(short, long)]
        iterations: Option<usize>,
    },

    /// Print the default configuration as JSON
    Defaults,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Phantom {
            size,
            radius,
            intensity,
            mesh_radius,
            subdivisions,
            config,
            iterations,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(iterations) = iterations {
                config = config.with_iterations(iterations);
            }
            run_phantom(config, size, radius, intensity, mesh_radius, subdivisions)?;
        }
        Commands::Defaults => {
            println!("{}", serde_json::to_string_pretty(&SegmentationConfig::default())?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SegmentationConfig> {
    let Some(path) = path else {
        return Ok(SegmentationConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading configuration {}", path.display()))?;
    let config: SegmentationConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing configuration {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Progress bar over outer iterations.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(total: usize) -> Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.iteration as u64);
        self.bar.set_message(format!(
            "object {} voxels, motion {:.4}",
            info.object_voxels, info.motion
        ));
    }

    fn on_complete(&self, info: &ProgressInfo) {
        self.bar.finish_with_message(format!(
            "done in {:.2}s, {} object voxels",
            info.elapsed.as_secs_f64(),
            info.object_voxels
        ));
    }

    fn on_error(&self, error: &str) {
        self.bar.abandon_with_message(format!("failed: {}", error));
    }
}

fn run_phantom(
    config: SegmentationConfig,
    size: usize,
    radius: f64,
    intensity: f32,
    mesh_radius: f64,
    subdivisions: usize,
) -> Result<()> {
    let device = Default::default();
    let c = (size / 2) as f64;
    let center = Point3::new(c, c, c);
    info!("Sphere phantom: {}^3 voxels, radius {}, centre {:?}", size, radius, center);

    let grid = VoxelGrid::from_fn(GridExtent::new(size, size, size), |x, y, z| {
        let r = (Point3::new(x as f64, y as f64, z as f64) - center).norm();
        if r <= radius {
            intensity
        } else {
            0.0
        }
    });
    let image = Image::<Backend>::from_grid(
        &grid,
        Point3::origin(),
        Spacing3::new(1.0, 1.0, 1.0),
        &device,
    );
    let mesh = icosphere(center, mesh_radius, subdivisions)?;
    let config = if config.start_point.is_none() {
        let start_radius = config.start_radius;
        config.with_start(center, start_radius)
    } else {
        config
    };
    let object_label = config.gibbs.object_label;
    let progress = Arc::new(BarProgress::new(config.iterations)?);

    let output = HybridCoordinator::new(config, &image, mesh, None, &device)?
        .with_progress(progress)
        .run()?;

    let expected = 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3);
    let count = output.labels.count_label(object_label) as f64;
    let radii: Vec<f64> = output
        .mesh
        .points()
        .iter()
        .map(|p| (p - center).norm())
        .collect();
    let mean = radii.iter().sum::<f64>() / radii.len().max(1) as f64;
    let (min, max) = radii
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| (lo.min(r), hi.max(r)));

    println!("Iterations:      {}", output.iterations);
    println!(
        "Object voxels:   {} (analytic {:.1}, error {:+.2}%)",
        count,
        expected,
        (count - expected) / expected * 100.0
    );
    println!("Vertex radius:   mean {:.3}, min {:.3}, max {:.3}", mean, min, max);
    Ok(())
}
