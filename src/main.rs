use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use trajex::catalogue::DetectorCatalogue;
use trajex::demonstrator::DemonstratorLayout;
use trajex::extrapolation::VertexExtrapolator;
use trajex::output::{self, TrajectoryVertices};
use trajex::settings::{self, CliArgs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let settings = settings::load_config_with(&args)?;
    tracing::info!("{}", settings);

    let catalogue = match &args.geometry {
        Some(path) => DetectorCatalogue::from_json_file(path)?,
        None => {
            tracing::info!("no geometry given, using the demonstrator module");
            DemonstratorLayout {
                module: settings.module,
                ..Default::default()
            }
            .build()?
        }
    };
    let extrapolator = VertexExtrapolator::new(&catalogue, settings)?;
    let trajectories = output::read_trajectories(&args.trajectories)?;

    let start = Instant::now();
    let pb = ProgressBar::new(trajectories.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
        )?
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    pb.set_message("trajectory".to_string());

    let records: Vec<TrajectoryVertices> = trajectories
        .par_iter()
        .enumerate()
        .map(|(i, trajectory)| {
            let vertices = extrapolator.extrapolate(trajectory);
            pb.inc(1);
            TrajectoryVertices {
                trajectory: i,
                vertices,
            }
        })
        .collect();
    pb.finish_and_clear();

    let total: usize = records.iter().map(|record| record.vertices.len()).sum();
    tracing::info!(
        "{} vertices from {} trajectories in {:.2?}",
        total,
        records.len(),
        start.elapsed()
    );

    output::writeup(args.output.as_deref(), &records)
}
