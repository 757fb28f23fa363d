use std::path::Path;
use std::{fs::File, io::BufReader, io::BufWriter};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::extrapolation::TrackerTrajectory;
use crate::vertex::Vertex;


/// Vertices produced for one input trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryVertices {
    /// Position of the trajectory in the input file.
    pub trajectory: usize,
    pub vertices: Vec<Vertex>,
}

/// Reads a JSON array of trajectories.
pub fn read_trajectories(path: &Path) -> Result<Vec<TrackerTrajectory>> {
    let file = File::open(path).with_context(|| format!("cannot open {:?}", path))?;
    let trajectories: Vec<TrackerTrajectory> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("cannot parse trajectories from {:?}", path))?;
    Ok(trajectories)
}

pub fn write_records(writer: &mut impl Write, records: &[TrajectoryVertices]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, records)?;
    writeln!(writer)?;
    Ok(())
}

/// Writes the records to `path`, or to stdout without one.
pub fn writeup(path: Option<&Path>, records: &[TrajectoryVertices]) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("cannot create {:?}", path))?;
            let mut writer = BufWriter::new(file);
            write_records(&mut writer, records)?;
            writer.flush()?;
            tracing::info!("vertices written to {:?}", path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write_records(&mut writer, records)?;
            writer.flush()?;
        }
    }
    Ok(())
}
