use anyhow::Result;
use clap::Parser;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::error::InitError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.intercept.tolerance, 1.0);
        assert_eq!(settings.finder.step, 20.0);
        assert_eq!(settings.max_calo_extrapolation.xy_length, 150.0);
        assert_eq!(settings.max_source_extrapolation.xy_length, 300.0);
        assert_eq!(settings.selection.policy, SelectionPolicy::Best);
    }

    #[test]
    fn default_file_matches_defaults() {
        let settings = load_default_config().unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn tolerance_must_be_below_step() {
        let mut settings = Settings::default();
        settings.intercept.tolerance = 25.0;
        assert!(matches!(
            settings.validate(),
            Err(InitError::InvalidSettings(_))
        ));
    }

    #[test]
    fn environment_overrides_the_file() {
        env::set_var("TRAJEX_FINDER__STEP", "10");
        let settings = load_config_with(&CliArgs::default());
        env::remove_var("TRAJEX_FINDER__STEP");
        let settings = settings.unwrap();
        assert_eq!(settings.finder.step, 10.0);
        assert_eq!(settings.intercept.tolerance, 1.0);
    }

    #[test]
    fn command_line_overrides_the_file() {
        let args = CliArgs {
            step: Some(5.0),
            band: Some(2.0),
            no_first: true,
            ..Default::default()
        };
        let settings = load_config_with(&args).unwrap();
        assert_eq!(settings.finder.step, 5.0);
        assert_eq!(settings.selection.policy, SelectionPolicy::Band(2.0));
        assert!(!settings.ends.first && settings.ends.last);
    }

    #[test]
    fn band_policy_from_toml() {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(
                "[selection]\npolicy = { band = 5.0 }\n[finder]\nstep = 10.0",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.selection.policy, SelectionPolicy::Band(5.0));
        assert_eq!(settings.finder.step, 10.0);
        // untouched sections keep their defaults
        assert_eq!(settings.intercept.tolerance, 1.0);
    }
}

/// Inflation/deflation applied to the XY extent of calorimeter blocks when
/// building their effective shapes. Depth is never changed.
pub const EFFECTIVE_SHAPE_XY_TOLERANCE: f64 = 1.0;
/// Maximum number of bisection steps used to refine a bracketed helix intercept.
pub const HELIX_MAX_REFINEMENTS: usize = 32;
/// Smallest transverse-to-arclength ratio used when converting an XY limit
/// into a helix arclength limit. Protects nearly longitudinal helices.
pub const HELIX_MIN_XY_RATIO: f64 = 1e-3;

/// Runtime configuration for the extrapolation engine.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub module: u32,
    pub intercept: InterceptSettings,
    pub finder: FinderSettings,
    pub max_calo_extrapolation: ExtrapolationLimit,
    pub max_source_extrapolation: ExtrapolationLimit,
    pub ends: EndMask,
    pub selection: SelectionSettings,
    pub categories: CategorySwitches,
    pub tracker: TrackerLayout,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InterceptSettings {
    /// Convergence and acceptance tolerance of every intercept test (mm).
    pub tolerance: f64,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self { tolerance: 1.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FinderSettings {
    /// Helix search step along the arclength (mm).
    pub step: f64,
    /// Use the local tangent line approximation.
    pub line: bool,
    /// Use the helix step search.
    pub helix: bool,
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self {
            step: 20.0,
            line: true,
            helix: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExtrapolationLimit {
    pub xy_length: f64,
}

impl Default for ExtrapolationLimit {
    fn default() -> Self {
        Self { xy_length: 150.0 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EndMask {
    pub first: bool,
    pub last: bool,
}

impl Default for EndMask {
    fn default() -> Self {
        Self {
            first: true,
            last: true,
        }
    }
}

/// How surviving calorimeter candidates are reduced for one (end, category) pair.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Keep only the candidate with the smallest extrapolated distance.
    #[default]
    Best,
    /// Keep every candidate within the given distance (mm) of the best one.
    /// Downstream block association does not expect several calorimeter
    /// vertices per end, so this is opt-in only.
    Band(f64),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SelectionSettings {
    pub policy: SelectionPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CategorySwitches {
    pub calo: bool,
    pub xcalo: bool,
    pub gveto: bool,
    pub source: bool,
    pub calibration: bool,
}

impl Default for CategorySwitches {
    fn default() -> Self {
        Self {
            calo: true,
            xcalo: true,
            gveto: true,
            source: true,
            calibration: true,
        }
    }
}

/// Layout of the tracking chamber, used to decide which categories a cluster
/// can reach.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TrackerLayout {
    pub layers: u32,
    pub rows: u32,
}

impl Default for TrackerLayout {
    fn default() -> Self {
        Self {
            layers: 9,
            rows: 113,
        }
    }
}

impl Settings {
    /// Checks the numeric consistency of the settings.
    pub fn validate(&self) -> Result<(), InitError> {
        let tolerance = self.intercept.tolerance;
        let step = self.finder.step;
        if !(tolerance > 0.0) {
            return Err(InitError::InvalidSettings(format!(
                "intercept tolerance must be positive, got {tolerance}"
            )));
        }
        if !(step > 0.0) {
            return Err(InitError::InvalidSettings(format!(
                "finder step must be positive, got {step}"
            )));
        }
        if tolerance >= step {
            return Err(InitError::InvalidSettings(format!(
                "intercept tolerance ({tolerance}) must be smaller than the finder step ({step})"
            )));
        }
        for (name, limit) in [
            ("calorimeter", &self.max_calo_extrapolation),
            ("source", &self.max_source_extrapolation),
        ] {
            if !(limit.xy_length > 0.0) {
                return Err(InitError::InvalidSettings(format!(
                    "maximum {name} extrapolation length must be positive, got {}",
                    limit.xy_length
                )));
            }
        }
        if let SelectionPolicy::Band(band) = self.selection.policy {
            if !(band >= 0.0) {
                return Err(InitError::InvalidSettings(format!(
                    "selection band must not be negative, got {band}"
                )));
            }
        }
        if self.tracker.layers < 2 || self.tracker.rows < 2 {
            return Err(InitError::InvalidSettings(
                "tracker layout needs at least two layers and two rows".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_source_limit() -> ExtrapolationLimit {
    ExtrapolationLimit { xy_length: 300.0 }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            module: 0,
            intercept: InterceptSettings::default(),
            finder: FinderSettings::default(),
            max_calo_extrapolation: ExtrapolationLimit::default(),
            max_source_extrapolation: default_source_limit(),
            ends: EndMask::default(),
            selection: SelectionSettings::default(),
            categories: CategorySwitches::default(),
            tracker: TrackerLayout::default(),
        }
    }
}

/// Loads `config/default.toml` from the project root, without any override.
pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings: Settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()?
        .try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

/// Loads the configuration layered as: `config/local.toml` if present (else
/// `config/default.toml`), then `TRAJEX_*` environment variables, then the
/// command line.
pub fn load_config() -> Result<Settings> {
    let args = CliArgs::parse();
    load_config_with(&args)
}

/// Same as [`load_config`] with already parsed command-line arguments.
pub fn load_config_with(args: &CliArgs) -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let config_file = if local_config.exists() {
        tracing::info!("using local configuration: {:?}", local_config);
        local_config
    } else {
        tracing::info!("using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let mut config: Settings = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(
            Environment::with_prefix("trajex")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;

    if let Some(tolerance) = args.tolerance {
        config.intercept.tolerance = tolerance;
    }
    if let Some(step) = args.step {
        config.finder.step = step;
    }
    if let Some(xy) = args.calo_xy {
        config.max_calo_extrapolation.xy_length = xy;
    }
    if let Some(xy) = args.source_xy {
        config.max_source_extrapolation.xy_length = xy;
    }
    if args.no_first {
        config.ends.first = false;
    }
    if args.no_last {
        config.ends.last = false;
    }
    if let Some(band) = args.band {
        config.selection.policy = SelectionPolicy::Band(band);
    }

    config.validate()?;

    tracing::debug!("{:#?}", config);

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the TRAJEX_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("TRAJEX_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }
    let exe_path = env::current_exe()?;
    let mut current_dir = exe_path.parent().map(|p| p.to_path_buf());
    while let Some(dir) = current_dir {
        if dir.join("config").is_dir() {
            return Ok(dir);
        }
        current_dir = dir.parent().map(|p| p.to_path_buf());
    }
    Err(anyhow::anyhow!("could not find the project root directory"))
}

#[derive(Parser, Debug, Default)]
#[command(version, about = "trajex - trajectory to detector vertex extrapolation")]
pub struct CliArgs {
    /// JSON file holding the trajectories to extrapolate.
    #[arg(short, long)]
    pub trajectories: PathBuf,

    /// JSON detector catalogue. The synthetic demonstrator module is used when omitted.
    #[arg(short, long)]
    pub geometry: Option<PathBuf>,

    /// Output JSON file for the vertices. Printed to stdout when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Intercept tolerance in mm.
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Helix finder step in mm.
    #[arg(long)]
    pub step: Option<f64>,

    /// Maximum transverse extrapolation length onto calorimeters, in mm.
    #[arg(long)]
    pub calo_xy: Option<f64>,

    /// Maximum transverse extrapolation length onto the source, in mm.
    #[arg(long)]
    pub source_xy: Option<f64>,

    /// Keep every calorimeter vertex within this distance (mm) of the best one.
    #[arg(long)]
    pub band: Option<f64>,

    /// Do not extrapolate from the first end of the trajectories.
    #[arg(long)]
    pub no_first: bool,

    /// Do not extrapolate from the last end of the trajectories.
    #[arg(long)]
    pub no_last: bool,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Module: {}
  - Intercept Tolerance: {:.3} mm
  - Finder Step: {:.3} mm (line: {}, helix: {})
  - Max Calorimeter XY Length: {:.1} mm
  - Max Source XY Length: {:.1} mm
  - Ends: first={} last={}
  - Selection: {:?}
  ",
            self.module,
            self.intercept.tolerance,
            self.finder.step,
            self.finder.line,
            self.finder.helix,
            self.max_calo_extrapolation.xy_length,
            self.max_source_extrapolation.xy_length,
            self.ends.first,
            self.ends.last,
            self.selection.policy,
        )
    }
}
