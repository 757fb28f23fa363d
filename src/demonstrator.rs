//! Synthetic detector module.
//!
//! Builds a complete catalogue for one module with the proportions of the
//! demonstrator: two main calorimeter walls, four X-calorimeter walls, four
//! gamma-veto walls and a source frame in between. It is the default detector
//! of the command-line driver and the fixture of the tests.
//!
//! Frame: `x` crosses the source foil (side 0 at `x < 0`, side 1 at `x > 0`),
//! `y` runs along the foil and `z` is vertical. Blocks are placed so that their
//! local `z` axis is their depth.

use std::collections::BTreeSet;

use nalgebra::{Point3, Vector3};

use crate::catalogue::{self, CatalogueError, DetectorCatalogue};
use crate::geom::{BoxShape, CylinderShape, GeomId, Placement, Volume};
use crate::strategy::side_sign;


pub const TRACKER_SUBMODULE_TYPE: u32 = 1100;
pub const SOURCE_SUBMODULE_TYPE: u32 = 1200;
pub const SOURCE_STRIP_TYPE: u32 = 1202;
pub const SOURCE_PAD_TYPE: u32 = 1203;
pub const SOURCE_PAD_BULK_TYPE: u32 = 1204;
pub const SOURCE_STRIP_GAP_TYPE: u32 = 1205;
pub const SOURCE_CALIBRATION_SPOT_TYPE: u32 = 1210;
pub const CALORIMETER_SUBMODULE_TYPE: u32 = 1300;
pub const CALORIMETER_BLOCK_TYPE: u32 = 1302;
pub const XCALO_WALL_TYPE: u32 = 1230;
pub const XCALO_BLOCK_TYPE: u32 = 1232;
pub const GVETO_WALL_TYPE: u32 = 1250;
pub const GVETO_BLOCK_TYPE: u32 = 1252;

pub const CALO_COLUMNS: u32 = 20;
pub const CALO_ROWS: u32 = 13;
pub const CALO_PITCH: f64 = 257.0;
pub const CALO_BLOCK_SIZE: f64 = 256.0;
pub const CALO_BLOCK_DEPTH: f64 = 194.0;
/// Distance of the calorimeter entrance windows from the foil.
pub const CALO_FRONT_X: f64 = 430.0;

pub const XCALO_COLUMNS: u32 = 2;
pub const XCALO_ROWS: u32 = 16;
pub const XCALO_WIDTH: f64 = 200.0;
pub const XCALO_HEIGHT: f64 = 210.0;
pub const XCALO_COLUMN_PITCH: f64 = 201.0;
pub const XCALO_ROW_PITCH: f64 = 211.0;
pub const XCALO_DEPTH: f64 = 150.0;
pub const XCALO_FIRST_COLUMN_X: f64 = 115.0;
/// Distance of the X-calorimeter entrance windows from the `y = 0` plane.
pub const XCALO_FRONT_Y: f64 = 2600.0;

pub const GVETO_COLUMNS: u32 = 16;
pub const GVETO_PITCH: f64 = 310.0;
pub const GVETO_WIDTH: f64 = 300.0;
pub const GVETO_LENGTH_X: f64 = 405.0;
pub const GVETO_DEPTH: f64 = 20.0;
/// Distance of the gamma-veto entrance windows from the `z = 0` plane.
pub const GVETO_FRONT_Z: f64 = 1740.0;

pub const STRIP_PITCH: f64 = 136.0;
pub const STRIP_WIDTH: f64 = 135.0;
pub const STRIP_THICKNESS: f64 = 0.25;
pub const STRIP_HEIGHT: f64 = 2500.0;
pub const SOURCE_FRAME_THICKNESS: f64 = 10.0;
pub const CALIBRATION_SPOT_RADIUS: f64 = 8.0;
pub const CALIBRATION_SPOT_LENGTH: f64 = 2.0;
pub const CALIBRATION_SPOT_PITCH_Z: f64 = 500.0;

/// Parameters of the synthetic module.
#[derive(Debug, Clone, PartialEq)]
pub struct DemonstratorLayout {
    pub module: u32,
    pub strips: u32,
    pub pads: u32,
    /// Whether pads carry deformed pad-bulk daughters.
    pub deformed: bool,
    /// `(strip, pad)` addresses whose pad-bulk is not described.
    pub missing_pad_bulks: BTreeSet<(u32, u32)>,
    /// Empty space between neighbouring pads of a strip (mm).
    pub pad_spacing: f64,
    /// Gap indices carrying a calibration track.
    pub calibration_gaps: Vec<u32>,
    pub calibration_positions: u32,
}

impl Default for DemonstratorLayout {
    fn default() -> Self {
        Self {
            module: 0,
            strips: 12,
            pads: 8,
            deformed: true,
            missing_pad_bulks: BTreeSet::from([(3, 2), (8, 6)]),
            pad_spacing: 1.0,
            calibration_gaps: vec![2, 5, 8],
            calibration_positions: 5,
        }
    }
}

impl DemonstratorLayout {
    pub fn calo_block_centre(&self, side: u32, column: u32, row: u32) -> Point3<f64> {
        Point3::new(
            side_sign(side) * (CALO_FRONT_X + 0.5 * CALO_BLOCK_DEPTH),
            (column as f64 - 0.5 * (CALO_COLUMNS - 1) as f64) * CALO_PITCH,
            (row as f64 - 0.5 * (CALO_ROWS - 1) as f64) * CALO_PITCH,
        )
    }

    pub fn xcalo_block_centre(&self, side: u32, wall: u32, column: u32, row: u32) -> Point3<f64> {
        Point3::new(
            side_sign(side) * (XCALO_FIRST_COLUMN_X + column as f64 * XCALO_COLUMN_PITCH),
            side_sign(wall) * (XCALO_FRONT_Y + 0.5 * XCALO_DEPTH),
            (row as f64 - 0.5 * (XCALO_ROWS - 1) as f64) * XCALO_ROW_PITCH,
        )
    }

    pub fn gveto_block_centre(&self, side: u32, wall: u32, column: u32) -> Point3<f64> {
        Point3::new(
            side_sign(side) * (XCALO_FIRST_COLUMN_X - 0.5 * XCALO_WIDTH + 0.5 * GVETO_LENGTH_X),
            (column as f64 - 0.5 * (GVETO_COLUMNS - 1) as f64) * GVETO_PITCH,
            side_sign(wall) * (GVETO_FRONT_Z + 0.5 * GVETO_DEPTH),
        )
    }

    pub fn strip_y(&self, strip: u32) -> f64 {
        (strip as f64 - 0.5 * (self.strips - 1) as f64) * STRIP_PITCH
    }

    /// Centre of the gap between strips `gap` and `gap + 1`.
    pub fn gap_y(&self, gap: u32) -> f64 {
        self.strip_y(gap) + 0.5 * STRIP_PITCH
    }

    pub fn pad_height(&self) -> f64 {
        STRIP_HEIGHT / self.pads as f64
    }

    pub fn pad_z(&self, pad: u32) -> f64 {
        (pad as f64 - 0.5 * (self.pads - 1) as f64) * self.pad_height()
    }

    pub fn calibration_z(&self, position: u32) -> f64 {
        (position as f64 - 0.5 * (self.calibration_positions - 1) as f64) * CALIBRATION_SPOT_PITCH_Z
    }

    /// Builds the catalogue of the module.
    pub fn build(&self) -> Result<DetectorCatalogue, CatalogueError> {
        let mut catalogue = DetectorCatalogue::new();
        for (name, type_id) in [
            (catalogue::TRACKER_SUBMODULE, TRACKER_SUBMODULE_TYPE),
            (catalogue::CALORIMETER_SUBMODULE, CALORIMETER_SUBMODULE_TYPE),
            (catalogue::CALORIMETER_BLOCK, CALORIMETER_BLOCK_TYPE),
            (catalogue::XCALO_WALL, XCALO_WALL_TYPE),
            (catalogue::XCALO_BLOCK, XCALO_BLOCK_TYPE),
            (catalogue::GVETO_WALL, GVETO_WALL_TYPE),
            (catalogue::GVETO_BLOCK, GVETO_BLOCK_TYPE),
            (catalogue::SOURCE_SUBMODULE, SOURCE_SUBMODULE_TYPE),
            (catalogue::SOURCE_STRIP, SOURCE_STRIP_TYPE),
            (catalogue::SOURCE_PAD, SOURCE_PAD_TYPE),
            (catalogue::SOURCE_STRIP_GAP, SOURCE_STRIP_GAP_TYPE),
            (catalogue::SOURCE_CALIBRATION_SPOT, SOURCE_CALIBRATION_SPOT_TYPE),
        ] {
            catalogue.add_category(name, type_id)?;
        }
        if self.deformed {
            catalogue.add_category(catalogue::SOURCE_PAD_BULK, SOURCE_PAD_BULK_TYPE)?;
        }

        for side in 0..2 {
            self.add_calorimeter(&mut catalogue, side)?;
            for wall in 0..2 {
                self.add_xcalo(&mut catalogue, side, wall)?;
                self.add_gveto(&mut catalogue, side, wall)?;
            }
        }
        self.add_source(&mut catalogue)?;

        tracing::debug!("demonstrator catalogue holds {} volumes", catalogue.len());
        Ok(catalogue)
    }

    fn add_calorimeter(&self, catalogue: &mut DetectorCatalogue, side: u32) -> Result<(), CatalogueError> {
        let m = self.module;
        let centre_x = side_sign(side) * (CALO_FRONT_X + 0.5 * CALO_BLOCK_DEPTH);
        // local x runs along world z after the rotation
        let wall = BoxShape::new(
            CALO_ROWS as f64 * CALO_PITCH,
            CALO_COLUMNS as f64 * CALO_PITCH,
            CALO_BLOCK_DEPTH,
        );
        catalogue.insert(
            GeomId::new(CALORIMETER_SUBMODULE_TYPE, [m, side]),
            Volume::new(wall, Placement::rotated_y(Vector3::new(centre_x, 0.0, 0.0))),
        )?;
        let block = BoxShape::new(CALO_BLOCK_SIZE, CALO_BLOCK_SIZE, CALO_BLOCK_DEPTH);
        for column in 0..CALO_COLUMNS {
            for row in 0..CALO_ROWS {
                let centre = self.calo_block_centre(side, column, row);
                catalogue.insert(
                    GeomId::new(CALORIMETER_BLOCK_TYPE, [m, side, column, row]),
                    Volume::new(block, Placement::rotated_y(centre.coords)),
                )?;
            }
        }
        Ok(())
    }

    fn add_xcalo(&self, catalogue: &mut DetectorCatalogue, side: u32, wall: u32) -> Result<(), CatalogueError> {
        let m = self.module;
        let sigma = side_sign(side);
        let first = XCALO_FIRST_COLUMN_X - 0.5 * XCALO_WIDTH;
        let last = XCALO_FIRST_COLUMN_X + (XCALO_COLUMNS - 1) as f64 * XCALO_COLUMN_PITCH + 0.5 * XCALO_WIDTH;
        // local y runs along world z after the rotation
        let wall_shape = BoxShape::new(last - first, XCALO_ROWS as f64 * XCALO_ROW_PITCH, XCALO_DEPTH);
        let wall_centre = Vector3::new(
            sigma * 0.5 * (first + last),
            side_sign(wall) * (XCALO_FRONT_Y + 0.5 * XCALO_DEPTH),
            0.0,
        );
        catalogue.insert(
            GeomId::new(XCALO_WALL_TYPE, [m, side, wall]),
            Volume::new(wall_shape, Placement::rotated_x(wall_centre)),
        )?;
        let block = BoxShape::new(XCALO_WIDTH, XCALO_HEIGHT, XCALO_DEPTH);
        for column in 0..XCALO_COLUMNS {
            for row in 0..XCALO_ROWS {
                let centre = self.xcalo_block_centre(side, wall, column, row);
                catalogue.insert(
                    GeomId::new(XCALO_BLOCK_TYPE, [m, side, wall, column, row]),
                    Volume::new(block, Placement::rotated_x(centre.coords)),
                )?;
            }
        }
        Ok(())
    }

    fn add_gveto(&self, catalogue: &mut DetectorCatalogue, side: u32, wall: u32) -> Result<(), CatalogueError> {
        let m = self.module;
        let first = self.gveto_block_centre(side, wall, 0);
        let wall_shape = BoxShape::new(GVETO_LENGTH_X, GVETO_COLUMNS as f64 * GVETO_PITCH, GVETO_DEPTH);
        catalogue.insert(
            GeomId::new(GVETO_WALL_TYPE, [m, side, wall]),
            Volume::new(wall_shape, Placement::from_translation(Vector3::new(first.x, 0.0, first.z))),
        )?;
        let block = BoxShape::new(GVETO_LENGTH_X, GVETO_WIDTH, GVETO_DEPTH);
        for column in 0..GVETO_COLUMNS {
            let centre = self.gveto_block_centre(side, wall, column);
            catalogue.insert(
                GeomId::new(GVETO_BLOCK_TYPE, [m, side, wall, column]),
                Volume::new(block, Placement::from_translation(centre.coords)),
            )?;
        }
        Ok(())
    }

    fn add_source(&self, catalogue: &mut DetectorCatalogue) -> Result<(), CatalogueError> {
        let m = self.module;
        let frame = BoxShape::new(
            SOURCE_FRAME_THICKNESS,
            self.strips as f64 * STRIP_PITCH + 2.0 * CALIBRATION_SPOT_RADIUS,
            STRIP_HEIGHT + 2.0 * CALIBRATION_SPOT_RADIUS,
        );
        catalogue.insert(
            GeomId::new(SOURCE_SUBMODULE_TYPE, [m]),
            Volume::new(frame, Placement::from_translation(Vector3::zeros())),
        )?;

        let strip = BoxShape::new(STRIP_THICKNESS, STRIP_WIDTH, STRIP_HEIGHT);
        let pad_length = self.pad_height() - self.pad_spacing;
        let pad = BoxShape::new(STRIP_THICKNESS, STRIP_WIDTH, pad_length);
        let bulk = BoxShape::new(STRIP_THICKNESS, STRIP_WIDTH - 1.0, pad_length - 1.0);
        for s in 0..self.strips {
            let y = self.strip_y(s);
            catalogue.insert(
                GeomId::new(SOURCE_STRIP_TYPE, [m, s]),
                Volume::new(strip, Placement::from_translation(Vector3::new(0.0, y, 0.0))),
            )?;
            for p in 0..self.pads {
                let at = Placement::from_translation(Vector3::new(0.0, y, self.pad_z(p)));
                catalogue.insert(GeomId::new(SOURCE_PAD_TYPE, [m, s, p]), Volume::new(pad, at))?;
                if self.deformed && !self.missing_pad_bulks.contains(&(s, p)) {
                    catalogue.insert(
                        GeomId::new(SOURCE_PAD_BULK_TYPE, [m, s, p, 0]),
                        Volume::new(bulk, at),
                    )?;
                }
            }
        }

        let gap = BoxShape::new(STRIP_THICKNESS, STRIP_PITCH - STRIP_WIDTH, STRIP_HEIGHT);
        for g in 0..self.strips.saturating_sub(1) {
            catalogue.insert(
                GeomId::new(SOURCE_STRIP_GAP_TYPE, [m, g]),
                Volume::new(gap, Placement::from_translation(Vector3::new(0.0, self.gap_y(g), 0.0))),
            )?;
        }

        let spot = CylinderShape::new(CALIBRATION_SPOT_RADIUS, CALIBRATION_SPOT_LENGTH);
        for (track, &g) in self.calibration_gaps.iter().enumerate() {
            for position in 0..self.calibration_positions {
                let centre = Vector3::new(0.0, self.gap_y(g), self.calibration_z(position));
                catalogue.insert(
                    GeomId::new(SOURCE_CALIBRATION_SPOT_TYPE, [m, track as u32, position]),
                    Volume::new(spot, Placement::rotated_y(centre)),
                )?;
            }
        }
        Ok(())
    }
}
