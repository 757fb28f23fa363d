//! Spatial index cache.
//!
//! **Context**: A trajectory end may face hundreds of calorimeter blocks or
//! source strips. Testing all of them for every end is wasteful: the parent
//! wall (or source frame) is intercepted first, and the impact is then used to
//! guess which few elements can be hit.
//!
//! **How it Works**: Everything is resolved from the catalogue once, in
//! [`SpatialIndex::build`]:
//! - each searchable element is stored with its shape and placement,
//! - each element family gets one [`GridAxis`] per addressed direction, derived
//!   from the world positions of the first two elements along that direction,
//! - calorimeter categories get their inflated and deflated effective shapes.
//!
//! A category missing from the catalogue is left as `None`, which simply makes
//! it unavailable to the search. A catalogue that describes a category but is
//! inconsistent with what the search needs is an [`InitError`].

use std::collections::HashMap;
use std::ops::RangeInclusive;

use itertools::Itertools;
use nalgebra::Point3;

use crate::catalogue::{self, GeometryCatalogue};
use crate::error::InitError;
use crate::geom::{GeomId, GeomIdPattern, Shape, Volume};
use crate::settings::EFFECTIVE_SHAPE_XY_TOLERANCE;
use crate::vertex::Category;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demonstrator::{self, DemonstratorLayout};
    use crate::geom::{BoxShape, CylinderShape, Placement};
    use nalgebra::Vector3;

    fn index() -> (DemonstratorLayout, SpatialIndex) {
        let layout = DemonstratorLayout::default();
        let catalogue = layout.build().unwrap();
        let index = SpatialIndex::build(&catalogue, 0).unwrap();
        (layout, index)
    }

    #[test]
    fn calorimeter_grid_window() {
        let (layout, index) = index();
        let grid = index.calo(1).unwrap();
        assert_eq!(grid.elements.len(), 260);
        let column = &grid.axes[0];
        assert_eq!((column.min, column.max), (0, 19));
        assert!((column.step - demonstrator::CALO_PITCH).abs() < 1e-9);

        let impact = layout.calo_block_centre(1, 5, 3);
        assert_eq!(column.window(&impact), Some(4..=6));
        assert_eq!(grid.axes[1].window(&impact), Some(2..=4));
        assert_eq!(grid.select(&impact).len(), 9);

        // clamped at the border of the wall
        let corner = layout.calo_block_centre(1, 0, 12);
        assert_eq!(column.window(&corner), Some(0..=1));
        assert_eq!(grid.select(&corner).len(), 4);
    }

    #[test]
    fn out_of_range_window_is_empty() {
        let (_, index) = index();
        let grid = index.calo(0).unwrap();
        let far = Point3::new(-430.0, 10_000.0, 0.0);
        assert_eq!(grid.axes[0].window(&far), None);
        assert!(grid.select(&far).is_empty());
    }

    #[test]
    fn effective_shapes_per_category() {
        let (_, index) = index();
        let shapes = index.effective(Category::MainCalorimeter).unwrap();
        let inflated = shapes.inflated.as_box().unwrap();
        let deflated = shapes.deflated.as_box().unwrap();
        assert_eq!(inflated.y, demonstrator::CALO_BLOCK_SIZE + 2.0);
        assert_eq!(deflated.y, demonstrator::CALO_BLOCK_SIZE - 2.0);
        assert!(index.effective(Category::GammaVeto).is_some());
        assert!(index.effective(Category::SourceFoil).is_none());
    }

    #[test]
    fn source_nesting_is_resolved() {
        let (layout, index) = index();
        let source = index.source().unwrap();
        assert!(source.deformed);
        assert_eq!(source.strips.as_ref().unwrap().elements.len(), layout.strips as usize);
        assert_eq!(source.pads[&4].len(), layout.pads as usize);
        assert!(source.pad_bulks(3, 2).is_empty());
        assert_eq!(source.pad_bulks(3, 3).len(), 1);
        let calibration = source.calibration.as_ref().unwrap();
        assert!((calibration.axes[0].step - 3.0 * demonstrator::STRIP_PITCH).abs() < 1e-9);
    }

    #[test]
    fn uneven_calibration_tracks_are_scanned_whole() {
        let layout = DemonstratorLayout {
            calibration_gaps: vec![0, 1, 10],
            ..Default::default()
        };
        let index = SpatialIndex::build(&layout.build().unwrap(), 0).unwrap();
        let calibration = index.source().unwrap().calibration.as_ref().unwrap();
        assert!(calibration.axes.is_empty());
        let far = Point3::new(0.0, layout.gap_y(10), 0.0);
        assert_eq!(calibration.select(&far).len(), calibration.elements.len());
        // evenly spaced families keep their window
        assert_eq!(index.calo(1).unwrap().axes.len(), 2);
    }

    #[test]
    fn missing_categories_are_unavailable() {
        let mut catalogue = crate::catalogue::DetectorCatalogue::new();
        catalogue.add_category(catalogue::CALORIMETER_BLOCK, 7).unwrap();
        let index = SpatialIndex::build(&catalogue, 0).unwrap();
        assert!(index.calo(0).is_none());
        assert!(index.xcalo(1, 0).is_none());
        assert!(index.source().is_none());
    }

    #[test]
    fn cylindrical_block_is_rejected() {
        let mut catalogue = crate::catalogue::DetectorCatalogue::new();
        catalogue.add_category(catalogue::CALORIMETER_SUBMODULE, 1).unwrap();
        catalogue.add_category(catalogue::CALORIMETER_BLOCK, 2).unwrap();
        let at = |y: f64| Placement::from_translation(Vector3::new(500.0, y, 0.0));
        catalogue
            .insert(GeomId::new(1, [0, 1]), Volume::new(BoxShape::new(10.0, 600.0, 10.0), at(0.0)))
            .unwrap();
        for column in 0..2 {
            catalogue
                .insert(
                    GeomId::new(2, [0, 1, column, 0]),
                    Volume::new(CylinderShape::new(100.0, 10.0), at(column as f64 * 250.0)),
                )
                .unwrap();
        }
        let error = SpatialIndex::build(&catalogue, 0).unwrap_err();
        assert!(matches!(error, InitError::NotABox { found: "cylinder", .. }));
    }

    #[test]
    fn degenerate_grid_is_rejected() {
        let mut catalogue = crate::catalogue::DetectorCatalogue::new();
        catalogue.add_category(catalogue::CALORIMETER_SUBMODULE, 1).unwrap();
        catalogue.add_category(catalogue::CALORIMETER_BLOCK, 2).unwrap();
        let at = Placement::from_translation(Vector3::new(500.0, 0.0, 0.0));
        let block = BoxShape::new(10.0, 10.0, 10.0);
        catalogue.insert(GeomId::new(1, [0, 1]), Volume::new(block, at)).unwrap();
        for column in 0..2 {
            catalogue
                .insert(GeomId::new(2, [0, 1, column, 0]), Volume::new(block, at))
                .unwrap();
        }
        let error = SpatialIndex::build(&catalogue, 0).unwrap_err();
        assert!(matches!(error, InitError::DegenerateGrid { axis: "column", .. }));
    }
}

/// A resolved catalogue element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: GeomId,
    pub volume: Volume,
}

/// Regular spacing of one element address component along one world axis.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxis {
    pub name: &'static str,
    /// Position of the component in the element address.
    pub address_index: usize,
    /// World axis (0 = x, 1 = y, 2 = z) along which the component advances.
    pub world_axis: usize,
    /// World coordinate of the element with index `min`.
    pub origin: f64,
    /// Signed world distance between consecutive indices.
    pub step: f64,
    pub min: u32,
    pub max: u32,
}

impl GridAxis {
    /// Nearest index to `impact`, widened by one on each side and clipped to
    /// `[min, max]`. `None` when nothing remains.
    pub fn window(&self, impact: &Point3<f64>) -> Option<RangeInclusive<u32>> {
        if self.min == self.max {
            return Some(self.min..=self.max);
        }
        let offset = ((impact[self.world_axis] - self.origin) / self.step).round();
        let nearest = self.min as f64 + offset;
        let lo = (nearest - 1.0).max(self.min as f64);
        let hi = (nearest + 1.0).min(self.max as f64);
        (lo <= hi).then(|| lo as u32..=hi as u32)
    }

    /// Whether `element` sits where the axis predicts from its address.
    pub fn predicts(&self, element: &Element) -> bool {
        let Some(index) = element.id.get(self.address_index) else {
            return false;
        };
        let expected = self.origin + (index as f64 - self.min as f64) * self.step;
        let actual = element.volume.placement.position()[self.world_axis];
        (actual - expected).abs() <= EFFECTIVE_SHAPE_XY_TOLERANCE
    }
}

/// A parent volume and the elements it holds, addressed on a grid.
/// Without axes every element is a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGrid {
    pub parent: Element,
    pub elements: Vec<Element>,
    pub axes: Vec<GridAxis>,
}

impl BlockGrid {
    /// Elements inside the search window around a parent impact.
    pub fn select(&self, impact: &Point3<f64>) -> Vec<&Element> {
        let Some(windows) = self
            .axes
            .iter()
            .map(|axis| axis.window(impact).map(|w| (axis.address_index, w)))
            .collect::<Option<Vec<_>>>()
        else {
            return Vec::new();
        };
        tracing::debug!("search window {:?} around {:?}", windows, impact);
        self.elements
            .iter()
            .filter(|element| {
                windows.iter().all(|(index, window)| {
                    element
                        .id
                        .get(*index)
                        .is_some_and(|value| window.contains(&value))
                })
            })
            .collect()
    }
}

/// Effective shapes shared by every block of a calorimeter category.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveShapes {
    /// Generous shape used by the fine search.
    pub inflated: Shape,
    /// Strict shape used by the edge classification.
    pub deflated: Shape,
}

/// The source frame and its daughters.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceIndex {
    pub submodule: Element,
    pub strips: Option<BlockGrid>,
    /// Pads per strip number.
    pub pads: HashMap<u32, Vec<Element>>,
    /// Pad-bulks per `(strip, pad)`.
    pub bulks: HashMap<(u32, u32), Vec<Element>>,
    /// Whether the catalogue describes pad-bulks at all.
    pub deformed: bool,
    pub gaps: Option<BlockGrid>,
    pub calibration: Option<BlockGrid>,
}

impl SourceIndex {
    pub fn pad_bulks(&self, strip: u32, pad: u32) -> &[Element] {
        self.bulks
            .get(&(strip, pad))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Per-module search cache. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialIndex {
    pub module: u32,
    calo: [Option<BlockGrid>; 2],
    xcalo: [[Option<BlockGrid>; 2]; 2],
    gveto: [[Option<BlockGrid>; 2]; 2],
    source: Option<SourceIndex>,
    effective: HashMap<Category, EffectiveShapes>,
}

/// Address layout of a block family: which address components form the grid
/// and which world axis each one advances along.
struct GridSpec {
    category: Category,
    axes: &'static [(&'static str, usize, usize)],
}

const CALO_GRID: GridSpec = GridSpec {
    category: Category::MainCalorimeter,
    axes: &[("column", 2, 1), ("row", 3, 2)],
};
const XCALO_GRID: GridSpec = GridSpec {
    category: Category::XCalorimeter,
    axes: &[("column", 3, 0), ("row", 4, 2)],
};
const GVETO_GRID: GridSpec = GridSpec {
    category: Category::GammaVeto,
    axes: &[("column", 3, 1)],
};
const STRIP_GRID: GridSpec = GridSpec {
    category: Category::SourceFoil,
    axes: &[("strip", 1, 1)],
};
const GAP_GRID: GridSpec = GridSpec {
    category: Category::SourceGap,
    axes: &[("gap", 1, 1)],
};
const CALIBRATION_GRID: GridSpec = GridSpec {
    category: Category::CalibrationSource,
    axes: &[("track", 1, 1)],
};

fn resolve_all(catalogue: &dyn GeometryCatalogue, ids: Vec<GeomId>) -> Result<Vec<Element>, InitError> {
    ids.into_iter()
        .map(|id| match catalogue.resolve(&id) {
            Some(volume) => Ok(Element {
                volume: *volume,
                id,
            }),
            None => Err(InitError::UnresolvedElement { id }),
        })
        .collect()
}

/// Lists and resolves the elements of a named category matching `address`.
/// `None` when the category is not described.
fn elements(
    catalogue: &dyn GeometryCatalogue,
    name: &str,
    address: Vec<Option<u32>>,
) -> Result<Option<Vec<Element>>, InitError> {
    let Some(type_id) = catalogue.category_type(name) else {
        tracing::debug!("category '{}' is not described in the catalogue", name);
        return Ok(None);
    };
    let ids = catalogue.list_ids(&GeomIdPattern::new(type_id, address));
    resolve_all(catalogue, ids).map(Some)
}

fn grid_axis(
    spec: &GridSpec,
    elements: &[Element],
    (name, address_index, world_axis): (&'static str, usize, usize),
) -> Result<GridAxis, InitError> {
    let indices = elements.iter().filter_map(|e| e.id.get(address_index));
    let Some((min, max)) = indices.minmax().into_option() else {
        return Err(InitError::MissingElement {
            category: spec.category,
            axis: name,
            address: Vec::new(),
        });
    };

    // anchors share every other grid component with the first element
    let reference = &elements[0].id;
    let anchor = |index: u32| {
        let mut address = reference.address.clone();
        for &(_, other, _) in spec.axes {
            if other != address_index {
                if let Some(value) = address.get_mut(other) {
                    *value = elements
                        .iter()
                        .filter_map(|e| e.id.get(other))
                        .min()
                        .unwrap_or(*value);
                }
            }
        }
        if let Some(value) = address.get_mut(address_index) {
            *value = index;
        }
        elements
            .iter()
            .find(|e| e.id.address == address)
            .ok_or(InitError::MissingElement {
                category: spec.category,
                axis: name,
                address,
            })
    };

    let first = anchor(min)?.volume.placement.position()[world_axis];
    if min == max {
        return Ok(GridAxis {
            name,
            address_index,
            world_axis,
            origin: first,
            step: 0.0,
            min,
            max,
        });
    }
    let second = anchor(min + 1)?.volume.placement.position()[world_axis];
    let step = second - first;
    if step.abs() < f64::EPSILON {
        return Err(InitError::DegenerateGrid {
            category: spec.category,
            axis: name,
        });
    }
    Ok(GridAxis {
        name,
        address_index,
        world_axis,
        origin: first,
        step,
        min,
        max,
    })
}

fn block_grid(spec: &GridSpec, parent: Element, elements: Vec<Element>) -> Result<Option<BlockGrid>, InitError> {
    if elements.is_empty() {
        return Ok(None);
    }
    let axes = spec
        .axes
        .iter()
        .map(|&axis| grid_axis(spec, &elements, axis))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(stray) = elements
        .iter()
        .find(|element| !axes.iter().all(|axis| axis.predicts(element)))
    {
        tracing::warn!(
            "{} elements are not evenly spaced ({} is off its grid position): scanning all {} of them",
            spec.category,
            stray.id,
            elements.len()
        );
        return Ok(Some(BlockGrid {
            parent,
            elements,
            axes: Vec::new(),
        }));
    }
    Ok(Some(BlockGrid {
        parent,
        elements,
        axes,
    }))
}

/// Looks up the single parent volume at `address`, `None` if absent.
fn parent(
    catalogue: &dyn GeometryCatalogue,
    name: &str,
    address: Vec<Option<u32>>,
) -> Result<Option<Element>, InitError> {
    Ok(elements(catalogue, name, address)?.and_then(|found| found.into_iter().next()))
}

/// Wall-bounded block family: parent wall plus its blocks.
fn wall_grid(
    catalogue: &dyn GeometryCatalogue,
    spec: &GridSpec,
    (wall_name, block_name): (&str, &str),
    wall_address: Vec<Option<u32>>,
    block_address: Vec<Option<u32>>,
) -> Result<Option<BlockGrid>, InitError> {
    let Some(blocks) = elements(catalogue, block_name, block_address)? else {
        return Ok(None);
    };
    if blocks.is_empty() {
        return Ok(None);
    }
    let Some(wall) = parent(catalogue, wall_name, wall_address.clone())? else {
        return Err(InitError::MissingElement {
            category: spec.category,
            axis: "parent",
            address: wall_address.into_iter().flatten().collect(),
        });
    };
    block_grid(spec, wall, blocks)
}

fn effective_shapes(category: Category, grids: &[&BlockGrid]) -> Result<Option<EffectiveShapes>, InitError> {
    let mut reference = None;
    for element in grids.iter().flat_map(|grid| grid.elements.iter()) {
        let Some(block) = element.volume.shape.as_box() else {
            return Err(InitError::NotABox {
                id: element.id.clone(),
                found: element.volume.shape.kind(),
            });
        };
        reference.get_or_insert(*block);
    }
    let Some(block) = reference else {
        return Ok(None);
    };
    let deflated = block
        .deflated_xy(EFFECTIVE_SHAPE_XY_TOLERANCE)
        .ok_or_else(|| InitError::InvalidEffectiveShape {
            category,
            reason: format!(
                "a {} x {} mm block cannot lose {} mm on each side",
                block.x, block.y, EFFECTIVE_SHAPE_XY_TOLERANCE
            ),
        })?;
    Ok(Some(EffectiveShapes {
        inflated: Shape::Box(block.inflated_xy(EFFECTIVE_SHAPE_XY_TOLERANCE)),
        deflated: Shape::Box(deflated),
    }))
}

impl SpatialIndex {
    pub fn build(catalogue: &dyn GeometryCatalogue, module: u32) -> Result<Self, InitError> {
        let m = Some(module);
        let mut calo: [Option<BlockGrid>; 2] = Default::default();
        let mut xcalo: [[Option<BlockGrid>; 2]; 2] = Default::default();
        let mut gveto: [[Option<BlockGrid>; 2]; 2] = Default::default();

        for side in 0..2u32 {
            let s = Some(side);
            calo[side as usize] = wall_grid(
                catalogue,
                &CALO_GRID,
                (catalogue::CALORIMETER_SUBMODULE, catalogue::CALORIMETER_BLOCK),
                vec![m, s],
                vec![m, s, None, None],
            )?;
            for wall in 0..2u32 {
                let w = Some(wall);
                xcalo[side as usize][wall as usize] = wall_grid(
                    catalogue,
                    &XCALO_GRID,
                    (catalogue::XCALO_WALL, catalogue::XCALO_BLOCK),
                    vec![m, s, w],
                    vec![m, s, w, None, None],
                )?;
                gveto[side as usize][wall as usize] = wall_grid(
                    catalogue,
                    &GVETO_GRID,
                    (catalogue::GVETO_WALL, catalogue::GVETO_BLOCK),
                    vec![m, s, w],
                    vec![m, s, w, None],
                )?;
            }
        }

        let mut effective = HashMap::new();
        let families = [
            (Category::MainCalorimeter, calo.iter().flatten().collect::<Vec<_>>()),
            (Category::XCalorimeter, xcalo.iter().flatten().flatten().collect()),
            (Category::GammaVeto, gveto.iter().flatten().flatten().collect()),
        ];
        for (category, grids) in families {
            if let Some(shapes) = effective_shapes(category, &grids)? {
                effective.insert(category, shapes);
            }
        }

        let source = Self::build_source(catalogue, module)?;

        let index = SpatialIndex {
            module,
            calo,
            xcalo,
            gveto,
            source,
            effective,
        };
        tracing::info!(
            "spatial index for module {}: {} calorimeter walls, {} xcalo walls, {} gveto walls, source {}",
            module,
            index.calo.iter().flatten().count(),
            index.xcalo.iter().flatten().flatten().count(),
            index.gveto.iter().flatten().flatten().count(),
            if index.source.is_some() { "available" } else { "unavailable" },
        );
        Ok(index)
    }

    fn build_source(catalogue: &dyn GeometryCatalogue, module: u32) -> Result<Option<SourceIndex>, InitError> {
        let m = Some(module);
        let Some(submodule) = parent(catalogue, catalogue::SOURCE_SUBMODULE, vec![m])? else {
            return Ok(None);
        };

        let strips = elements(catalogue, catalogue::SOURCE_STRIP, vec![m, None])?.unwrap_or_default();
        let strips = block_grid(&STRIP_GRID, submodule.clone(), strips)?;

        let mut pads: HashMap<u32, Vec<Element>> = HashMap::new();
        for pad in elements(catalogue, catalogue::SOURCE_PAD, vec![m, None, None])?.unwrap_or_default() {
            if let Some(strip) = pad.id.get(1) {
                pads.entry(strip).or_default().push(pad);
            }
        }

        let bulk_elements = elements(catalogue, catalogue::SOURCE_PAD_BULK, vec![m, None, None, None])?;
        let deformed = bulk_elements.as_ref().is_some_and(|bulks| !bulks.is_empty());
        let mut bulks: HashMap<(u32, u32), Vec<Element>> = HashMap::new();
        for bulk in bulk_elements.unwrap_or_default() {
            if let (Some(strip), Some(pad)) = (bulk.id.get(1), bulk.id.get(2)) {
                bulks.entry((strip, pad)).or_default().push(bulk);
            }
        }

        let gaps = elements(catalogue, catalogue::SOURCE_STRIP_GAP, vec![m, None])?.unwrap_or_default();
        let gaps = block_grid(&GAP_GRID, submodule.clone(), gaps)?;

        let spots = elements(catalogue, catalogue::SOURCE_CALIBRATION_SPOT, vec![m, None, None])?
            .unwrap_or_default();
        let calibration = block_grid(&CALIBRATION_GRID, submodule.clone(), spots)?;

        tracing::debug!(
            "source frame: {} strips, {} pads, {} pad-bulks, deformed = {}",
            strips.as_ref().map_or(0, |grid| grid.elements.len()),
            pads.values().map(Vec::len).sum::<usize>(),
            bulks.values().map(Vec::len).sum::<usize>(),
            deformed
        );

        Ok(Some(SourceIndex {
            submodule,
            strips,
            pads,
            bulks,
            deformed,
            gaps,
            calibration,
        }))
    }

    pub fn calo(&self, side: u32) -> Option<&BlockGrid> {
        self.calo.get(side as usize)?.as_ref()
    }

    pub fn xcalo(&self, side: u32, wall: u32) -> Option<&BlockGrid> {
        self.xcalo.get(side as usize)?.get(wall as usize)?.as_ref()
    }

    pub fn gveto(&self, side: u32, wall: u32) -> Option<&BlockGrid> {
        self.gveto.get(side as usize)?.get(wall as usize)?.as_ref()
    }

    pub fn source(&self) -> Option<&SourceIndex> {
        self.source.as_ref()
    }

    /// Effective shapes of a calorimeter category.
    pub fn effective(&self, category: Category) -> Option<&EffectiveShapes> {
        self.effective.get(&category)
    }
}
