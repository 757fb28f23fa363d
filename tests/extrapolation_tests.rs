use std::f64::consts::PI;

use nalgebra::Point3;
use rand::Rng;
use trajex::curve::{Helix3, Line3, Trajectory};
use trajex::demonstrator::{self, DemonstratorLayout};
use trajex::error::TrajectoryError;
use trajex::extrapolation::{SearchStats, TrackerCluster, TrackerHit, TrackerTrajectory, VertexExtrapolator};
use trajex::geom::GeomId;
use trajex::settings::{self, SelectionPolicy, Settings};
use trajex::vertex::{Category, End, Mode, Vertex};

fn engine_with(layout: &DemonstratorLayout, settings: Settings) -> VertexExtrapolator {
    let catalogue = layout.build().unwrap();
    VertexExtrapolator::new(&catalogue, settings).unwrap()
}

fn engine(layout: &DemonstratorLayout) -> VertexExtrapolator {
    engine_with(layout, settings::load_default_config().unwrap())
}

fn cluster(side: u32, cells: &[(u32, u32)]) -> Option<TrackerCluster> {
    Some(TrackerCluster {
        hits: cells
            .iter()
            .map(|&(layer, row)| TrackerHit { side, layer, row })
            .collect(),
    })
}

fn line(side: u32, first: [f64; 3], last: [f64; 3], cells: &[(u32, u32)]) -> TrackerTrajectory {
    TrackerTrajectory {
        id: Some(GeomId::new(demonstrator::TRACKER_SUBMODULE_TYPE, [0, side])),
        trajectory: Trajectory::Line(Line3::new(Point3::from(first), Point3::from(last)).unwrap()),
        cluster: cluster(side, cells),
    }
}

/// Straight track in front of calorimeter block (1, 5, 3).
fn towards_block(layout: &DemonstratorLayout) -> TrackerTrajectory {
    let centre = layout.calo_block_centre(1, 5, 3);
    line(1, [50.0, centre.y, centre.z], [400.0, centre.y, centre.z], &[(8, 40)])
}

/// Helix leaving the tracker towards the right X-calorimeter wall of side 1.
fn towards_xcalo() -> TrackerTrajectory {
    let helix = Helix3::new(Point3::new(1100.0, 2500.0, 50.0), 1000.0, 100.0, PI + 0.5, PI).unwrap();
    TrackerTrajectory {
        id: Some(GeomId::new(demonstrator::TRACKER_SUBMODULE_TYPE, [0, 1])),
        trajectory: Trajectory::Helix(helix),
        cluster: cluster(1, &[(4, 112)]),
    }
}

fn of_category(vertices: &[Vertex], category: Category) -> Vec<&Vertex> {
    vertices.iter().filter(|v| v.category == category).collect()
}

#[test]
fn straight_track_onto_a_calorimeter_block() {
    let layout = DemonstratorLayout::default();
    let engine = engine(&layout);
    let vertices = engine.try_extrapolate(&towards_block(&layout)).unwrap();

    assert_eq!(vertices.len(), 1, "{vertices:#?}");
    let vertex = &vertices[0];
    assert_eq!(vertex.category, Category::MainCalorimeter);
    assert_eq!(vertex.id, GeomId::new(demonstrator::CALORIMETER_BLOCK_TYPE, [0, 1, 5, 3]));
    assert_eq!(vertex.from, End::Last);
    assert_eq!(vertex.extrapolation, Mode::Line);
    assert!(vertex.best);
    assert!(!vertex.edge);
    assert!((vertex.position.x - demonstrator::CALO_FRONT_X).abs() < 1e-6);
    assert!((vertex.distance - 30.0).abs() < 1e-6);
    assert!(vertex.distance_xy < engine.settings().max_calo_extrapolation.xy_length);
    assert_eq!(vertex.error, [engine.settings().intercept.tolerance; 3]);
}

#[test]
fn boundary_between_blocks_is_an_edge() {
    let layout = DemonstratorLayout::default();
    let engine = engine(&layout);
    let a = layout.calo_block_centre(1, 5, 3);
    let b = layout.calo_block_centre(1, 6, 3);
    let y = 0.5 * (a.y + b.y);
    let trajectory = line(1, [50.0, y, a.z], [400.0, y, a.z], &[(8, 40)]);

    let vertices = engine.extrapolate(&trajectory);
    let calo = of_category(&vertices, Category::MainCalorimeter);
    assert_eq!(calo.len(), 1);
    assert!(calo[0].best);
    assert!(calo[0].edge);
    // equal distances: the first block built wins
    assert_eq!(calo[0].id.get(2), Some(5));
}

#[test]
fn band_policy_keeps_both_blocks() {
    let layout = DemonstratorLayout::default();
    let mut settings = Settings::default();
    settings.selection.policy = SelectionPolicy::Band(5.0);
    let engine = engine_with(&layout, settings);
    let a = layout.calo_block_centre(1, 5, 3);
    let b = layout.calo_block_centre(1, 6, 3);
    let y = 0.5 * (a.y + b.y);
    let trajectory = line(1, [50.0, y, a.z], [400.0, y, a.z], &[(8, 40)]);

    let vertices = engine.extrapolate(&trajectory);
    let calo = of_category(&vertices, Category::MainCalorimeter);
    assert_eq!(calo.len(), 2);
    assert_eq!(calo.iter().filter(|v| v.best).count(), 1);
    assert!(calo.iter().all(|v| !v.edge || v.best));
}

#[test]
fn source_frame_missed_by_the_coarse_phase() {
    let layout = DemonstratorLayout::default();
    let mut settings = settings::load_default_config().unwrap();
    settings.categories.gveto = false;
    let engine = engine_with(&layout, settings);
    // the first end climbs steeply and passes above the frame
    let trajectory = line(0, [-50.0, 0.0, 1000.0], [-60.0, 0.0, 900.0], &[(0, 50), (1, 50)]);

    let mut stats = SearchStats::default();
    let candidates = engine.candidates(&trajectory, &mut stats).unwrap();
    assert!(candidates.is_empty());
    assert_eq!(stats.elements_tested, 0);
    // one frame intercept per end, shared by foil, gaps and calibration
    assert_eq!(stats.coarse_misses, 1);
    // the last end moves away from the foil
    assert_eq!(stats.pruned, 1);
}

#[test]
fn track_between_strips_hits_the_gap_volume() {
    let layout = DemonstratorLayout::default();
    let engine = engine(&layout);
    let (y, z) = (layout.gap_y(0), layout.pad_z(1));
    let trajectory = line(1, [30.0, y, z], [400.0, y, z], &[(0, 60)]);

    let vertices = engine.extrapolate(&trajectory);
    let gaps: Vec<_> = vertices
        .iter()
        .filter(|v| v.id.type_id == demonstrator::SOURCE_STRIP_GAP_TYPE)
        .collect();
    assert_eq!(gaps.len(), 1, "{vertices:#?}");
    assert_eq!(gaps[0].category, Category::SourceGap);
    assert_eq!(gaps[0].id, GeomId::new(demonstrator::SOURCE_STRIP_GAP_TYPE, [0, 0]));
    assert_eq!(gaps[0].from, End::First);
}

#[test]
fn strip_crossed_between_its_pads_is_a_gap() {
    let layout = DemonstratorLayout {
        deformed: false,
        pad_spacing: 10.0,
        ..Default::default()
    };
    let engine = engine(&layout);
    let y = layout.strip_y(3);
    let z = layout.pad_z(2) + 0.5 * layout.pad_height();
    let trajectory = line(1, [30.0, y, z], [400.0, y, z], &[(0, 60)]);

    let vertices = engine.try_extrapolate(&trajectory).unwrap();
    assert_eq!(vertices.len(), 1, "{vertices:#?}");
    assert_eq!(vertices[0].category, Category::SourceGap);
    assert_eq!(vertices[0].id, GeomId::new(demonstrator::SOURCE_STRIP_TYPE, [0, 3]));
}

#[test]
fn uneven_calibration_tracks_are_all_found() {
    let layout = DemonstratorLayout {
        calibration_gaps: vec![0, 1, 10],
        ..Default::default()
    };
    let engine = engine(&layout);
    for (track, &gap) in layout.calibration_gaps.iter().enumerate() {
        let (y, z) = (layout.gap_y(gap), layout.calibration_z(1));
        let trajectory = line(1, [30.0, y, z], [400.0, y, z], &[(0, 60)]);
        let vertices = engine.extrapolate(&trajectory);
        let spots = of_category(&vertices, Category::CalibrationSource);
        assert_eq!(spots.len(), 1, "track {track}: {vertices:#?}");
        assert_eq!(
            spots[0].id,
            GeomId::new(demonstrator::SOURCE_CALIBRATION_SPOT_TYPE, [0, track as u32, 1])
        );
    }
}

#[test]
fn deformed_pad_without_bulk_is_a_gap() {
    let layout = DemonstratorLayout::default();
    assert!(layout.missing_pad_bulks.contains(&(3, 2)));
    let engine = engine(&layout);
    let (y, z) = (layout.strip_y(3), layout.pad_z(2));
    let trajectory = line(0, [-30.0, y, z], [-400.0, y, z], &[(0, 60)]);

    let vertices = engine.try_extrapolate(&trajectory).unwrap();
    assert_eq!(vertices.len(), 1, "{vertices:#?}");
    assert_eq!(vertices[0].category, Category::SourceGap);
    assert_eq!(vertices[0].id, GeomId::new(demonstrator::SOURCE_PAD_TYPE, [0, 3, 2]));
    assert_eq!(vertices[0].from, End::First);
    assert!((vertices[0].position.x + 0.5 * demonstrator::STRIP_THICKNESS).abs() < 1e-6);
}

#[test]
fn deformed_pad_with_bulk_is_foil() {
    let layout = DemonstratorLayout::default();
    let engine = engine(&layout);
    let (y, z) = (layout.strip_y(4), layout.pad_z(4));
    let trajectory = line(1, [30.0, y, z], [400.0, y, z], &[(0, 60)]);

    let vertices = engine.extrapolate(&trajectory);
    assert_eq!(vertices.len(), 1, "{vertices:#?}");
    assert_eq!(vertices[0].category, Category::SourceFoil);
    assert_eq!(vertices[0].id, GeomId::new(demonstrator::SOURCE_PAD_BULK_TYPE, [0, 4, 4, 0]));
}

#[test]
fn flat_pad_is_foil() {
    let layout = DemonstratorLayout {
        deformed: false,
        ..Default::default()
    };
    let engine = engine(&layout);
    let (y, z) = (layout.strip_y(3), layout.pad_z(2));
    let trajectory = line(1, [30.0, y, z], [400.0, y, z], &[(1, 60)]);

    let vertices = engine.extrapolate(&trajectory);
    assert_eq!(vertices.len(), 1, "{vertices:#?}");
    assert_eq!(vertices[0].category, Category::SourceFoil);
    assert_eq!(vertices[0].id, GeomId::new(demonstrator::SOURCE_PAD_TYPE, [0, 3, 2]));
}

#[test]
fn calibration_spot_is_found() {
    let layout = DemonstratorLayout::default();
    let engine = engine(&layout);
    let (y, z) = (layout.gap_y(layout.calibration_gaps[0]), layout.calibration_z(1));
    let trajectory = line(1, [30.0, y, z], [400.0, y, z], &[(0, 60)]);

    let vertices = engine.extrapolate(&trajectory);
    let spots = of_category(&vertices, Category::CalibrationSource);
    assert_eq!(spots.len(), 1, "{vertices:#?}");
    assert_eq!(
        spots[0].id,
        GeomId::new(demonstrator::SOURCE_CALIBRATION_SPOT_TYPE, [0, 0, 1])
    );
    assert!((spots[0].distance - (30.0 - 0.5 * demonstrator::CALIBRATION_SPOT_LENGTH)).abs() < 1e-6);
}

#[test]
fn disabled_ends_give_nothing() {
    let layout = DemonstratorLayout::default();
    let mut settings = Settings::default();
    settings.ends.first = false;
    settings.ends.last = false;
    let engine = engine_with(&layout, settings);
    for trajectory in [towards_block(&layout), towards_xcalo()] {
        assert!(engine.try_extrapolate(&trajectory).unwrap().is_empty());
    }
}

#[test]
fn helix_onto_the_xcalorimeter() {
    let engine = engine(&DemonstratorLayout::default());
    let mut stats = SearchStats::default();
    let candidates = engine.candidates(&towards_xcalo(), &mut stats).unwrap();

    assert_eq!(candidates.len(), 1, "{candidates:#?}");
    let vertex = &candidates[0];
    assert_eq!(vertex.category, Category::XCalorimeter);
    assert_eq!(vertex.mode, Mode::Helix);
    assert_eq!(vertex.end, End::Last);
    assert_eq!(vertex.id, GeomId::new(demonstrator::XCALO_BLOCK_TYPE, [0, 1, 1, 0, 8]));
    assert!(vertex.best);
    assert!((vertex.impact.y - demonstrator::XCALO_FRONT_Y).abs() < 1.0);
    // about 100 mm of transverse travel: asin(0.1) on a 1 m radius
    assert!((vertex.distance_xy - 1000.0 * 0.1f64.asin()).abs() < 2.0);
    assert!(stats.helix_searches > 0);
    assert!(stats.pruned >= 1);
}

#[test]
fn repeated_calls_are_identical() {
    let layout = DemonstratorLayout::default();
    let engine = engine(&layout);
    for trajectory in [towards_block(&layout), towards_xcalo()] {
        let mut first_stats = SearchStats::default();
        let mut second_stats = SearchStats::default();
        let first = engine.candidates(&trajectory, &mut first_stats).unwrap();
        let second = engine.candidates(&trajectory, &mut second_stats).unwrap();
        assert_eq!(first, second);
        assert_eq!(first_stats, second_stats);
    }
}

#[test]
fn calorimeter_behind_the_end_is_never_searched() {
    let layout = DemonstratorLayout::default();
    let engine = engine(&layout);
    let mut rng = rand::rng();
    for _ in 0..200 {
        let side = rng.random_range(0..2u32);
        let sigma = if side == 0 { -1.0 } else { 1.0 };
        // last end and direction both in the half-space opposite to the wall
        let last = [
            -sigma * rng.random_range(5.0..420.0),
            rng.random_range(-2500.0..2500.0),
            rng.random_range(-1600.0..1600.0),
        ];
        let back = [
            sigma * rng.random_range(1.0..200.0),
            rng.random_range(-200.0..200.0),
            rng.random_range(-200.0..200.0),
        ];
        let first = [last[0] + back[0], last[1] + back[1], last[2] + back[2]];
        let trajectory = line(side, first, last, &[(8, 40)]);
        let mut stats = SearchStats::default();
        let candidates = engine.candidates(&trajectory, &mut stats).unwrap();
        assert!(candidates
            .iter()
            .all(|c| !(c.category == Category::MainCalorimeter && c.end == End::Last)));
        assert!(stats.pruned >= 1);
    }
}

#[test]
fn malformed_trajectories_produce_no_vertex() {
    let layout = DemonstratorLayout::default();
    let engine = engine(&layout);
    let good = towards_block(&layout);

    let mut anonymous = good.clone();
    anonymous.id = None;
    assert_eq!(engine.try_extrapolate(&anonymous), Err(TrajectoryError::MissingGeomId));

    let mut sideless = good.clone();
    sideless.id = Some(GeomId::new(demonstrator::TRACKER_SUBMODULE_TYPE, [0]));
    assert!(matches!(
        engine.try_extrapolate(&sideless),
        Err(TrajectoryError::MissingAddress { .. })
    ));

    let mut foreign = good.clone();
    foreign.id = Some(GeomId::new(demonstrator::TRACKER_SUBMODULE_TYPE, [3, 1]));
    assert_eq!(
        engine.try_extrapolate(&foreign),
        Err(TrajectoryError::ForeignModule { expected: 0, found: 3 })
    );

    let batch = [good.clone(), anonymous, towards_xcalo(), foreign];
    let results = engine.extrapolate_all(&batch);
    assert_eq!(results.len(), 4);
    assert_eq!(results[0], engine.extrapolate(&good));
    assert!(results[1].is_empty());
    assert_eq!(results[2].len(), 1);
    assert!(results[3].is_empty());
}

#[test]
fn trajectories_from_json() {
    let json = r#"[
        {
            "id": { "type_id": 1100, "address": [0, 1] },
            "trajectory": { "pattern": "line", "first": [50.0, 0.0, 0.0], "last": [400.0, 0.0, 0.0] }
        }
    ]"#;
    let trajectories: Vec<TrackerTrajectory> = serde_json::from_str(json).unwrap();
    assert!(trajectories[0].cluster.is_none());
    let engine = engine(&DemonstratorLayout::default());
    // without a cluster every category is searched: the first end reaches the foil
    let vertices = engine.extrapolate(&trajectories[0]);
    assert!(vertices.iter().any(|v| v.category == Category::MainCalorimeter && v.from == End::Last));
    assert!(vertices.iter().any(|v| v.from == End::First && v.category.is_source()));
}
