use std::fs;

use electrify::config::tech_type::TechKind;
use electrify::core::pathfinder::{seek, Target};
use electrify::core::scenario::{run_scenario_with_rasters, NoProgress};
use electrify::data::raster_io::load_ascii_grid;
use electrify::data::settlements_loader::{load_settlements, load_settlements_from_reader};
use electrify::data::synthetic::SyntheticCountry;
use electrify::models::grid_region::Budget;
use electrify::models::raster::{GeoTransform, Raster};
use electrify::utils::csv_export::{write_settlements, CsvExporter};

fn passable(w: f64) -> bool {
    w.is_finite() && w > 0.0
}

#[test]
fn demo_lines_avoid_impassable_cells() {
    let SyntheticCountry { mut store, config, rasters } = SyntheticCountry::generate(4, 150, true).unwrap();
    let outcome = run_scenario_with_rasters(&mut store, &config, rasters, &NoProgress).unwrap();
    assert_eq!(outcome.raster_states.len(), 3);

    let mut new_cells = 0;
    for (_, state) in &outcome.raster_states {
        for lines in state.new_lines.values() {
            for (i, &v) in lines.values().iter().enumerate() {
                if v != 0 {
                    new_cells += 1;
                    assert!(passable(state.cost.at_flat(i)));
                    assert_eq!(state.origins.at_flat(i), 1);
                }
            }
        }
    }
    assert!(new_cells > 0);
}

#[test]
fn seek_respects_allowances_and_budgets() {
    let t = GeoTransform { ncols: 20, nrows: 20, xll: 0.0, yll: 0.0, cell_size: 0.01 };
    let cell_km = t.cell_km();
    let mut origins = Raster::filled(t, 0u8);
    origins.set(10, 0, 1);
    let mut cost = Raster::filled(t, 1.0);
    for row in 0..18 {
        cost.set(row, 5, -1.0);
    }
    let mut mv = Raster::filled(t, f64::INFINITY);

    let targets: Vec<Target> = (0..20)
        .map(|row| Target {
            id: row as u64,
            cell: origins.flat_index(row, 12),
            max_dist: if row % 2 == 0 { 100.0 * cell_km } else { 3.0 * cell_km },
            households: 8.0,
            capacity_kw: 3.0,
            forced: false,
        })
        .collect();
    let mut budget = Budget::new(50.0, 1_000.0);
    let outcome = seek(&mut origins, &cost, &mut mv, &targets, &mut budget);

    assert!(budget.connections_hh >= 0.0);
    assert!(budget.capacity_kw >= 0.0);
    assert_eq!(outcome.connected.len(), 6);
    for (id, distance) in &outcome.connected {
        let target = targets.iter().find(|t| t.id == *id).unwrap();
        assert!(*distance <= target.max_dist);
    }
    for &cell in &outcome.new_cells {
        assert!(passable(cost.at_flat(cell)));
    }
}

#[test]
fn results_directory_round_trips() {
    let SyntheticCountry { mut store, config, rasters } = SyntheticCountry::generate(2, 80, true).unwrap();
    let outcome = run_scenario_with_rasters(&mut store, &config, rasters, &NoProgress).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let exporter = CsvExporter::new(dir.path()).unwrap();
    exporter.export_scenario(&store, &config, &outcome).unwrap();
    let out = exporter.output_dir();

    let back = load_settlements(&out.join("results.csv")).unwrap();
    assert_eq!(back.len(), store.len());
    assert!(back.is_calibrated());
    for (a, b) in store.settlements().iter().zip(back.settlements()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.region, b.region);
        assert_eq!(a.elec_start, b.elec_start);
    }

    let mut reader = csv::Reader::from_path(out.join("results.csv")).unwrap();
    let headers = reader.headers().unwrap().clone();
    let code_col = headers.iter().position(|h| h == "FinalElecCode2030").unwrap();
    for (row, s) in reader.records().zip(store.settlements()) {
        let row = row.unwrap();
        let code: u8 = row[code_col].parse().unwrap();
        assert_eq!(code, s.record(2030).unwrap().final_code);
    }

    let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
    assert_eq!(summary.lines().count(), 1 + outcome.summaries.len() * (TechKind::ALL.len() + 1));

    for (region, state) in &outcome.raster_states {
        let network = load_ascii_grid(&out.join(format!("{}_network.asc", region))).unwrap();
        assert_eq!(network.transform, state.origins.transform);
        for year in state.new_lines.keys() {
            assert!(out.join(format!("{}_new_lines_{}.asc", region, year)).exists());
        }
    }
}

#[test]
fn calibrated_export_skips_recalibration() {
    let SyntheticCountry { mut store, config, .. } = SyntheticCountry::generate(6, 40, false).unwrap();
    store.calibrate(&config.calibration);

    let mut buffer = Vec::new();
    write_settlements(&store, &[], &mut buffer).unwrap();
    let back = load_settlements_from_reader(buffer.as_slice()).unwrap();
    assert!(back.is_calibrated());
    for (a, b) in store.settlements().iter().zip(back.settlements()) {
        assert!((a.pop_start - b.pop_start).abs() <= 1e-9 * a.pop_start.max(1.0));
        assert!((a.elec_pop_calib - b.elec_pop_calib).abs() <= 1e-9 * a.elec_pop_calib.max(1.0));
    }
}
