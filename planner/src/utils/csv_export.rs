use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::analysis::metrics::YearlySummary;
use crate::config::simulation_config::ScenarioConfig;
use crate::config::tech_type::TechKind;
use crate::core::scenario::ScenarioOutcome;
use crate::data::raster_io::{save_ascii_grid, to_f64};
use crate::data::settlements_loader::{COL_ELEC_POP_CALIB, COL_ELEC_START, COL_POP_START};
use crate::data::store::SettlementStore;
use crate::error::PlanResult;
use crate::models::settlement::{Settlement, SettlementYearRecord};
use crate::utils::logging::{self, FileIOType, OperationCategory};

const BASE_COLUMNS: [&str; 23] = [
    "id",
    "X_deg",
    "Y_deg",
    "Pop",
    "GridRegion",
    "IsUrban",
    "GridCellArea",
    "NightLights",
    "DistToTrans",
    "CurrentMVLineDist",
    "CurrentHVLineDist",
    "TravelHours",
    "GHI",
    "WindCF",
    "Hydropower",
    "HydropowerDist",
    "GridPenalty",
    "ResidentialDemandTierCustom",
    "HealthDemand",
    "EducationDemand",
    "AgriDemand",
    "CommercialDemand",
    "HeavyIndustryDemand",
];

const YEAR_COLUMNS: [&str; 14] = [
    "Pop",
    "NewConnections",
    "EnergyPerSettlement",
    "MinGridDist",
    "GridElecOrder",
    "PreScreened",
    "Forced",
    "MinimumOffgrid",
    "MinimumOffgridLCOE",
    "MinimumOverall",
    "MinimumOverallLCOE",
    "FinalElecCode",
    "NewCapacity",
    "InvestmentCost",
];

/// Non-finite values are written as empty cells, which read back as absent.
fn num(v: f64) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        String::new()
    }
}

fn flag(v: bool) -> String {
    u8::from(v).to_string()
}

fn tech_name(t: Option<TechKind>) -> String {
    t.map(|t| t.label().to_string()).unwrap_or_default()
}

fn header(years: &[u32]) -> Vec<String> {
    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend([COL_POP_START, COL_ELEC_START, COL_ELEC_POP_CALIB].iter().map(|c| c.to_string()));
    for year in years {
        columns.extend(YEAR_COLUMNS.iter().map(|c| format!("{}{}", c, year)));
        columns.extend(TechKind::ALL.iter().map(|t| format!("{}{}", t.label(), year)));
    }
    columns
}

fn base_fields(s: &Settlement) -> Vec<String> {
    let p = &s.productive;
    vec![
        s.id.to_string(),
        num(s.coordinate.x),
        num(s.coordinate.y),
        num(s.pop),
        s.region.clone(),
        flag(s.is_urban),
        num(s.cell_area_km2),
        num(s.night_lights),
        num(s.dist_to_transformer_km),
        num(s.mv_line_dist_km),
        num(s.hv_line_dist_km),
        num(s.travel_hours),
        num(s.ghi),
        num(s.wind_cf),
        num(s.hydro_potential_kw),
        num(s.hydro_dist_km),
        num(s.grid_penalty),
        s.custom_residential_kwh.map(num).unwrap_or_default(),
        num(p.health),
        num(p.education),
        num(p.agriculture),
        num(p.commercial),
        num(p.heavy_industry),
        num(s.pop_start),
        flag(s.elec_start),
        num(s.elec_pop_calib),
    ]
}

fn year_fields(record: Option<&SettlementYearRecord>) -> Vec<String> {
    let Some(r) = record else {
        return vec![String::new(); YEAR_COLUMNS.len() + TechKind::ALL.len()];
    };
    let mut fields = vec![
        num(r.pop),
        num(r.new_connections),
        num(r.demand_kwh),
        num(r.min_grid_dist),
        r.elec_order.to_string(),
        flag(r.pre_screened),
        flag(r.forced),
        tech_name(r.min_off_grid),
        num(r.min_off_grid_lcoe),
        tech_name(r.minimum_overall),
        num(r.minimum_overall_lcoe),
        r.final_code.to_string(),
        num(r.new_capacity_kw),
        num(r.investment),
    ];
    fields.extend(
        TechKind::ALL
            .iter()
            .map(|t| r.lcoe.get(t).map(|l| num(l.lcoe)).unwrap_or_default()),
    );
    fields
}

/// Writes the settlement table with one block of suffixed columns per year.
pub fn write_settlements<W: Write>(store: &SettlementStore, years: &[u32], writer: W) -> PlanResult<()> {
    let mut w = Writer::from_writer(writer);
    w.write_record(header(years))?;
    for s in store.settlements() {
        let mut fields = base_fields(s);
        for &year in years {
            fields.extend(year_fields(s.record(year)));
        }
        w.write_record(&fields)?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    #[serde(rename = "Year")]
    year: u32,
    #[serde(rename = "Technology")]
    technology: &'a str,
    #[serde(rename = "Settlements")]
    settlements: usize,
    #[serde(rename = "Population")]
    population: f64,
    #[serde(rename = "NewConnections")]
    new_connections: f64,
    #[serde(rename = "NewCapacityKW")]
    new_capacity_kw: f64,
    #[serde(rename = "InvestmentUSD")]
    investment: f64,
}

/// One row per year and technology, plus a yearly total.
pub fn write_summary<W: Write>(summaries: &[YearlySummary], writer: W) -> PlanResult<()> {
    let mut w = Writer::from_writer(writer);
    for summary in summaries {
        for kind in TechKind::ALL {
            let t = summary.tech(kind);
            w.serialize(SummaryRow {
                year: summary.year,
                technology: kind.label(),
                settlements: t.settlements,
                population: t.population,
                new_connections: t.new_connections,
                new_capacity_kw: t.new_capacity_kw,
                investment: t.investment,
            })?;
        }
        w.serialize(SummaryRow {
            year: summary.year,
            technology: "Total",
            settlements: summary.per_tech.values().map(|t| t.settlements).sum(),
            population: summary.electrified_population,
            new_connections: summary.per_tech.values().map(|t| t.new_connections).sum(),
            new_capacity_kw: summary.total_new_capacity_kw(),
            investment: summary.total_investment(),
        })?;
    }
    w.flush()?;
    Ok(())
}

/// Writes run results into a fresh timestamped directory.
pub struct CsvExporter {
    output_dir: PathBuf,
    timestamp: String,
}

impl CsvExporter {
    pub fn new(output_dir: impl AsRef<Path>) -> PlanResult<Self> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let full_path = output_dir.as_ref().join(&timestamp);
        fs::create_dir_all(&full_path)?;
        Ok(Self {
            output_dir: full_path,
            timestamp,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// The calibrated table, readable again by `run` without recalibrating.
    pub fn export_calibrated(&self, store: &SettlementStore) -> PlanResult<PathBuf> {
        let _timing = logging::start_timing(
            "export_calibrated",
            OperationCategory::FileIO { subcategory: FileIOType::ResultsSave },
        );
        let path = self.output_dir.join("calibrated_settlements.csv");
        write_settlements(store, &[], File::create(&path)?)?;
        info!("Calibrated settlements written to {}", path.display());
        Ok(path)
    }

    pub fn export_scenario(
        &self,
        store: &SettlementStore,
        config: &ScenarioConfig,
        outcome: &ScenarioOutcome,
    ) -> PlanResult<()> {
        let _timing = logging::start_timing(
            "export_scenario",
            OperationCategory::FileIO { subcategory: FileIOType::ResultsSave },
        );
        let years: Vec<u32> = outcome.summaries.iter().map(|s| s.year).collect();
        write_settlements(store, &years, File::create(self.output_dir.join("results.csv"))?)?;
        write_summary(&outcome.summaries, File::create(self.output_dir.join("summary.csv"))?)?;
        config.save(&self.output_dir.join("scenario.json"))?;
        if let Some(report) = &outcome.calibration {
            fs::write(
                self.output_dir.join("calibration.json"),
                serde_json::to_string_pretty(report)?,
            )?;
        }

        for (region, state) in &outcome.raster_states {
            save_ascii_grid(&to_f64(&state.origins), &self.output_dir.join(format!("{}_network.asc", region)))?;
            save_ascii_grid(&state.mv_dist, &self.output_dir.join(format!("{}_mv_dist.asc", region)))?;
            for (year, lines) in &state.new_lines {
                save_ascii_grid(
                    &to_f64(lines),
                    &self.output_dir.join(format!("{}_new_lines_{}.asc", region, year)),
                )?;
            }
        }

        info!("Results written to {}", self.output_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::poi::Coordinate;
    use crate::data::settlements_loader::load_settlements_from_reader;

    #[test]
    fn header_suffixes_every_year() {
        let columns = header(&[2025, 2030]);
        assert!(columns.contains(&"FinalElecCode2030".to_string()));
        assert!(columns.contains(&"SA_PV2025".to_string()));
        assert_eq!(
            columns.len(),
            BASE_COLUMNS.len() + 3 + 2 * (YEAR_COLUMNS.len() + TechKind::ALL.len())
        );
    }

    #[test]
    fn calibrated_table_reads_back() {
        let mut s = Settlement::new(4, Coordinate::new(1.5, -2.0), 120.0, "Sud");
        s.pop_start = 150.0;
        s.elec_start = true;
        s.elec_pop_calib = 90.0;
        s.mv_line_dist_km = 3.5;
        let store = SettlementStore::new(vec![s]).unwrap();

        let mut buffer = Vec::new();
        write_settlements(&store, &[], &mut buffer).unwrap();
        let back = load_settlements_from_reader(buffer.as_slice()).unwrap();
        assert!(back.is_calibrated());
        let b = back.get(0);
        assert_eq!((b.id, b.region.as_str()), (4, "Sud"));
        assert_eq!(b.pop_start, 150.0);
        assert!(b.elec_start);
        assert_eq!(b.elec_pop_calib, 90.0);
        assert_eq!(b.mv_line_dist_km, 3.5);
        assert!(b.hv_line_dist_km.is_infinite());
    }
}
