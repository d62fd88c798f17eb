use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info, warn};

use crate::config::const_funcs::{calc_grid_penalty, calc_wind_capacity_factor};
use crate::data::poi::Coordinate;
use crate::data::store::SettlementStore;
use crate::error::{PlanError, PlanResult};
use crate::models::settlement::{ProductiveDemand, Settlement};

pub const REQUIRED_COLUMNS: [&str; 5] = ["id", "X_deg", "Y_deg", "Pop", "GridRegion"];

// Written by the calibration export and picked up again by `run`
pub const COL_POP_START: &str = "PopStartYear";
pub const COL_ELEC_START: &str = "ElecStart";
pub const COL_ELEC_POP_CALIB: &str = "ElecPopCalib";

struct Row<'a> {
    record: &'a StringRecord,
    columns: &'a HashMap<String, usize>,
    row: usize,
}

impl<'a> Row<'a> {
    fn raw(&self, column: &str) -> Option<&'a str> {
        self.columns
            .get(column)
            .and_then(|&i| self.record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn invalid(&self, column: &str, value: &str) -> PlanError {
        PlanError::InvalidValue {
            column: column.to_string(),
            row: self.row,
            value: value.to_string(),
        }
    }

    fn optional_f64(&self, column: &str) -> PlanResult<Option<f64>> {
        match self.raw(column) {
            None => Ok(None),
            Some(v) => v.parse::<f64>().map(Some).map_err(|_| self.invalid(column, v)),
        }
    }

    fn required_f64(&self, column: &str) -> PlanResult<f64> {
        self.optional_f64(column)?.ok_or_else(|| self.invalid(column, ""))
    }

    fn f64_or(&self, column: &str, default: f64) -> PlanResult<f64> {
        Ok(self.optional_f64(column)?.unwrap_or(default))
    }

    fn flag(&self, column: &str) -> PlanResult<bool> {
        match self.raw(column) {
            None => Ok(false),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => v.parse::<f64>().map(|x| x != 0.0).map_err(|_| self.invalid(column, v)),
        }
    }

    fn id(&self) -> PlanResult<u64> {
        let v = self.raw("id").ok_or_else(|| self.invalid("id", ""))?;
        if let Ok(id) = v.parse::<u64>() {
            return Ok(id);
        }
        // Spreadsheet exports write integer ids as floats
        match v.parse::<f64>() {
            Ok(x) if x >= 0.0 && x.fract() == 0.0 => Ok(x as u64),
            _ => Err(self.invalid("id", v)),
        }
    }
}

fn parse_settlement(row: &Row) -> PlanResult<Settlement> {
    let region = row.raw("GridRegion").ok_or_else(|| row.invalid("GridRegion", ""))?;
    let pop = row.required_f64("Pop")?;
    if pop < 0.0 || !pop.is_finite() {
        return Err(row.invalid("Pop", &pop.to_string()));
    }

    let mut s = Settlement::new(
        row.id()?,
        Coordinate::new(row.required_f64("X_deg")?, row.required_f64("Y_deg")?),
        pop,
        region,
    );

    s.is_urban = row.flag("IsUrban")?;
    s.cell_area_km2 = row.f64_or("GridCellArea", 1.0)?;
    s.night_lights = row.f64_or("NightLights", 0.0)?;
    s.dist_to_transformer_km = row.f64_or("DistToTrans", f64::INFINITY)?;
    s.mv_line_dist_km = row.f64_or("CurrentMVLineDist", f64::INFINITY)?;
    s.hv_line_dist_km = row.f64_or("CurrentHVLineDist", f64::INFINITY)?;
    s.travel_hours = row.f64_or("TravelHours", 0.0)?;
    s.ghi = row.f64_or("GHI", 0.0)?;
    s.wind_cf = match row.optional_f64("WindCF")? {
        Some(cf) => cf,
        None => row.optional_f64("WindVel")?.map(calc_wind_capacity_factor).unwrap_or(0.0),
    };
    s.hydro_potential_kw = row.f64_or("Hydropower", 0.0)?;
    s.hydro_dist_km = row.f64_or("HydropowerDist", 0.0)?;
    s.grid_penalty = match row.optional_f64("GridPenalty")? {
        Some(p) => p,
        None => calc_grid_penalty(
            row.optional_f64("RoadDist")?,
            row.optional_f64("SubstationDist")?,
            row.optional_f64("Slope")?,
            row.optional_f64("Elevation")?,
        ),
    };
    s.custom_residential_kwh = row.optional_f64("ResidentialDemandTierCustom")?;
    s.productive = ProductiveDemand {
        health: row.f64_or("HealthDemand", 0.0)?,
        education: row.f64_or("EducationDemand", 0.0)?,
        agriculture: row.f64_or("AgriDemand", 0.0)?,
        commercial: row.f64_or("CommercialDemand", 0.0)?,
        heavy_industry: row.f64_or("HeavyIndustryDemand", 0.0)?,
    };

    s.pop_start = row.f64_or(COL_POP_START, pop)?;
    s.elec_start = row.flag(COL_ELEC_START)?;
    s.elec_pop_calib = row.f64_or(COL_ELEC_POP_CALIB, 0.0)?;
    Ok(s)
}

pub fn load_settlements_from_reader<R: Read>(reader: R) -> PlanResult<SettlementStore> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect();

    for column in REQUIRED_COLUMNS {
        if !columns.contains_key(column) {
            return Err(PlanError::MissingColumn(column.to_string()));
        }
    }
    let calibrated = columns.contains_key(COL_POP_START) && columns.contains_key(COL_ELEC_START);

    let mut settlements = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = Row {
            record: &record,
            columns: &columns,
            row: i + 1,
        };
        settlements.push(parse_settlement(&row)?);
    }

    if settlements.is_empty() {
        warn!("Settlement table is empty");
    }
    debug!("Parsed {} settlement rows ({} columns)", settlements.len(), columns.len());

    let mut store = SettlementStore::new(settlements)?;
    if calibrated {
        store.mark_calibrated();
    }
    Ok(store)
}

pub fn load_settlements(csv_path: &Path) -> PlanResult<SettlementStore> {
    let file = File::open(csv_path)?;
    let store = load_settlements_from_reader(file)?;
    info!(
        "Loaded {} settlements from {} (calibrated: {})",
        store.len(),
        csv_path.display(),
        store.is_calibrated()
    );
    Ok(store)
}
