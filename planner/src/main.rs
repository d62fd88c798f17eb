use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use electrify::analysis::metrics::YearlySummary;
use electrify::analysis::reporting::{print_calibration_report, print_scenario_totals, print_yearly_summary};
use electrify::cli::cli::{Args, Command};
use electrify::config::simulation_config::{ScenarioConfig, TimeStep};
use electrify::core::pathfinder::RegionRasterState;
use electrify::core::scenario::{run_scenario, run_scenario_with_rasters, ProgressObserver, ScenarioOutcome};
use electrify::data::settlements_loader::load_settlements;
use electrify::data::store::SettlementStore;
use electrify::data::synthetic::SyntheticCountry;
use electrify::utils::csv_export::CsvExporter;
use electrify::utils::logging::{self, FileIOType, OperationCategory};

/// Year and region progress bars.
struct ProgressBars {
    _multi: MultiProgress,
    years: ProgressBar,
    regions: ProgressBar,
    region_count: u64,
}

impl ProgressBars {
    fn new(years: usize, regions: usize, quiet: bool) -> Result<Self> {
        let multi = MultiProgress::new();
        let (year_bar, region_bar) = if quiet {
            (ProgressBar::hidden(), ProgressBar::hidden())
        } else {
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?;
            let year_bar = multi.add(ProgressBar::new(years as u64));
            year_bar.set_style(style.clone());
            let region_bar = multi.add(ProgressBar::new(regions as u64));
            region_bar.set_style(style);
            (year_bar, region_bar)
        };
        Ok(Self {
            _multi: multi,
            years: year_bar,
            regions: region_bar,
            region_count: regions as u64,
        })
    }

    fn finish(&self) {
        self.regions.finish_and_clear();
        self.years.finish_with_message("done");
    }
}

impl ProgressObserver for ProgressBars {
    fn year_started(&self, step: &TimeStep, _index: usize, _total: usize) {
        self.years.set_message(format!("year {}", step.year));
        self.regions.reset();
        self.regions.set_length(self.region_count);
    }

    fn region_planned(&self, _year: u32, region: &str) {
        self.regions.set_message(region.to_string());
        self.regions.inc(1);
    }

    fn year_finished(&self, _summary: &YearlySummary) {
        self.years.inc(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<ScenarioConfig> {
    match path {
        Some(path) => ScenarioConfig::load(path)
            .with_context(|| format!("Failed to load scenario config from {}", path.display())),
        None => Ok(ScenarioConfig::default()),
    }
}

fn load_store(path: &Path) -> Result<SettlementStore> {
    let _timing = logging::start_timing("load_settlements", OperationCategory::FileIO { subcategory: FileIOType::DataLoad });
    load_settlements(path).with_context(|| format!("Failed to load settlements from {}", path.display()))
}

fn report(outcome: &ScenarioOutcome) {
    if let Some(calibration) = &outcome.calibration {
        print_calibration_report(calibration);
    }
    for summary in &outcome.summaries {
        print_yearly_summary(summary);
    }
    print_scenario_totals(&outcome.summaries);
}

fn run_and_report(
    args: &Args,
    store: &mut SettlementStore,
    config: &ScenarioConfig,
    rasters: Option<Vec<Option<RegionRasterState>>>,
    no_export: bool,
) -> Result<()> {
    let progress = ProgressBars::new(config.analysis_years.len(), config.regions.len(), args.quiet())?;
    let outcome = match rasters {
        Some(states) => run_scenario_with_rasters(store, config, states, &progress),
        None => run_scenario(store, config, &progress),
    }
    .context("Scenario run failed")?;
    progress.finish();

    report(&outcome);
    if !no_export {
        let exporter = CsvExporter::new(args.output_dir()).context("Failed to create output directory")?;
        exporter
            .export_scenario(store, config, &outcome)
            .context("Failed to write results")?;
        println!("Results written to {}", exporter.output_dir().display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.enable_timing())?;

    println!("Least-cost electrification planner");

    match args.command().clone() {
        Command::Calibrate { settlements, config } => {
            let config = load_config(config.as_deref())?;
            let mut store = load_store(&settlements)?;
            let calibration = store.calibrate(&config.calibration);
            print_calibration_report(&calibration);
            let exporter = CsvExporter::new(args.output_dir()).context("Failed to create output directory")?;
            let path = exporter.export_calibrated(&store).context("Failed to write calibrated table")?;
            println!("Calibrated table written to {}", path.display());
        }
        Command::Run { settlements, config, no_export } => {
            let config = load_config(config.as_deref())?;
            let mut store = load_store(&settlements)?;
            run_and_report(&args, &mut store, &config, None, no_export)?;
        }
        Command::Demo { seed, villages, raster, no_export } => {
            let SyntheticCountry { mut store, config, rasters } =
                SyntheticCountry::generate(seed, villages, raster).context("Failed to generate demo country")?;
            run_and_report(&args, &mut store, &config, Some(rasters), no_export)?;
        }
    }

    logging::print_timing_report();
    Ok(())
}
