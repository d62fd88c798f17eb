use super::metrics::YearlySummary;
use crate::config::tech_type::TechKind;
use crate::data::calibration::CalibrationReport;

pub fn print_calibration_report(report: &CalibrationReport) {
    println!("\nCalibration");
    println!("----------------------------------------");
    println!("Modelled population: {:.0}", report.pop_modelled);
    println!("Urban ratio: {:.3}", report.urban_ratio_modelled);
    println!("Electrification rates:");
    println!("  National: {:.3}", report.elec_rate);
    println!("  Urban: {:.3}", report.urban_elec_rate);
    println!("  Rural: {:.3}", report.rural_elec_rate);
    println!(
        "Search: {} iterations, {}",
        report.iterations,
        if report.converged { "converged" } else { "did not converge (best attempt kept)" }
    );
}

pub fn print_yearly_summary(summary: &YearlySummary) {
    println!("\nYear {} Summary", summary.year);
    println!("----------------------------------------");
    println!("Population: {:.0}", summary.total_population);
    println!(
        "Electrified: {:.0} ({:.1}%, target {:.1}%)",
        summary.electrified_population,
        summary.electrification_rate() * 100.0,
        summary.elec_target * 100.0
    );
    if summary.rationing.de_electrified > 0 {
        println!("  Rationed: {} settlements held back by the target", summary.rationing.de_electrified);
    }
    println!("Technologies:");
    for kind in TechKind::ALL {
        let t = summary.tech(kind);
        if t.settlements == 0 {
            continue;
        }
        println!(
            "  {:<10} {:>6} settlements, {:>12.0} people, {:>10.0} new, {:>10.1} kW, ${:.0}",
            kind.label(),
            t.settlements,
            t.population,
            t.new_connections,
            t.new_capacity_kw,
            t.investment
        );
    }
    println!("Grid regions:");
    for r in &summary.regions {
        println!(
            "  {}: {} new settlements, {:.0}/{:.0} households, {:.1}/{:.1} kW, ${:.0}",
            r.region,
            r.new_settlements,
            r.new_households,
            r.allowance.connections_hh,
            r.new_capacity_kw,
            r.allowance.capacity_kw,
            r.investment
        );
    }
    println!("Total investment: ${:.0}", summary.total_investment());
}

pub fn print_scenario_totals(summaries: &[YearlySummary]) {
    println!("\nScenario Totals");
    println!("----------------------------------------");
    let investment: f64 = summaries.iter().map(|s| s.total_investment()).sum();
    let capacity: f64 = summaries.iter().map(|s| s.total_new_capacity_kw()).sum();
    println!("Investment: ${:.0}", investment);
    println!("New capacity: {:.1} kW", capacity);
    if let Some(last) = summaries.last() {
        println!(
            "Final electrification rate ({}): {:.1}%",
            last.year,
            last.electrification_rate() * 100.0
        );
    }
    println!("----------------------------------------");
}
