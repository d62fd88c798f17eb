use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;
use tracing_subscriber::{EnvFilter, prelude::*};
use tracing_timing::{Builder, Histogram};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use std::cell::RefCell;

// Define categories for different types of operations
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub enum OperationCategory {
    Scenario,
    CostModel {
        subcategory: CostStage,
    },
    Planning {
        subcategory: PlanningStage,
    },
    DataPreparation {
        subcategory: DataStage,
    },
    FileIO {
        subcategory: FileIOType,
    },
    Other,
}

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub enum CostStage {
    OffGrid,
    Grid,
    Other,
}

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub enum PlanningStage {
    PreScreening,
    GridExtension,
    Pathfinding,
    Rationing,
    Other,
}

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub enum DataStage {
    Calibration,
    Projection,
    Demand,
    Other,
}

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub enum FileIOType {
    DataLoad,
    RasterLoad,
    ResultsSave,
    Other,
}

impl OperationCategory {
    pub fn as_str(&self) -> String {
        match self {
            OperationCategory::Scenario => "Scenario".to_string(),
            OperationCategory::CostModel { subcategory } => {
                format!("Cost Model - {}", match subcategory {
                    CostStage::OffGrid => "Off-grid LCOE",
                    CostStage::Grid => "Grid LCOE",
                    CostStage::Other => "Other",
                })
            },
            OperationCategory::Planning { subcategory } => {
                format!("Planning - {}", match subcategory {
                    PlanningStage::PreScreening => "Pre-screening",
                    PlanningStage::GridExtension => "Grid Extension",
                    PlanningStage::Pathfinding => "Pathfinding",
                    PlanningStage::Rationing => "Rationing",
                    PlanningStage::Other => "Other",
                })
            },
            OperationCategory::DataPreparation { subcategory } => {
                format!("Data Preparation - {}", match subcategory {
                    DataStage::Calibration => "Calibration",
                    DataStage::Projection => "Projection",
                    DataStage::Demand => "Demand",
                    DataStage::Other => "Other",
                })
            },
            OperationCategory::FileIO { subcategory } => {
                format!("File I/O - {}", match subcategory {
                    FileIOType::DataLoad => "Data Load",
                    FileIOType::RasterLoad => "Raster Load",
                    FileIOType::ResultsSave => "Results Save",
                    FileIOType::Other => "Other",
                })
            },
            OperationCategory::Other => "Other Operations".to_string(),
        }
    }
}

const HISTOGRAM_MAX_NS: u64 = 60_000_000_000;

thread_local! {
    static TIMING_STACK: RefCell<Vec<(String, OperationCategory, Instant)>> = RefCell::new(Vec::new());
}

lazy_static! {
    static ref TIMING_ENABLED: AtomicBool = AtomicBool::new(false);
    static ref FUNCTION_TIMINGS: Arc<RwLock<HashMap<String, Histogram<u64>>>> = Arc::new(RwLock::new(HashMap::new()));
    static ref CATEGORY_TIMINGS: Arc<RwLock<HashMap<OperationCategory, Histogram<u64>>>> = Arc::new(RwLock::new(HashMap::new()));
    static ref HIERARCHICAL_TIMINGS: Arc<RwLock<HashMap<String, (Duration, usize, Vec<String>)>>> = Arc::new(RwLock::new(HashMap::new()));
}

pub struct TimingGuard {
    function_name: String,
    category: OperationCategory,
    start: Instant,
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        record_timing_end(&self.function_name, duration, &self.category);
    }
}

pub fn start_timing(function_name: &str, category: OperationCategory) -> TimingGuard {
    let guard = TimingGuard {
        function_name: function_name.to_string(),
        category: category.clone(),
        start: Instant::now(),
    };

    if is_timing_enabled() {
        TIMING_STACK.with(|stack| {
            stack.borrow_mut().push((function_name.to_string(), category, Instant::now()));
        });
    }

    guard
}

fn record_into<K: std::hash::Hash + Eq>(map: &mut HashMap<K, Histogram<u64>>, key: K, duration_ns: u64) {
    let histogram = match map.entry(key) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => match Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_NS, 3) {
            Ok(histogram) => entry.insert(histogram),
            Err(_) => return,
        },
    };
    let _ = histogram.record(duration_ns.clamp(1, HISTOGRAM_MAX_NS));
}

fn record_timing_end(function_name: &str, duration: Duration, category: &OperationCategory) {
    if !is_timing_enabled() {
        return;
    }

    let duration_ns = duration.as_nanos() as u64;

    // Pop from timing stack and attribute the call to its parent
    TIMING_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.pop().is_some() {
            let mut hierarchical = HIERARCHICAL_TIMINGS.write();
            let entry = hierarchical
                .entry(function_name.to_string())
                .or_insert((Duration::from_nanos(0), 0, Vec::new()));

            entry.0 += duration;
            entry.1 += 1;

            if let Some((parent_name, _, _)) = stack.last() {
                if !entry.2.contains(parent_name) {
                    entry.2.push(parent_name.clone());
                }
            }
        }
    });

    record_into(&mut FUNCTION_TIMINGS.write(), function_name.to_string(), duration_ns);
    record_into(&mut CATEGORY_TIMINGS.write(), category.clone(), duration_ns);
}

pub fn init_logging(enable_timing: bool) -> anyhow::Result<()> {
    TIMING_ENABLED.store(enable_timing, Ordering::SeqCst);

    let env_filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into())
        .add_directive("electrify=debug".parse()?);

    if enable_timing {
        let template = Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_NS, 3)?;
        let timing_layer = Builder::default().layer(move || template.clone());

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .with(timing_layer.boxed());

        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty());

        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

pub fn set_timing_enabled(enabled: bool) {
    TIMING_ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn is_timing_enabled() -> bool {
    TIMING_ENABLED.load(Ordering::SeqCst)
}

/// Number of recorded calls of `function_name`.
pub fn timing_count(function_name: &str) -> usize {
    HIERARCHICAL_TIMINGS
        .read()
        .get(function_name)
        .map(|(_, count, _)| *count)
        .unwrap_or(0)
}

pub fn print_timing_report() {
    if !is_timing_enabled() {
        return;
    }

    println!("\nDetailed Performance Report");
    println!("==========================");

    println!("\nHierarchical Timing Analysis:");
    println!("---------------------------");
    let hierarchical = HIERARCHICAL_TIMINGS.read();
    let mut entries: Vec<_> = hierarchical.iter().collect();
    entries.sort_by(|a, b| b.1.0.cmp(&a.1.0));

    for (function_name, (total_duration, count, parents)) in entries {
        let avg_duration = total_duration.div_f64(*count as f64);
        println!(
            "{}: total={:.2}s, count={}, avg={:.2}ms{}",
            function_name,
            total_duration.as_secs_f64(),
            count,
            avg_duration.as_secs_f64() * 1000.0,
            if !parents.is_empty() {
                format!("\n  Called by: {}", parents.join(", "))
            } else {
                String::new()
            }
        );
    }

    println!("\nPerformance by Category:");
    println!("------------------------");
    let category_timings = CATEGORY_TIMINGS.read();
    let mut category_vec: Vec<_> = category_timings.iter().collect();
    category_vec.sort_by(|a, b| b.1.mean().total_cmp(&a.1.mean()));

    let total_time: f64 = category_vec.iter()
        .map(|(_, hist)| hist.mean() * (hist.len() as f64))
        .sum();

    for (category, histogram) in category_vec {
        let category_total = histogram.mean() * (histogram.len() as f64);
        let percentage = if total_time > 0.0 { category_total / total_time * 100.0 } else { 0.0 };
        println!(
            "{}: {:.1}% of total time\n  mean={:.2}ms, p95={:.2}ms, p99={:.2}ms, count={}, total={:.2}s",
            category.as_str(),
            percentage,
            histogram.mean() / 1_000_000.0,
            histogram.value_at_quantile(0.95) as f64 / 1_000_000.0,
            histogram.value_at_quantile(0.99) as f64 / 1_000_000.0,
            histogram.len(),
            category_total / 1_000_000_000.0,
        );
    }

    println!("==========================\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_record_nested_calls() {
        set_timing_enabled(true);
        {
            let _outer = start_timing("logging_test_outer", OperationCategory::Scenario);
            let _inner = start_timing(
                "logging_test_inner",
                OperationCategory::Planning { subcategory: PlanningStage::Rationing },
            );
        }
        assert_eq!(timing_count("logging_test_outer"), 1);
        assert_eq!(timing_count("logging_test_inner"), 1);
        let hierarchical = HIERARCHICAL_TIMINGS.read();
        assert_eq!(hierarchical["logging_test_inner"].2, vec!["logging_test_outer".to_string()]);
    }
}
