use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Least-cost electrification planner", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, default_value_t = false)]
    enable_timing: bool,

    #[arg(short, long, global = true, default_value = "results")]
    output_dir: PathBuf,

    #[arg(long, global = true, help = "Hide progress bars", default_value_t = false)]
    quiet: bool,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    /// Calibrate start-year population and electrification and write the calibrated table
    Calibrate {
        #[arg(short, long)]
        settlements: PathBuf,

        #[arg(short, long, help = "Scenario JSON; defaults are used when omitted")]
        config: Option<PathBuf>,
    },
    /// Run a scenario over a settlement table
    Run {
        #[arg(short, long)]
        settlements: PathBuf,

        #[arg(short, long, help = "Scenario JSON; defaults are used when omitted")]
        config: Option<PathBuf>,

        #[arg(long, help = "Skip writing results", default_value_t = false)]
        no_export: bool,
    },
    /// Run a seeded synthetic country
    Demo {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 400)]
        villages: usize,

        #[arg(long, help = "Route lines over cost rasters instead of straight distances", default_value_t = false)]
        raster: bool,

        #[arg(long, help = "Skip writing results", default_value_t = false)]
        no_export: bool,
    },
}

impl Args {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn enable_timing(&self) -> bool {
        self.enable_timing
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_global_flags() {
        let args = Args::parse_from([
            "electrify",
            "run",
            "--settlements",
            "table.csv",
            "--enable-timing",
            "-o",
            "out",
        ]);
        assert!(args.enable_timing());
        assert_eq!(args.output_dir(), Path::new("out"));
        assert_eq!(
            args.command(),
            &Command::Run {
                settlements: PathBuf::from("table.csv"),
                config: None,
                no_export: false,
            }
        );
    }

    #[test]
    fn demo_defaults() {
        let args = Args::parse_from(["electrify", "demo", "--raster"]);
        match args.command() {
            Command::Demo { seed, villages, raster, .. } => {
                assert_eq!((*seed, *villages, *raster), (42, 400, true));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
