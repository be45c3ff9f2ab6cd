//! Generates a large G-code program, scaled to a work envelope, for stress-testing toolpath
//! rendering.
use anyhow::{Context, Result};
use gcode::{job, Program, WorkEnvelope};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "gcode_stress",
    about = "Generates a complex G-code file for performance testing"
)]
struct Opt {
    /// Work envelope width (X axis), in mm
    #[structopt(long, default_value = "285")]
    width: f64,

    /// Work envelope depth (Y axis), in mm
    #[structopt(long, default_value = "172")]
    depth: f64,

    /// Work envelope height (Z axis), in mm
    #[structopt(long, default_value = "38")]
    height: f64,

    /// Output file for the resulting G code. Overwritten if it exists.
    #[structopt(short, long, parse(from_os_str), default_value = "assets/complex_10k.nc")]
    output: PathBuf,

    /// Seed for spindle speed selection, for reproducible output
    #[structopt(long)]
    seed: Option<u64>,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn help_text(opt: &Opt, program: &Program) {
    let stats = program.stats();
    println!(
        "Generated G-code file: {}
        - Total G-code operations: {}
        - Total tool changes: {}
        - Total spindle start commands: {}
        - Spindle speed range: {}-{} RPM",
        opt.output.display(),
        stats.motion,
        stats.tool_changes,
        stats.spindle_starts,
        job::MIN_RPM,
        job::MAX_RPM,
    )
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    init_logging();

    let envelope = WorkEnvelope::new(opt.width, opt.depth, opt.height)?;
    let mut rng = match opt.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let program = job::generate(&envelope, &mut rng).context("Failed to build stress job")?;
    program
        .write_to_path(&opt.output)
        .with_context(|| format!("Failed to write {}", opt.output.display()))?;
    info!(path = %opt.output.display(), lines = program.len(), "Wrote program");

    help_text(&opt, &program);
    Ok(())
}
