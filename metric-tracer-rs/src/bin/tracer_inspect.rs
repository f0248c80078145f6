//! Inspect a saved tracer state.
//!
//! Usage:
//!   tracer-inspect <state.json> [--group <name>] [--csv-dir <dir>]
//!
//! Examples:
//!   tracer-inspect ./runs/exp1/tracer.json
//!   tracer-inspect ./runs/exp1/tracer.json --group eval --csv-dir ./curves

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use metric_tracer_rs::checkpoint::load_json;
use metric_tracer_rs::{GroupPlotState, GroupTracer, GroupTracerState, TracerConfig};

#[derive(Parser)]
#[command(name = "tracer-inspect")]
#[command(about = "Print meters of a saved tracer state and export smoothed curves")]
struct Args {
    /// State file written by `checkpoint::save_json`
    state: PathBuf,

    /// Only show this group
    #[arg(short, long)]
    group: Option<String>,

    /// Write one `<group>.<metric>.csv` per meter into this directory
    #[arg(long)]
    csv_dir: Option<PathBuf>,
}

/// Either a plain group state or one saved by a plotting tracer.
#[derive(Deserialize)]
#[serde(untagged)]
enum SavedState {
    Plot(GroupPlotState),
    Groups(GroupTracerState),
}

impl SavedState {
    fn into_groups(self) -> (GroupTracerState, usize) {
        match self {
            Self::Plot(plot) => (plot.tracer, plot.figures.len()),
            Self::Groups(groups) => (groups, 0),
        }
    }
}

/// Rebuild the group layout from the records themselves.
fn config_for(state: &GroupTracerState) -> TracerConfig {
    state
        .groups
        .iter()
        .fold(TracerConfig::new(), |config, (name, tracer)| {
            let window = tracer.meters.values().next().map_or(1, |m| m.window_size);
            config.with_group(name.clone(), window)
        })
}

fn write_csv(dir: &std::path::Path, tracer: &GroupTracer, group: &str) -> anyhow::Result<usize> {
    let meters = tracer.read(group)?;
    let mut written = 0;
    for (name, meter) in meters.iter() {
        let (xs, smoothed) = meter.export();
        let path = dir.join(format!("{group}.{name}.csv"));
        let mut file = fs::File::create(&path)?;
        writeln!(file, "x,raw,smoothed")?;
        for ((x, raw), smooth) in xs.iter().zip(meter.y_history()).zip(&smoothed) {
            writeln!(file, "{x},{raw},{smooth}")?;
        }
        written += 1;
    }
    Ok(written)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let saved: SavedState = load_json(&args.state)?;
    let (state, figures) = saved.into_groups();
    if state.groups.is_empty() {
        anyhow::bail!("State file {} holds no groups", args.state.display());
    }

    let tracer = GroupTracer::new(config_for(&state))?;
    for mismatch in tracer.load_state_dict(state)? {
        tracing::warn!(
            "{}: window {} differs from group window {}",
            mismatch.key,
            mismatch.restored,
            mismatch.expected
        );
    }

    tracing::info!("=== {} ===", args.state.display());
    if figures > 0 {
        tracing::info!("{} figure(s) recorded", figures);
    }
    for line in tracer.log_lines(args.group.as_deref())? {
        println!("{line}");
    }

    if let Some(dir) = &args.csv_dir {
        fs::create_dir_all(dir)?;
        let groups: Vec<String> = match &args.group {
            Some(group) => vec![group.clone()],
            None => tracer.group_names().map(str::to_string).collect(),
        };
        let mut total = 0;
        for group in &groups {
            total += write_csv(dir, &tracer, group)?;
        }
        tracing::info!("Wrote {} curve(s) to {}", total, dir.display());
    }

    Ok(())
}
