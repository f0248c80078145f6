//! Example: live plots that survive a restart.
//!
//! This example shows how to:
//! - Declare train/eval groups with their own smoothing windows
//! - Register a figure and stream smoothed values into a JSON-lines sink
//! - Save the tracer state and resume it in a "new process"
//!
//! Run with:
//! ```bash
//! cargo run --example resume_demo
//! ```

use metric_tracer_rs::checkpoint::{load_json, save_json};
use metric_tracer_rs::sink::{JsonLinesSink, SinkEvent};
use metric_tracer_rs::telemetry::{init_logging, LogConfig};
use metric_tracer_rs::{GroupPlotState, GroupPlottingTracer, TracerConfig};

fn config() -> TracerConfig {
    TracerConfig::new().with_group("train", 20).with_group("eval", 1)
}

fn simulated_loss(step: u32) -> f64 {
    let noise = f64::from((step * 7919) % 100) / 500.0;
    2.0 / (1.0 + f64::from(step) / 25.0) + noise
}

fn train(
    plots: &GroupPlottingTracer<JsonLinesSink>,
    steps: std::ops::Range<u32>,
) -> anyhow::Result<()> {
    for step in steps {
        let x = f64::from(step);
        plots.update("train", x, [("loss", simulated_loss(step))])?;
        if step % 10 == 0 {
            plots.update("eval", x, [("loss", simulated_loss(step) * 1.1)])?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::default())?;

    let dir = tempfile::tempdir()?;
    let events = dir.path().join("plots.jsonl");
    let state = dir.path().join("tracer.json");

    // First run: 100 steps, then save.
    {
        let plots = GroupPlottingTracer::new(config(), JsonLinesSink::create(&events)?)?;
        plots.register_figure(
            "loss",
            "step",
            "loss",
            [("train.loss", "train"), ("eval.loss", "eval")],
        )?;
        train(&plots, 0..100)?;
        plots.logging(None)?;
        save_json(&state, &plots.state_dict())?;
    }
    let first_run = JsonLinesSink::read_events(&events)?.len();

    // Second run: resume, which replays the saved curves into a new window.
    let plots = GroupPlottingTracer::new(config(), JsonLinesSink::append_to(&events)?)?;
    let saved: GroupPlotState = load_json(&state)?;
    plots.load_state_dict(saved)?;
    train(&plots, 100..150)?;
    plots.logging(Some("train"))?;

    println!("\n=== Events written after resume ===");
    for event in &JsonLinesSink::read_events(&events)?[first_run..] {
        match event {
            SinkEvent::Open { window, options, .. } => {
                println!("open {} `{}`", window, options.title);
            }
            SinkEvent::BulkReplace { series, x, .. } => {
                println!("replay {} ({} points)", series, x.len());
            }
            SinkEvent::Append { .. } => {}
        }
    }

    let (xs, ys) = plots.get_meter("train", "loss")?.export();
    println!(
        "\ntrain.loss: {} points, smoothed {:.4} -> {:.4}",
        xs.len(),
        ys.first().copied().unwrap_or(f64::NAN),
        ys.last().copied().unwrap_or(f64::NAN)
    );

    Ok(())
}
