use anyhow::Context;
use clap::{Parser, Subcommand};
use gui_bridge::bridge::GuiBridge;
use serde_json::json;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Range-Doppler processing driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long, global = true)]
    workflow: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream a capture file or synthetic scene through the pipeline
    Process {
        /// Raw complex64 capture, overriding the workflow
        #[arg(long)]
        capture: Option<PathBuf>,
        /// Record range-Doppler frames to this file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write a JSON run summary to this file
        #[arg(long)]
        summary: Option<PathBuf>,
        /// Serve the latest frame over HTTP until Ctrl+C
        #[arg(long, default_value_t = false)]
        serve: bool,
        #[arg(long, default_value = "127.0.0.1:9000")]
        bind: SocketAddr,
    },
    /// Measure the transmit/receive loop delay and store it
    Calibrate {
        /// Loopback capture; a simulated loopback is used when absent
        #[arg(long)]
        capture: Option<PathBuf>,
        /// Delay of the simulated loopback in samples
        #[arg(long, default_value_t = 37)]
        simulated_delay: usize,
        /// Calibration file, overriding the workflow
        #[arg(long)]
        calibration: Option<PathBuf>,
        /// Comma-separated sample rates to calibrate; the workflow rate when absent
        #[arg(long, value_delimiter = ',')]
        rates: Vec<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = match args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };

    match args.command {
        Command::Process {
            capture,
            output,
            summary,
            serve,
            bind,
        } => {
            if capture.is_some() {
                workflow_config.capture = capture;
            }
            if output.is_some() {
                workflow_config.output = output;
            }
            if workflow_config.capture.is_none() && workflow_config.scene.is_none() {
                workflow_config.scene = Some(Default::default());
            }

            let runner = Runner::new(workflow_config);
            let gui_bridge = GuiBridge::new();
            if serve {
                gui_bridge.spawn_server(bind);
            }
            gui_bridge.publish_status("processing");

            let result = runner.execute(|frame| gui_bridge.publish(frame))?;
            gui_bridge.publish_metrics(result.summary.metrics);
            gui_bridge.publish_status("stream finished");

            let metrics = result.summary.metrics;
            println!(
                "Processed {} CPIs -> delivered {}, dropped {}, degenerate {}, delay {} samples ({})",
                metrics.processed,
                result.frames_received,
                metrics.dropped,
                metrics.degenerate,
                result.delay_samples,
                result.summary.stopped_by
            );
            if let Some(manifest) = &result.summary.recording {
                println!(
                    "Recorded {} frames of {}x{} to {}",
                    manifest.frames,
                    manifest.rows,
                    manifest.cols,
                    manifest.data_file.display()
                );
            }

            if let Some(path) = summary {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                let report = json!({
                    "metrics": metrics,
                    "frames_received": result.frames_received,
                    "delay_samples": result.delay_samples,
                    "recording": result.summary.recording,
                    "stopped_by": result.summary.stopped_by.to_string(),
                });
                fs::write(&path, serde_json::to_string_pretty(&report)?)
                    .with_context(|| format!("writing run summary {}", path.display()))?;
            }

            if serve {
                gui_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
                let runtime = TokioBuilder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("creating runtime for signal handling")?;
                runtime.block_on(async {
                    signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
                    Ok::<(), anyhow::Error>(())
                })?;
            }
        }
        Command::Calibrate {
            capture,
            simulated_delay,
            calibration,
            rates,
        } => {
            if calibration.is_some() {
                workflow_config.calibration = calibration;
            }
            let runner = Runner::new(workflow_config);
            let records = runner.calibrate(capture.as_deref(), simulated_delay, &rates)?;
            for record in &records {
                let confidence = match record.peak_to_noise_db {
                    Some(db) => format!("{:.1} dB peak-to-noise", db),
                    None => "no off-peak floor".to_string(),
                };
                println!(
                    "Loop delay {} samples ({}) for '{}' at {:.6e} Hz, {:.6e} S/s",
                    record.delay_samples,
                    confidence,
                    runner.config().radio,
                    record.carrier_freq,
                    record.sample_rate
                );
            }
        }
    }

    Ok(())
}
