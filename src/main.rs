//! Terminal front end: zoom slider and capture button as line commands.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cam_zoom_capture::traits::Result;
use cam_zoom_capture::{
    CameraDevice, CameraModel, CaptureGate, Config, V4L2Device, V4L2Zoom, ZoomController,
};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Drive a camera's zoom and capture single stills.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture device index (/dev/videoN); the first capture device if omitted
    #[arg(short, long)]
    device: Option<u32>,

    /// Requested frame width
    #[arg(long)]
    width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    height: Option<u32>,
}

const STILL_WAIT: Duration = Duration::from_secs(1);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.device.is_some() {
        config.device.index = cli.device;
    }
    if let Some(width) = cli.width {
        config.stream.width = width;
    }
    if let Some(height) = cli.height {
        config.stream.height = height;
    }

    let device = match config.device.index {
        Some(index) => V4L2Device::open(index),
        None => V4L2Device::first_available(config.device.search_limit),
    };
    let device = match device {
        Ok(device) => Some(device),
        Err(err) => {
            warn!("No available device: {err}");
            None
        }
    };

    let zoom: Option<V4L2Zoom> = device.as_ref().and_then(|device| {
        device
            .zoom_control()
            .map_err(|err| warn!("Zoom not supported: {err}"))
            .ok()
    });

    let controller = ZoomController::new(zoom, &config.zoom);
    let gate = Arc::new(CaptureGate::new(config.still.orientation));
    let mut model = CameraModel::new(controller, gate);

    if let Some(device) = device {
        println!("Device: {}", device.capabilities().card);
        model.start_session(device, &config.stream)?;
    }

    print_help();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        model.poll();
        let line = line?;
        let mut words = line.split_whitespace();

        match (words.next(), words.next()) {
            (Some("zoom"), Some(value)) => match value.parse::<f64>() {
                Ok(factor) => {
                    model.set_linear_zoom(factor);
                    println!("Zoom: {:.2}", model.linear_zoom());
                }
                Err(_) => println!("Not a number: {value}"),
            },
            (Some("capture"), None) => capture(&mut model),
            (Some("dismiss"), None) => {
                model.dismiss_image();
                println!("Back to live preview");
            }
            (Some("sync"), None) => match model.sync_zoom() {
                Some(factor) => println!("Hardware zoom: {factor:.2}"),
                None => println!("Hardware zoom unknown"),
            },
            (Some("status"), None) => print_status(&model),
            (Some("quit" | "exit"), None) => break,
            (None, _) => {}
            _ => print_help(),
        }
        io::stdout().flush()?;
    }

    model.stop_session();
    Ok(())
}

fn capture(model: &mut CameraModel<V4L2Zoom>) {
    if !model.is_running() {
        println!("No live preview");
        return;
    }

    // Drops the displayed still, so the loop below waits for the new one
    model.capture_image_once();
    let deadline = Instant::now() + STILL_WAIT;
    while Instant::now() < deadline {
        model.poll();
        if let Some(still) = model.image() {
            println!(
                "Captured {}x{} still (aspect {:.4})",
                still.width(),
                still.height(),
                still.aspect_ratio
            );
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    println!("No still captured, try again");
}

fn print_status(model: &CameraModel<V4L2Zoom>) {
    let range = model.zoom_range();
    println!(
        "Zoom {:.2} in [{:.2}, {:.2}], standard {:.2}{}",
        model.linear_zoom(),
        range.min,
        range.max,
        range.standard,
        if model.zoom().has_hardware() { "" } else { " (no zoom hardware)" }
    );
    println!(
        "Preview: {} aspect {:.4}",
        if model.is_running() { "live" } else { "stopped" },
        model.preview_aspect_ratio()
    );
    match model.image() {
        Some(still) => println!("Still: {}x{}", still.width(), still.height()),
        None => println!("Still: none"),
    }
}

fn print_help() {
    println!("Commands: zoom <factor> | capture | dismiss | sync | status | quit");
}
