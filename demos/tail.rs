//! Tail a robot's telemetry from the command line
//!
//! ```text
//! cargo run --example tail --features demo -- console.yaml
//! RUST_LOG=robowire=debug cargo run --example tail --features demo -- console.yaml
//! ```

use anyhow::Context;
use futures::StreamExt;
use robowire::{ConsoleSettings, OperatorConsole, UpdateRate};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args().nth(1).context("usage: tail <settings.yaml>")?;
    let settings = ConsoleSettings::load(&path).with_context(|| format!("loading {path}"))?;
    let console = OperatorConsole::connect(settings)?;

    let mut states = console.telemetry().subscribe_states(UpdateRate::Max(2));
    let mut images = console.telemetry().subscribe_images(UpdateRate::Max(1));
    let mut depth = console.telemetry().subscribe_depth(UpdateRate::Max(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(state) = states.next() => info!(joints = ?state.joints, "state"),
            Some(image) = images.next() => info!(bytes = image.data.len(), mime = image.mime, "image"),
            Some(raster) = depth.next() => {
                let peak = raster.visual_samples().max().unwrap_or(0);
                info!(width = raster.width, height = raster.height, peak, "depth");
            }
        }
    }

    info!("Shutting down");
    console.close().await;
    Ok(())
}
