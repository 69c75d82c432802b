use shotcoach::{
    init_logging, AppError, Configuration, CoordinatorBuilder, SharedSystemSignals,
    SyntheticCamera, ThermalState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const CAMERA_WIDTH: u32 = 320;
const CAMERA_HEIGHT: u32 = 240;
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Stand-in for the platform observers: the device warms up and drains while recording.
async fn simulate_platform(signals: Arc<SharedSystemSignals>, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut elapsed: u64 = 0;
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                elapsed += 1;
                let thermal = match elapsed {
                    0..=14 => ThermalState::Nominal,
                    15..=29 => ThermalState::Fair,
                    30..=44 => ThermalState::Serious,
                    45..=49 => ThermalState::Critical,
                    _ => ThermalState::Fair,
                };
                signals.update_thermal(thermal);
                signals.update_battery(1.0 - elapsed as f32 * 0.005, false);
                signals.update_memory((96 + elapsed % 32) * 1024 * 1024);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let configuration = Configuration::load()?;
    init_logging(configuration.tracing_level());
    info!(
        "Starting shotcoach: {} fps camera, throttle starts at {}",
        configuration.camera_fps, configuration.throttle.initial_level
    );

    let signals = Arc::new(SharedSystemSignals::new());
    let run_seconds = configuration.run_seconds;
    let camera = SyntheticCamera::new(configuration.camera_fps, CAMERA_WIDTH, CAMERA_HEIGHT);
    let coordinator = CoordinatorBuilder::new(configuration)
        .probe(signals.clone())
        .build()?;

    let cancel_token = coordinator.cancel_token();
    let platform = tokio::spawn(simulate_platform(signals, cancel_token.clone()));

    let deadline = async {
        if run_seconds == 0 {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(Duration::from_secs(run_seconds)).await;
        }
    };

    {
        let mut report = tokio::time::interval(REPORT_INTERVAL);
        let run = coordinator.run(camera);
        tokio::pin!(run);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                admitted = &mut run => {
                    info!("Camera session ended after {} admitted frames", admitted);
                    break;
                }
                _ = &mut deadline => {
                    info!("Run time elapsed");
                    break;
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl-C: {}", e);
                    }
                    break;
                }
                _ = report.tick() => {
                    match serde_json::to_string(&coordinator.metrics_snapshot()) {
                        Ok(json) => info!("metrics {}", json),
                        Err(e) => error!("Failed to serialize metrics: {}", e),
                    }
                }
            }
        }
    }

    cancel_token.cancel();
    platform.await?;
    coordinator.shutdown().await
}
