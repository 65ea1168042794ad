//! `sensors-dump`: opens the HAL in-process, enables every sensor and
//! prints events as JSON lines until Ctrl-C.

use cooper_sensors::{init_all, init_tracing, load_default_config, sensor_list, SensorEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const POLL_BATCH: usize = 16;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug for verbose, RUST_LOG=info for normal
    init_tracing();
    info!("[sensors-dump] starting up...");

    // $SENSORS_HAL_CONFIG, /system/etc/sensors_hal.toml, or built-in defaults
    let config = load_default_config()?;
    let context = init_all(&config)?;

    for sensor in sensor_list() {
        let name = sensor.name.to_string_lossy();
        match context.activate(sensor.handle, true) {
            Ok(()) => info!("[sensors-dump] enabled {} (handle {})", name, sensor.handle),
            Err(e) => warn!("[sensors-dump] cannot enable {}: {}", name, e),
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<SensorEvent>();
    let stop = Arc::new(AtomicBool::new(false));
    let waker = context.waker();

    let poll_stop = stop.clone();
    let poller = tokio::task::spawn_blocking(move || {
        let mut batch = Vec::with_capacity(POLL_BATCH);
        while !poll_stop.load(Ordering::Relaxed) {
            batch.clear();
            match context.poll_events(&mut batch, POLL_BATCH) {
                Ok(_) => {
                    for event in batch.drain(..) {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("[sensors-dump] poll failed: {}", e);
                    return;
                }
            }
        }
        // Dropping the context disables the sensors and powers the chips down
    });

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => match event.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("[sensors-dump] cannot encode event: {}", e),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("[sensors-dump] interrupted, shutting down");
                stop.store(true, Ordering::Relaxed);
                waker.wake()?;
                break;
            }
        }
    }

    poller.await?;
    Ok(())
}
