use super::handle::EngineShared;
use super::DeviceError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Writes the output report on every tick until the engine is cancelled
///
/// Commands wake the timer early through `write_now`. At most one write is
/// in flight; a tick that finds one pending is skipped, while a command
/// request stays set and is written as soon as the pending write completes.
pub(crate) async fn run_output_timer(shared: Arc<EngineShared>) {
    let mut ticker = time::interval(shared.settings.output_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!("Output timer started on {}", shared.path);

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = shared.write_now.notified() => {
                trace!("Immediate output write requested on {}", shared.path);
            }
        }
        submit_write(&shared);
    }

    debug!("Output timer stopped on {}", shared.path);
}

fn submit_write(shared: &Arc<EngineShared>) {
    if !shared.is_active() {
        return;
    }
    if shared.write_in_flight.swap(true, Ordering::SeqCst) {
        trace!("Previous write on {} still pending, skipping tick", shared.path);
        return;
    }

    // Anything requested after this snapshot gets its own write
    shared.write_requested.store(false, Ordering::SeqCst);
    let report = shared.output.snapshot();
    let shared = shared.clone();
    tokio::task::spawn_blocking(move || {
        let result = shared.io.issue_write(&report);
        shared
            .counters
            .writes_submitted
            .fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(written) if written == report.len() => {}
            Ok(written) => {
                warn!(
                    "Short output write on {}: {} of {} bytes",
                    shared.path,
                    written,
                    report.len()
                );
            }
            // Readers own disconnect detection
            Err(e) if e.is_disconnect() => {
                debug!("Output write on {} cut short: {}", shared.path, e);
            }
            Err(source) => {
                shared.counters.writes_failed.fetch_add(1, Ordering::Relaxed);
                let failure = DeviceError::OutputWriteFailed {
                    path: shared.path.clone(),
                    source,
                };
                warn!("{}", failure);
            }
        }
        shared.write_in_flight.store(false, Ordering::SeqCst);
        if shared.write_requested.load(Ordering::SeqCst) {
            trace!("Command arrived during the write on {}, writing again", shared.path);
            shared.write_now.notify_one();
        }
    });
}
