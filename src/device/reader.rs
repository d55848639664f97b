use super::handle::EngineShared;
use super::{DeviceError, DisconnectReason};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

/// Body of one read worker
///
/// Keeps exactly one read in flight and re-issues it as soon as the
/// previous one completes, so with two workers the device always has a
/// read pending while a completion is being forwarded.
pub(crate) fn run_reader(shared: Arc<EngineShared>, worker: usize) {
    let mut buffer = vec![0u8; shared.settings.read_buffer_size];
    debug!("Read worker {} started on {}", worker, shared.path);

    while !shared.cancel.is_cancelled() {
        match shared.io.issue_read(&mut buffer) {
            Ok(len) => {
                shared.counters.reports_read.fetch_add(1, Ordering::Relaxed);
                trace!("Worker {} read {} bytes from {}", worker, len, shared.path);

                if !shared.forward(buffer[..len].to_vec()) {
                    debug!("Report consumer for {} is gone", shared.path);
                    shared.disconnect(DisconnectReason::Shutdown);
                    break;
                }
            }
            Err(e) if e.is_disconnect() => {
                if shared.disconnect(DisconnectReason::Removed) {
                    info!("Worker {} saw {} go away", worker, shared.path);
                }
                break;
            }
            Err(e) => {
                let failure = DeviceError::UnexpectedIoFailure {
                    path: shared.path.clone(),
                    source: e.clone(),
                };
                error!("Worker {}: {}", worker, failure);
                shared.disconnect(DisconnectReason::IoFailure(e));
                break;
            }
        }
    }

    debug!("Read worker {} stopped on {}", worker, shared.path);
}
