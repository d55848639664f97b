//! Sink that records every call, for tests

use super::{SinkError, SinkHost};
use crate::codec::InputReport;
use crate::device::DeviceIdentity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SinkEvent {
    Arrived(String),
    Report(String, Vec<u8>),
    Removed(String),
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    misbehave: AtomicBool,
    stalled: Mutex<Option<String>>,
    unstall: Condvar,
}

impl RecordingSink {
    /// Records, then panics on lifecycle calls and errors on reports
    pub fn misbehaving() -> Self {
        let sink = Self::default();
        sink.misbehave.store(true, Ordering::SeqCst);
        sink
    }

    /// Blocks report calls for `path` until [`RecordingSink::release`]
    pub fn stall_reports_for(&self, path: &str) {
        *self.stalled.lock().unwrap() = Some(path.to_string());
    }

    pub fn release(&self) {
        *self.stalled.lock().unwrap() = None;
        self.unstall.notify_all();
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reports_for(&self, path: &str) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Report(p, raw) if p == path => Some(raw),
                _ => None,
            })
            .collect()
    }

    pub fn count_removed(&self, path: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Removed(p) if p == path))
            .count()
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SinkHost for RecordingSink {
    fn on_device_arrived(&self, identity: &DeviceIdentity) -> Result<(), SinkError> {
        self.record(SinkEvent::Arrived(identity.path.clone()));
        if self.misbehave.load(Ordering::SeqCst) {
            panic!("arrived handler blew up");
        }
        Ok(())
    }

    fn on_device_removed(&self, identity: &DeviceIdentity) -> Result<(), SinkError> {
        self.record(SinkEvent::Removed(identity.path.clone()));
        if self.misbehave.load(Ordering::SeqCst) {
            panic!("removed handler blew up");
        }
        Ok(())
    }

    fn on_input_report(
        &self,
        identity: &DeviceIdentity,
        report: &InputReport,
    ) -> Result<(), SinkError> {
        let mut stalled = self.stalled.lock().unwrap();
        while stalled.as_deref() == Some(identity.path.as_str()) {
            stalled = self.unstall.wait(stalled).unwrap();
        }
        drop(stalled);

        self.record(SinkEvent::Report(identity.path.clone(), report.raw.clone()));
        if self.misbehave.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected("not today".into()));
        }
        Ok(())
    }
}
