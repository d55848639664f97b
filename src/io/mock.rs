//! Scripted in-memory device used by the unit tests
//!
//! Reads block until a report is queued, the device is "unplugged"
//! ([`ScriptedIo::unplug`]) or the handle is closed, the way a pending
//! overlapped read behaves against the driver.

use super::{DeviceIo, DeviceOpener, DeviceSource, IoError};
use crate::protocol::{
    IOCTL_FIRESHOCK_GET_DEVICE_BD_ADDR, IOCTL_FIRESHOCK_GET_DEVICE_TYPE,
    IOCTL_FIRESHOCK_GET_HOST_BD_ADDR, IOCTL_FIRESHOCK_SET_HOST_BD_ADDR,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct Script {
    device_type_tag: u32,
    device_addr: [u8; 6],
    host_addr: [u8; 6],
    failing_controls: HashSet<u32>,
    control_reply_limit: Option<usize>,
    control_calls: Vec<(u32, Vec<u8>)>,
    reads: VecDeque<Result<Vec<u8>, IoError>>,
    unplugged: bool,
    closed: bool,
    close_count: usize,
    pending_reads: usize,
    writes: Vec<Vec<u8>>,
    writes_started: usize,
    write_delay: Option<Duration>,
    failing_writes: usize,
}

#[derive(Default)]
pub(crate) struct ScriptedIo {
    script: Mutex<Script>,
    wake: Condvar,
}

impl ScriptedIo {
    pub fn dualshock3(device_addr: [u8; 6], host_addr: [u8; 6]) -> Self {
        Self::with_tag(0, device_addr, host_addr)
    }

    pub fn with_tag(tag: u32, device_addr: [u8; 6], host_addr: [u8; 6]) -> Self {
        let io = Self::default();
        {
            let mut script = io.script.lock().unwrap();
            script.device_type_tag = tag;
            script.device_addr = device_addr;
            script.host_addr = host_addr;
        }
        io
    }

    pub fn fail_control(&self, code: u32) {
        self.script.lock().unwrap().failing_controls.insert(code);
    }

    pub fn truncate_control_replies(&self, len: usize) {
        self.script.lock().unwrap().control_reply_limit = Some(len);
    }

    pub fn push_report(&self, report: Vec<u8>) {
        self.script.lock().unwrap().reads.push_back(Ok(report));
        self.wake.notify_all();
    }

    pub fn push_read_error(&self, error: IoError) {
        self.script.lock().unwrap().reads.push_back(Err(error));
        self.wake.notify_all();
    }

    /// Completes every pending and future read as aborted
    pub fn unplug(&self) {
        self.script.lock().unwrap().unplugged = true;
        self.wake.notify_all();
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.script.lock().unwrap().failing_writes = count;
    }

    /// Makes every write take `delay` before it lands
    pub fn slow_writes(&self, delay: Duration) {
        self.script.lock().unwrap().write_delay = Some(delay);
    }

    pub fn writes_started(&self) -> usize {
        self.script.lock().unwrap().writes_started
    }

    pub fn pending_reads(&self) -> usize {
        self.script.lock().unwrap().pending_reads
    }

    pub fn close_count(&self) -> usize {
        self.script.lock().unwrap().close_count
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.script.lock().unwrap().writes.clone()
    }

    pub fn control_calls(&self) -> Vec<(u32, Vec<u8>)> {
        self.script.lock().unwrap().control_calls.clone()
    }
}

impl DeviceIo for ScriptedIo {
    fn issue_read(&self, buffer: &mut [u8]) -> Result<usize, IoError> {
        let mut script = self.script.lock().unwrap();
        if script.closed {
            return Err(IoError::Closed);
        }

        script.pending_reads += 1;
        loop {
            if script.closed || script.unplugged {
                script.pending_reads -= 1;
                return Err(IoError::Aborted);
            }
            if let Some(next) = script.reads.pop_front() {
                script.pending_reads -= 1;
                return next.map(|report| {
                    let len = report.len().min(buffer.len());
                    buffer[..len].copy_from_slice(&report[..len]);
                    len
                });
            }
            script = self.wake.wait(script).unwrap();
        }
    }

    fn issue_write(&self, report: &[u8]) -> Result<usize, IoError> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            script.writes_started += 1;
            script.write_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut script = self.script.lock().unwrap();
        if script.closed {
            return Err(IoError::Closed);
        }
        if script.failing_writes > 0 {
            script.failing_writes -= 1;
            return Err(IoError::Os(0x1F));
        }
        script.writes.push(report.to_vec());
        Ok(report.len())
    }

    fn issue_control(&self, code: u32, input: &[u8], output: &mut [u8]) -> Result<usize, IoError> {
        let mut script = self.script.lock().unwrap();
        script.control_calls.push((code, input.to_vec()));
        if script.closed {
            return Err(IoError::Closed);
        }
        if script.failing_controls.contains(&code) {
            return Err(IoError::Os(0x1F));
        }

        let reply: Vec<u8> = match code {
            IOCTL_FIRESHOCK_GET_DEVICE_TYPE => script.device_type_tag.to_le_bytes().to_vec(),
            IOCTL_FIRESHOCK_GET_DEVICE_BD_ADDR => script.device_addr.to_vec(),
            IOCTL_FIRESHOCK_GET_HOST_BD_ADDR => script.host_addr.to_vec(),
            IOCTL_FIRESHOCK_SET_HOST_BD_ADDR => {
                if let Some(addr) = input.get(..6) {
                    script.host_addr.copy_from_slice(addr);
                }
                Vec::new()
            }
            _ => return Err(IoError::Os(0x1)),
        };

        let len = script
            .control_reply_limit
            .unwrap_or(reply.len())
            .min(reply.len())
            .min(output.len());
        output[..len].copy_from_slice(&reply[..len]);
        Ok(len)
    }

    fn close(&self) {
        let mut script = self.script.lock().unwrap();
        script.closed = true;
        script.close_count += 1;
        self.wake.notify_all();
    }
}

/// Hands out pre-built scripted devices by path
#[derive(Default)]
pub(crate) struct ScriptedBus {
    devices: Mutex<HashMap<String, Arc<ScriptedIo>>>,
    present: Mutex<Vec<String>>,
    open_attempts: Mutex<Vec<String>>,
}

impl ScriptedBus {
    pub fn plug(&self, path: &str, io: Arc<ScriptedIo>) {
        self.devices.lock().unwrap().insert(path.to_string(), io);
        self.present.lock().unwrap().push(path.to_string());
    }

    /// Lists `path` without a device behind it, so opening fails
    pub fn list_only(&self, path: &str) {
        self.present.lock().unwrap().push(path.to_string());
    }

    pub fn device(&self, path: &str) -> Option<Arc<ScriptedIo>> {
        self.devices.lock().unwrap().get(path).cloned()
    }

    pub fn open_attempts(&self) -> Vec<String> {
        self.open_attempts.lock().unwrap().clone()
    }
}

impl DeviceOpener for ScriptedBus {
    fn open(&self, path: &str) -> Result<Arc<dyn DeviceIo>, IoError> {
        self.open_attempts.lock().unwrap().push(path.to_string());
        match self.devices.lock().unwrap().get(path) {
            Some(io) => Ok(io.clone() as Arc<dyn DeviceIo>),
            None => Err(IoError::Os(0x2)),
        }
    }
}

impl DeviceSource for ScriptedBus {
    fn list_device_paths(&self, _device_class: &Uuid) -> Result<Vec<String>, IoError> {
        Ok(self.present.lock().unwrap().clone())
    }
}

/// Polls `condition` until it holds, panicking after about two seconds
pub(crate) async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
