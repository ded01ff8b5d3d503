/// SimDevice - worker thread playing the asynchronously-scheduled
/// device
///
/// The issuer appends commands to a `SimCommandSink`; nothing reaches
/// the device until `flush`, which hands the batch to the worker over a
/// channel. The worker executes commands in order, optionally sleeping
/// per command and optionally holding while paused - tests use pause to
/// pin the device "behind" the issuer deterministically.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pulsar_gpu::pulsar::device::CommandSink;
use pulsar_gpu::pulsar::fence::SemaphoreSlot;

/// Simulated device behavior knobs
#[derive(Debug, Clone)]
pub struct SimDeviceConfig {
    /// Sleep before executing each command
    pub command_latency: Duration,
    /// Start with execution held (resume with [`SimDevice::resume`])
    pub start_paused: bool,
}

impl Default for SimDeviceConfig {
    fn default() -> Self {
        Self {
            command_latency: Duration::ZERO,
            start_paused: false,
        }
    }
}

/// One command the simulated device understands
enum SimCommand {
    /// Store `value` into the slot when execution reaches this point
    WriteSemaphore(SemaphoreSlot, u32),
}

/// Issuer-side command sink feeding the simulated device.
///
/// Appended commands are invisible to the device until `flush`.
pub struct SimCommandSink {
    staged: Vec<SimCommand>,
    tx: Sender<SimCommand>,
    queued: Arc<AtomicUsize>,
}

impl CommandSink for SimCommandSink {
    fn write_semaphore(&mut self, slot: &SemaphoreSlot, value: u32) {
        self.staged.push(SimCommand::WriteSemaphore(slot.clone(), value));
    }

    fn flush(&mut self) {
        for command in self.staged.drain(..) {
            self.queued.fetch_add(1, Ordering::SeqCst);
            // A closed channel means the device was torn down first;
            // the command is simply lost, like hardware going away
            if self.tx.send(command).is_err() {
                self.queued.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

/// Handle to the simulated device's worker thread
pub struct SimDevice {
    worker: Option<JoinHandle<()>>,
    tx: Sender<SimCommand>,
    paused: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    executed: Arc<AtomicUsize>,
}

impl SimDevice {
    /// Start the device worker
    pub fn spawn(config: SimDeviceConfig) -> Self {
        let (tx, rx) = channel::<SimCommand>();
        let paused = Arc::new(AtomicBool::new(config.start_paused));
        let shutdown = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));
        let executed = Arc::new(AtomicUsize::new(0));

        let worker = {
            let paused = paused.clone();
            let shutdown = shutdown.clone();
            let queued = queued.clone();
            let executed = executed.clone();
            thread::spawn(move || {
                loop {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    let command = match rx.recv_timeout(Duration::from_millis(5)) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    // Hold here while paused; the command stays "in
                    // flight" exactly like an unscheduled batch
                    while paused.load(Ordering::SeqCst) && !shutdown.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(1));
                    }
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    if !config.command_latency.is_zero() {
                        thread::sleep(config.command_latency);
                    }
                    match command {
                        SimCommand::WriteSemaphore(slot, value) => slot.signal(value),
                    }
                    queued.fetch_sub(1, Ordering::SeqCst);
                    executed.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        Self {
            worker: Some(worker),
            tx,
            paused,
            shutdown,
            queued,
            executed,
        }
    }

    /// Create a command sink wired to this device, shaped the way the
    /// core expects to share it
    pub fn create_sink(&self) -> Arc<Mutex<dyn CommandSink>> {
        Arc::new(Mutex::new(SimCommandSink {
            staged: Vec::new(),
            tx: self.tx.clone(),
            queued: self.queued.clone(),
        }))
    }

    /// Hold execution after the current command
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume execution
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Flushed commands not yet executed
    pub fn pending_commands(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Commands executed so far
    pub fn executed_commands(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Block until every flushed command has executed.
    ///
    /// Only meaningful while the device is running; a paused device
    /// never drains.
    pub fn drain(&self) {
        while self.pending_commands() > 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            // Worker exits on its next shutdown check
            let _ = worker.join();
        }
    }
}
