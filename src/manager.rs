//! High-level remapping manager
//!
//! Ties the pieces together for one run: enumerate devices, bind virtual
//! devices to slots, acquire every slot the configuration writes to, and
//! feed input events to the executor thread until stopped.
//!
//! Events are routed by input device name, so two connected devices sharing
//! a name receive the same bindings. `start` warns when that happens.

use crate::device::{enumerate_and_match, ConfigurationError, DeviceSource, Enumeration};
use crate::driver::{DriverError, DriverHandle, VJoyDriver};
use crate::mapping::config::{Config, ConfigError, InputEvent};
use crate::mapping::executor::{ExecutorError, MappingExecutor};
use crate::vjoy::VirtualDevice;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Capacity of the input event channel. Senders block while it is full.
pub const EVENT_QUEUE_SIZE: usize = 256;

/// How often the executor thread checks the running flag
const EXECUTOR_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Manager is already running")]
    AlreadyRunning,

    #[error("Manager is not running")]
    NotRunning,

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Failed to spawn executor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Manager for one remapping run
pub struct RemapManager {
    config: Config,
    handle: DriverHandle,
    source: Box<dyn DeviceSource>,
    /// Present only while running
    event_sender: Option<Sender<InputEvent>>,
    /// Running flag
    running: Arc<AtomicBool>,
    executor_thread: Option<JoinHandle<()>>,
    enumeration: Option<Enumeration>,
}

impl RemapManager {
    /// Create a manager, checking once that the driver is usable
    pub fn new(
        config: Config,
        driver: Arc<dyn VJoyDriver>,
        source: Box<dyn DeviceSource>,
    ) -> Result<Self, ManagerError> {
        config.validate()?;
        let handle = DriverHandle::open(driver, config.driver_version())?;

        Ok(Self {
            config,
            handle,
            source,
            event_sender: None,
            running: Arc::new(AtomicBool::new(false)),
            executor_thread: None,
            enumeration: None,
        })
    }

    /// Start the manager - binds devices and starts event processing.
    ///
    /// Fails without holding any slot if matching is ambiguous or any
    /// configured slot cannot be acquired.
    pub fn start(&mut self) -> Result<(), ManagerError> {
        if self.is_running() {
            return Err(ManagerError::AlreadyRunning);
        }

        info!("Starting remap manager...");
        let settings = &self.config.settings;
        let enumeration = enumerate_and_match(
            self.source.as_ref(),
            &self.handle,
            &settings.virtual_device_name,
            settings.max_slots,
        )?;
        for diagnostic in &enumeration.diagnostics {
            warn!("Enumeration: {}", diagnostic);
        }
        self.check_bound_devices(&enumeration);
        self.enumeration = Some(enumeration);

        // Dropping the map on error releases whatever was acquired so far
        let mut devices = BTreeMap::new();
        for slot in self.config.slots() {
            let keep_alive = self.config.keep_alive();
            let device = VirtualDevice::acquire_with_keep_alive(&self.handle, slot, keep_alive)?;
            devices.insert(slot, device);
        }

        let executor = MappingExecutor::new(&self.config, devices)?;
        let (event_sender, event_receiver) = bounded(EVENT_QUEUE_SIZE);
        self.running.store(true, Ordering::SeqCst);
        match self.start_executor_thread(executor, event_receiver) {
            Ok(handle) => {
                self.executor_thread = Some(handle);
                self.event_sender = Some(event_sender);
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        }

        info!("✓ Manager started");
        Ok(())
    }

    /// Stop the manager and release every virtual device. Blocks until the
    /// executor thread has exited.
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.event_sender = None;
        if let Some(handle) = self.executor_thread.take() {
            info!("Stopping remap manager...");
            if handle.join().is_err() {
                warn!("Executor thread panicked");
            }
        }
        if was_running {
            info!("✓ Manager stopped");
        }
    }

    /// Check if the manager is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sender for feeding input events to the executor, while running.
    /// Sends fail once the executor thread has exited.
    pub fn event_sender(&self) -> Option<Sender<InputEvent>> {
        self.event_sender.clone()
    }

    /// Queue an event for the executor, blocking while the queue is full
    pub fn send_event(&self, event: InputEvent) -> Result<(), ManagerError> {
        let sender = match &self.event_sender {
            Some(sender) if self.is_running() => sender,
            _ => return Err(ManagerError::NotRunning),
        };
        sender.send(event).map_err(|_| ManagerError::NotRunning)
    }

    /// Devices seen by the last `start`
    pub fn enumeration(&self) -> Option<&Enumeration> {
        self.enumeration.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Warn about bindings whose input device is not connected or whose
    /// name is shared by several connected devices
    fn check_bound_devices(&self, enumeration: &Enumeration) {
        let ambiguous = enumeration.ambiguous_names();
        let names = self
            .config
            .axes
            .iter()
            .map(|b| &b.device)
            .chain(self.config.axis_buttons.iter().map(|b| &b.device))
            .chain(self.config.buttons.iter().map(|b| &b.device))
            .chain(self.config.hats.iter().map(|b| &b.device));

        for name in names {
            if enumeration.find_by_name(name).is_none() {
                warn!("Input device '{}' is not connected", name);
            } else if ambiguous.contains(&name.as_str()) {
                warn!(
                    "Input device name '{}' is shared by several devices, their events are merged",
                    name
                );
            }
        }
    }

    /// Start the executor thread
    fn start_executor_thread(
        &self,
        mut executor: MappingExecutor,
        receiver: Receiver<InputEvent>,
    ) -> std::io::Result<JoinHandle<()>> {
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("executor".to_string())
            .spawn(move || {
                info!("Executor thread started");

                while running.load(Ordering::SeqCst) {
                    match receiver.recv_timeout(EXECUTOR_POLL) {
                        Ok(event) => {
                            executor.process_event(&event);
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => {
                            warn!("Event channel disconnected");
                            break;
                        }
                    }
                }

                // Apply whatever was queued before the stop
                for event in receiver.try_iter() {
                    executor.process_event(&event);
                }
                debug!("Releasing virtual devices");
                executor.shutdown();
                info!("Executor thread stopped");
            })
    }
}

impl Drop for RemapManager {
    fn drop(&mut self) {
        // Always attempt cleanup, regardless of running state
        self.stop();
    }
}
