//! Supervisor: starts and stops device workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use blegate_domain::config::{ConverterDefaults, DeviceConfig};
use blegate_domain::device::DeviceProfile;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::SetupError;
use crate::ports::{BleBackend, ConverterRegistry, Dispatcher};
use crate::worker::{
    DEFAULT_REQUEST_QUEUE, DEFAULT_REQUEST_TIMEOUT, DeviceHandle, DeviceWorker, WorkerOptions,
};

/// Fleet-wide settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Cap on connect attempts in flight across all devices. `None`
    /// leaves connects unbounded.
    pub max_concurrent_connects: Option<usize>,
    /// Bound on the round trip of a gateway request.
    pub request_timeout: Duration,
    /// Capacity of each worker's request queue.
    pub request_queue: usize,
    /// Delay between the starts of consecutive workers.
    pub startup_stagger: Duration,
    pub converter_defaults: ConverterDefaults,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_connects: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            request_queue: DEFAULT_REQUEST_QUEUE,
            startup_stagger: Duration::ZERO,
            converter_defaults: ConverterDefaults::default(),
        }
    }
}

struct RunningDevice {
    handle: DeviceHandle,
    task: JoinHandle<()>,
}

/// Owns one worker task per started device.
///
/// Workers are independent: a device failing setup, losing its link or
/// panicking never affects its siblings.
pub struct Supervisor<B, D> {
    backend: B,
    converters: ConverterRegistry,
    dispatcher: D,
    config: SupervisorConfig,
    connect_permits: Option<Arc<Semaphore>>,
    devices: HashMap<String, RunningDevice>,
    started: u32,
}

impl<B, D> Supervisor<B, D>
where
    B: BleBackend,
    D: Dispatcher + Clone,
{
    #[must_use]
    pub fn new(
        backend: B,
        converters: ConverterRegistry,
        dispatcher: D,
        config: SupervisorConfig,
    ) -> Self {
        let connect_permits = config
            .max_concurrent_connects
            .map(|permits| Arc::new(Semaphore::new(permits.max(1))));
        Self {
            backend,
            converters,
            dispatcher,
            config,
            connect_permits,
            devices: HashMap::new(),
            started: 0,
        }
    }

    /// Validate `config` and spawn its worker.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] when the configuration is invalid, a
    /// converter cannot be resolved, or a device with the same name is
    /// already running. Nothing is spawned in that case.
    #[tracing::instrument(skip_all, fields(device = %config.name))]
    pub fn start_device(&mut self, config: &DeviceConfig) -> Result<DeviceHandle, SetupError> {
        let result = self.spawn(config);
        if let Err(err) = &result {
            tracing::error!(%err, "device setup failed");
        }
        result
    }

    fn spawn(&mut self, config: &DeviceConfig) -> Result<DeviceHandle, SetupError> {
        let profile = DeviceProfile::from_config(config, &self.config.converter_defaults)?;
        if self.devices.contains_key(&profile.name) {
            return Err(SetupError::DuplicateDevice { name: profile.name });
        }

        let options = WorkerOptions {
            request_timeout: self.config.request_timeout,
            request_queue: self.config.request_queue,
            start_delay: stagger_delay(self.config.startup_stagger, self.started),
            connect_permits: self.connect_permits.clone(),
        };
        let name = profile.name.clone();
        let client = self.backend.client(&profile.address);
        let scanner = self.backend.scanner();
        let (worker, handle) = DeviceWorker::new(
            profile,
            &self.converters,
            client,
            scanner,
            self.dispatcher.clone(),
            options,
        )?;

        let task = tokio::spawn(worker.run());
        self.started += 1;
        self.devices.insert(
            name,
            RunningDevice {
                handle: handle.clone(),
                task,
            },
        );
        Ok(handle)
    }

    /// Start every device, collecting per-device failures instead of
    /// aborting on the first one.
    pub fn start_all<'a>(
        &mut self,
        configs: impl IntoIterator<Item = &'a DeviceConfig>,
    ) -> Vec<(String, SetupError)> {
        configs
            .into_iter()
            .filter_map(|config| {
                self.start_device(config)
                    .err()
                    .map(|err| (config.name.clone(), err))
            })
            .collect()
    }

    #[must_use]
    pub fn device(&self, name: &str) -> Option<&DeviceHandle> {
        self.devices.get(name).map(|running| &running.handle)
    }

    /// Names of running devices, sorted.
    #[must_use]
    pub fn device_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.devices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Stop one device and wait for its worker to finish. Returns `false`
    /// if no such device is running.
    #[tracing::instrument(skip(self))]
    pub async fn stop_device(&mut self, name: &str) -> bool {
        let Some(running) = self.devices.remove(name) else {
            return false;
        };
        running.handle.stop();
        join(name, running.task).await;
        true
    }

    /// Stop every device and wait for all workers to finish.
    #[tracing::instrument(skip_all, fields(devices = self.devices.len()))]
    pub async fn shutdown(&mut self) {
        let running: Vec<_> = self.devices.drain().collect();
        for (_, device) in &running {
            device.handle.stop();
        }
        for (name, device) in running {
            join(&name, device.task).await;
        }
        tracing::info!("all device workers stopped");
    }
}

/// Start delay of the `index`-th worker, saturating instead of overflowing.
fn stagger_delay(stagger: Duration, index: u32) -> Duration {
    stagger.checked_mul(index).unwrap_or(Duration::MAX)
}

async fn join(name: &str, task: JoinHandle<()>) {
    if let Err(err) = task.await {
        tracing::error!(device = name, %err, "device worker aborted");
    }
}
