//! Script registry: owns every live instance and drives them once per frame.

pub mod dispatch;
pub mod error;
pub mod importer;
pub mod instance;
pub mod watcher;

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::assets::{AssetCache, ImageHandle};
use crate::config::{HostConfig, ScriptConfig};
use crate::interop::{Host, HostValue, InstanceId, RemovalQueue, ScriptHandle, BUILTIN_GLOBALS};

pub use dispatch::Outcome;
pub use error::{DispatchError, ReloadError, ScanError};
pub use importer::Importer;
pub use instance::{EntryPoint, InstanceSnapshot, InstanceState, Namespace, ScriptInstance};

pub struct ScriptHost {
    scripts: ScriptConfig,
    importer: Importer,
    host: Host,
    removals: RemovalQueue,
    instances: Vec<ScriptInstance>,
    next_id: InstanceId,
    last_update_cost: Duration,
}

impl ScriptHost {
    /// Builds an empty registry. Fails only when the library directory exists but cannot be indexed.
    pub fn new(config: &HostConfig) -> Result<Self> {
        let importer = Importer::new(config.scripts.libraries_dir(), &BUILTIN_GLOBALS)?;
        let host = Host::new(config.window.width, config.window.height, AssetCache::new(&config.assets.dir));
        Ok(Self {
            scripts: config.scripts.clone(),
            importer,
            host,
            removals: RemovalQueue::new(),
            instances: Vec::new(),
            next_id: 1,
            last_update_cost: Duration::ZERO,
        })
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts.dir
    }

    pub fn frame(&self) -> i64 {
        self.host.frame()
    }

    pub fn last_update_cost(&self) -> Duration {
        self.last_update_cost
    }

    pub fn instances(&self) -> &[ScriptInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instance(&self, name: &str) -> Option<&ScriptInstance> {
        self.instances.iter().find(|instance| instance.name() == name)
    }

    pub fn instance_mut(&mut self, name: &str) -> Option<&mut ScriptInstance> {
        self.instances.iter_mut().find(|instance| instance.name() == name)
    }

    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    /// Loads `name` and appends it. A script that fails to load is still registered, faulted and stopped.
    pub fn add(&mut self, name: &str) -> InstanceId {
        let id = self.next_id;
        self.next_id += 1;
        let handle = ScriptHandle::new(id, name, self.removals.clone());
        let namespace = Namespace::new(self.host.clone(), handle);
        let mut instance = ScriptInstance::new(name, self.scripts.source_path(name), namespace);
        let _ = instance.reload(&self.importer);
        self.instances.push(instance);
        id
    }

    pub fn add_startup_scripts(&mut self) {
        let startup = self.scripts.startup.clone();
        for name in &startup {
            self.add(name);
        }
    }

    /// Marks an instance for removal once the current frame has been drawn.
    pub fn remove(&mut self, id: InstanceId) {
        self.removals.push(id);
    }

    /// Drops every instance and pending request, then re-adds the startup scripts.
    pub fn reset(&mut self) {
        for instance in self.instances.drain(..) {
            self.importer.forget(instance.id());
        }
        self.removals.take();
        self.host.take_pending_adds();
        self.add_startup_scripts();
    }

    pub fn reload(&mut self, name: &str) -> Vec<Result<(), ReloadError>> {
        let importer = &self.importer;
        self.instances
            .iter_mut()
            .filter(|instance| instance.name() == name)
            .map(|instance| instance.reload(importer))
            .collect()
    }

    pub fn update(&mut self) {
        let started = Instant::now();
        let mut index = 0;
        while index < self.instances.len() {
            let instance = &mut self.instances[index];
            if !instance.is_initialized() && instance.state() == InstanceState::Ready {
                dispatch::run(instance, EntryPoint::OnInit, Vec::new());
                instance.mark_initialized();
            }
            dispatch::run(instance, EntryPoint::OnUpdate, Vec::new());
            self.apply_pending_adds();
            index += 1;
        }
        self.host.advance_frame();
        self.last_update_cost = started.elapsed();
        tracing::debug!(scripts = self.instances.len(), cost = ?self.last_update_cost, "update pass");
    }

    /// Dispatches `OnDraw`, scans for changed sources, then applies pending removals.
    pub fn draw(&mut self, surface: &ImageHandle) -> Result<(), ScanError> {
        self.host.set_screen(surface);
        let mut index = 0;
        while index < self.instances.len() {
            dispatch::run(&mut self.instances[index], EntryPoint::OnDraw, Vec::new());
            self.apply_pending_adds();
            index += 1;
        }
        let scanned = watcher::scan(&self.scripts.dir, &mut self.instances, &self.importer);
        self.apply_removals();
        scanned.map(|_| ())
    }

    /// Delivers `payload` to `OnMessage` of every instance named `name`. Returns how many handled it.
    pub fn send_message(&mut self, name: &str, payload: HostValue) -> usize {
        let mut delivered = 0;
        let mut index = 0;
        while index < self.instances.len() {
            let instance = &mut self.instances[index];
            if instance.name() == name
                && dispatch::run(instance, EntryPoint::OnMessage, vec![payload.clone()]).is_completed()
            {
                delivered += 1;
            }
            self.apply_pending_adds();
            index += 1;
        }
        delivered
    }

    fn apply_pending_adds(&mut self) {
        for name in self.host.take_pending_adds() {
            self.add(&name);
        }
    }

    fn apply_removals(&mut self) {
        let removed = self.removals.take();
        if removed.is_empty() {
            return;
        }
        self.instances.retain(|instance| !removed.contains(&instance.id()));
        for id in &removed {
            self.importer.forget(*id);
        }
        tracing::debug!(removed = removed.len(), remaining = self.instances.len(), "applied removals");
    }
}
