use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use anyhow::{bail, Result};
use rand::Rng;

use super::{HostValue, MarshalError};
use crate::assets::{AssetCache, ImageHandle};

/// Registry-assigned identity of a script instance.
pub type InstanceId = u64;

struct HostState {
    frame: Cell<i64>,
    width: u32,
    height: u32,
    screen: RefCell<ImageHandle>,
    assets: RefCell<AssetCache>,
    pending_adds: RefCell<Vec<String>>,
}

/// Process-wide capability surface shared by every script instance.
///
/// Built once by the registry and handed to scripts as `Host`. Interior
/// mutability is plain `Cell`/`RefCell`: dispatch is single-threaded and never
/// re-entrant across instances.
#[derive(Clone)]
pub struct Host {
    state: Rc<HostState>,
}

impl Host {
    pub fn new(width: u32, height: u32, assets: AssetCache) -> Self {
        Self {
            state: Rc::new(HostState {
                frame: Cell::new(0),
                width,
                height,
                screen: RefCell::new(ImageHandle::new(width, height)),
                assets: RefCell::new(assets),
                pending_adds: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn frame(&self) -> i64 {
        self.state.frame.get()
    }

    pub(crate) fn advance_frame(&self) {
        self.state.frame.set(self.state.frame.get() + 1);
    }

    pub fn screen_width(&self) -> u32 {
        self.state.width
    }

    pub fn screen_height(&self) -> u32 {
        self.state.height
    }

    pub fn screen(&self) -> ImageHandle {
        self.state.screen.borrow().clone()
    }

    pub(crate) fn set_screen(&self, surface: &ImageHandle) {
        *self.state.screen.borrow_mut() = surface.clone();
    }

    pub fn load_image(&self, path: &str) -> Result<ImageHandle> {
        self.state.assets.borrow_mut().load_image(path)
    }

    pub fn cached_assets(&self) -> usize {
        self.state.assets.borrow().len()
    }

    /// Queues `name` to be instantiated by the registry as soon as the current dispatch returns.
    pub fn request_add(&self, name: &str) {
        self.state.pending_adds.borrow_mut().push(name.to_string());
    }

    pub(crate) fn take_pending_adds(&self) -> Vec<String> {
        std::mem::take(&mut *self.state.pending_adds.borrow_mut())
    }

    /// Uniform sample from `min..max`, or `min` for an empty range. The span must be finite.
    pub fn random_range(&self, min: f64, max: f64) -> Result<f64> {
        if !(max - min).is_finite() {
            bail!("Rand range {min}..{max} is not finite");
        }
        Ok(if min < max { rand::thread_rng().gen_range(min..max) } else { min })
    }

    pub fn ptr_eq(&self, other: &Host) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("frame", &self.frame())
            .field("width", &self.state.width)
            .field("height", &self.state.height)
            .finish()
    }
}

/// Per-instance key/value store that outlives reloads. Values are stored in host form.
#[derive(Clone, Default)]
pub struct DataStore {
    entries: Rc<RefCell<BTreeMap<String, HostValue>>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: HostValue) {
        self.entries.borrow_mut().insert(key.into(), value);
    }

    /// Replaces the whole store with `entries`.
    pub fn set_all(&self, entries: BTreeMap<String, HostValue>) {
        *self.entries.borrow_mut() = entries;
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub(crate) fn set_dynamic(&self, key: &str, value: rhai::Dynamic) -> Result<(), MarshalError> {
        let value = HostValue::from_dynamic(value)?;
        self.set(key, value);
        Ok(())
    }

    pub(crate) fn set_all_dynamic(&self, entries: rhai::Map) -> Result<(), MarshalError> {
        let entries = entries
            .into_iter()
            .map(|(key, value)| HostValue::from_dynamic(value).map(|value| (key.to_string(), value)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        self.set_all(entries);
        Ok(())
    }

    pub fn ptr_eq(&self, other: &DataStore) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.borrow().iter()).finish()
    }
}

/// Instances the registry must drop after the current frame's draw phase.
#[derive(Clone, Default)]
pub struct RemovalQueue {
    pending: Rc<RefCell<Vec<InstanceId>>>,
}

impl RemovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, id: InstanceId) {
        let mut pending = self.pending.borrow_mut();
        if !pending.contains(&id) {
            pending.push(id);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    pub(crate) fn take(&self) -> Vec<InstanceId> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }
}

/// A script's handle on its own instance. Refers to the instance by id only, so
/// a script holding it never keeps the instance alive.
#[derive(Clone)]
pub struct ScriptHandle {
    id: InstanceId,
    name: Rc<str>,
    removals: RemovalQueue,
}

impl ScriptHandle {
    pub fn new(id: InstanceId, name: &str, removals: RemovalQueue) -> Self {
        Self { id, name: Rc::from(name), removals }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn remove(&self) {
        self.removals.push(self.id);
    }
}

impl fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHandle").field("id", &self.id).field("name", &self.name).finish()
    }
}
