use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Scope, AST};

use super::error::ReloadError;
use super::importer::Importer;
use crate::interop::{register_api, DataStore, Host, InstanceId, ScriptHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Loading,
    Ready,
    Faulted,
}

/// Lifecycle callbacks a script may define at top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryPoint {
    OnInit,
    OnUpdate,
    OnDraw,
    OnMessage,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 4] = [EntryPoint::OnInit, EntryPoint::OnUpdate, EntryPoint::OnDraw, EntryPoint::OnMessage];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryPoint::OnInit => "OnInit",
            EntryPoint::OnUpdate => "OnUpdate",
            EntryPoint::OnDraw => "OnDraw",
            EntryPoint::OnMessage => "OnMessage",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
enum Callable {
    /// `fn OnUpdate() { ... }` compiled into the AST.
    Function,
    /// Top-level binding holding a function pointer or closure.
    Pointer(FnPtr),
}

/// Entry points found by the most recent successful load. Never synthesized.
#[derive(Clone, Default)]
pub struct EntryPointTable {
    entries: BTreeMap<EntryPoint, Callable>,
}

impl EntryPointTable {
    fn discover(ast: &AST, scope: &Scope) -> Self {
        let mut entries = BTreeMap::new();
        for entry in EntryPoint::ALL {
            if ast.iter_functions().any(|f| f.name == entry.as_str()) {
                entries.insert(entry, Callable::Function);
            } else if let Some(pointer) = scope.get_value::<FnPtr>(entry.as_str()) {
                entries.insert(entry, Callable::Pointer(pointer));
            }
        }
        Self { entries }
    }

    pub fn contains(&self, entry: EntryPoint) -> bool {
        self.entries.contains_key(&entry)
    }

    pub fn names(&self) -> Vec<EntryPoint> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for EntryPointTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// The part of an instance that survives reloads.
pub struct Namespace {
    host: Host,
    data: DataStore,
    handle: ScriptHandle,
}

impl Namespace {
    pub fn new(host: Host, handle: ScriptHandle) -> Self {
        Self { host, data: DataStore::new(), handle }
    }

    fn lookup(&self, name: &str) -> Option<Dynamic> {
        match name {
            "Host" => Some(Dynamic::from(self.host.clone())),
            "Data" => Some(Dynamic::from(self.data.clone())),
            "Script" => Some(Dynamic::from(self.handle.clone())),
            _ => None,
        }
    }

    fn scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        scope.push_constant("Host", self.host.clone());
        scope.push_constant("Data", self.data.clone());
        scope.push_constant("Script", self.handle.clone());
        scope
    }
}

/// The part of an instance replaced wholesale by each successful reload.
struct Binding {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    entry_points: EntryPointTable,
    generation: u64,
}

/// Observable instance state, comparable across reload attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub state: InstanceState,
    pub running: bool,
    pub initialized: bool,
    pub load_time: Option<SystemTime>,
    pub entry_points: Vec<EntryPoint>,
    pub generation: Option<u64>,
}

/// One script file bound to a name, reloadable in place.
pub struct ScriptInstance {
    id: InstanceId,
    name: String,
    source_path: PathBuf,
    state: InstanceState,
    running: bool,
    initialized: bool,
    load_time: Option<SystemTime>,
    namespace: Rc<Namespace>,
    binding: Option<Binding>,
    generations: u64,
    last_error: Option<String>,
}

impl ScriptInstance {
    /// Creates an instance in `Loading` state. Nothing is read until [`reload`](Self::reload).
    pub fn new(name: &str, source_path: impl Into<PathBuf>, namespace: Namespace) -> Self {
        Self {
            id: namespace.handle.id(),
            name: name.to_string(),
            source_path: source_path.into(),
            state: InstanceState::Loading,
            running: false,
            initialized: false,
            load_time: None,
            namespace: Rc::new(namespace),
            binding: None,
            generations: 0,
            last_error: None,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn load_time(&self) -> Option<SystemTime> {
        self.load_time
    }

    pub fn data(&self) -> &DataStore {
        &self.namespace.data
    }

    pub fn handle(&self) -> &ScriptHandle {
        &self.namespace.handle
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn entry_points(&self) -> Vec<EntryPoint> {
        self.binding.as_ref().map(|binding| binding.entry_points.names()).unwrap_or_default()
    }

    pub fn has_entry_point(&self, entry: EntryPoint) -> bool {
        self.binding.as_ref().is_some_and(|binding| binding.entry_points.contains(entry))
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            state: self.state,
            running: self.running,
            initialized: self.initialized,
            load_time: self.load_time,
            entry_points: self.entry_points(),
            generation: self.binding.as_ref().map(|binding| binding.generation),
        }
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub(crate) fn stop(&mut self) {
        self.running = false;
    }

    /// Reads, compiles and runs the current source, then installs the result.
    ///
    /// Either every step succeeds and the new binding replaces the old one, or
    /// the instance is left exactly as it was (apart from `last_error`).
    pub fn reload(&mut self, importer: &Importer) -> Result<(), ReloadError> {
        self.state = InstanceState::Loading;
        match self.build(importer) {
            Ok(mut binding) => {
                self.generations += 1;
                binding.generation = self.generations;
                tracing::info!(script = %self.name, entry_points = ?binding.entry_points, "script loaded");
                self.binding = Some(binding);
                self.state = InstanceState::Ready;
                self.load_time = Some(SystemTime::now());
                self.running = true;
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                self.state = if self.binding.is_some() { InstanceState::Ready } else { InstanceState::Faulted };
                let message = err.to_string();
                if self.last_error.as_deref() == Some(message.as_str()) {
                    tracing::debug!(script = %self.name, step = err.step(), "reload still failing");
                } else {
                    tracing::warn!(script = %self.name, step = err.step(), "reload aborted: {message}");
                }
                self.last_error = Some(message);
                Err(err)
            }
        }
    }

    fn build(&self, importer: &Importer) -> Result<Binding, ReloadError> {
        let source = fs::read_to_string(&self.source_path)
            .map_err(|source| ReloadError::Read { path: self.source_path.clone(), source })?;

        let engine = self.new_engine(importer);
        let namespace_scope = self.namespace.scope();

        engine
            .compile_with_scope(&namespace_scope, &source)
            .map_err(|err| ReloadError::Parse { script: self.name.clone(), message: err.to_string() })?;
        let ast = engine
            .compile_into_self_contained(&namespace_scope, &source)
            .map_err(|err| ReloadError::Compile { script: self.name.clone(), message: err.to_string() })?;

        let mut scope = namespace_scope;
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|err| ReloadError::Run { script: self.name.clone(), message: err.to_string() })?;

        let entry_points = EntryPointTable::discover(&ast, &scope);
        Ok(Binding { engine, ast, scope, entry_points, generation: 0 })
    }

    fn new_engine(&self, importer: &Importer) -> Engine {
        let mut engine = Engine::new();
        register_api(&mut engine);
        engine.set_module_resolver(importer.scoped(self.id()));

        let namespace = Rc::clone(&self.namespace);
        let globals = importer.clone();
        engine.on_var(move |name, _index, _context| {
            Ok(if globals.is_global(name) { namespace.lookup(name) } else { None })
        });

        let script = self.name.clone();
        engine.on_print(move |text| tracing::info!(script = %script, "{text}"));
        let script = self.name.clone();
        engine.on_debug(move |text, _source, pos| tracing::debug!(script = %script, %pos, "{text}"));
        engine
    }

    /// Calls `entry` on the current binding. Does not check `running` and never demotes.
    pub(crate) fn call(&mut self, entry: EntryPoint, args: Vec<Dynamic>) -> Option<Result<Dynamic, Box<EvalAltResult>>> {
        if self.state != InstanceState::Ready {
            return None;
        }
        let binding = self.binding.as_mut()?;
        let callable = binding.entry_points.entries.get(&entry)?.clone();
        Some(match callable {
            Callable::Function => binding.engine.call_fn_with_options::<Dynamic>(
                CallFnOptions::new().eval_ast(false).rewind_scope(true),
                &mut binding.scope,
                &binding.ast,
                entry.as_str(),
                args,
            ),
            Callable::Pointer(pointer) => pointer.call::<Dynamic>(&binding.engine, &binding.ast, args),
        })
    }
}

impl fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("running", &self.running)
            .field("initialized", &self.initialized)
            .finish()
    }
}
