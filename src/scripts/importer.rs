use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Scope, Shared};
use walkdir::WalkDir;

use crate::interop::InstanceId;

struct CachedModule {
    modified: Option<SystemTime>,
    module: Shared<Module>,
}

struct ImporterState {
    index: HashMap<String, PathBuf>,
    globals: Vec<String>,
    cache: RefCell<HashMap<(InstanceId, PathBuf), CachedModule>>,
}

/// Process-wide library index for `import` statements.
///
/// Libraries live under one directory tree and are addressed by file stem, so
/// `import "math"` finds `libraries/util/math.rhai`. The stem index and the set
/// of builtin global names are fixed at construction.
///
/// A library's top level may read `Data` and `Script`, so evaluated modules are
/// cached per importing instance. Resolution goes through [`Importer::scoped`].
#[derive(Clone)]
pub struct Importer {
    state: Rc<ImporterState>,
}

impl Importer {
    pub fn new(root: impl Into<PathBuf>, globals: &[&str]) -> Result<Self> {
        let root = root.into();
        let mut files = Vec::new();
        if root.is_dir() {
            collect_files(&root, &mut files)?;
        } else {
            tracing::debug!(dir = %root.display(), "library directory missing; imports will not resolve");
        }
        files.sort();

        let mut index: HashMap<String, PathBuf> = HashMap::new();
        for file in files {
            let Some(stem) = file.file_stem().and_then(|stem| stem.to_str()).map(str::to_string) else {
                continue;
            };
            if let Some(existing) = index.get(&stem) {
                tracing::warn!(
                    library = %stem,
                    kept = %existing.display(),
                    ignored = %file.display(),
                    "duplicate library stem"
                );
                continue;
            }
            index.insert(stem, file);
        }
        tracing::info!(dir = %root.display(), libraries = index.len(), "indexed script libraries");

        Ok(Self {
            state: Rc::new(ImporterState {
                index,
                globals: globals.iter().map(|name| name.to_string()).collect(),
                cache: RefCell::new(HashMap::new()),
            }),
        })
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.state.globals.iter().any(|global| global == name)
    }

    pub fn library_path(&self, name: &str) -> Option<&Path> {
        self.state.index.get(module_stem(name)).map(PathBuf::as_path)
    }

    pub fn library_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.state.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolver for the engine bound to instance `owner`.
    pub fn scoped(&self, owner: InstanceId) -> ScopedImporter {
        ScopedImporter { importer: self.clone(), owner }
    }

    /// Drops every module evaluated for `owner`.
    pub(crate) fn forget(&self, owner: InstanceId) {
        self.state.cache.borrow_mut().retain(|(id, _), _| *id != owner);
    }

    fn load(
        &self,
        owner: InstanceId,
        engine: &Engine,
        file: &Path,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        let key = (owner, file.to_path_buf());
        let modified = fs::metadata(file).and_then(|meta| meta.modified()).ok();
        if let Some(cached) = self.state.cache.borrow().get(&key) {
            if cached.modified == modified {
                return Ok(cached.module.clone());
            }
        }

        let in_module = |err: Box<EvalAltResult>| Box::new(EvalAltResult::ErrorInModule(path.to_string(), err, pos));
        let source = fs::read_to_string(file)
            .map_err(|err| in_module(format!("reading {}: {err}", file.display()).into()))?;
        let ast = engine.compile(&source).map_err(|err| in_module(err.into()))?;
        let mut module = Module::eval_ast_as_new(Scope::new(), &ast, engine).map_err(in_module)?;
        module.build_index();
        let module: Shared<Module> = module.into();

        tracing::debug!(library = %path, file = %file.display(), owner, "library module loaded");
        self.state.cache.borrow_mut().insert(key, CachedModule { modified, module: module.clone() });
        Ok(module)
    }
}

/// [`Importer`] view installed as the module resolver of one instance's engine.
#[derive(Clone)]
pub struct ScopedImporter {
    importer: Importer,
    owner: InstanceId,
}

impl ModuleResolver for ScopedImporter {
    fn resolve(
        &self,
        engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        match self.importer.state.index.get(module_stem(path)) {
            Some(file) => self.importer.load(self.owner, engine, file, path, pos),
            None => Err(Box::new(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos))),
        }
    }
}

/// `"util/math.rhai"`, `"math.rhai"` and `"math"` all name the library `math`.
fn module_stem(path: &str) -> &str {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file.rfind('.') {
        Some(0) | None => file,
        Some(dot) => &file[..dot],
    }
}

fn collect_files(root: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err).with_context(|| format!("Reading library directory {}", root.display()));
            }
            Err(err) => {
                tracing::warn!(dir = %root.display(), "skipping library entry: {err}");
                continue;
            }
        };
        if entry.file_type().is_file() {
            out.push(entry.into_path());
        }
    }
    Ok(())
}
