use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Scope};
use tracing::debug;

use crate::loader::ModuleLoader;

/// Separates a module path from one of its import aliases in
/// `{module}#{alias}` paths, which resolve to the module imported as `alias`.
pub const IMPORT_ALIAS_SEPARATOR: char = '#';

#[derive(Default)]
struct ResolverState {
    modules: HashMap<String, Arc<Module>>,
    loading: HashSet<String>,
}

/// Resolves script imports through the [`ModuleLoader`]. Each module is
/// compiled with its import path as the source name and evaluated once.
#[derive(Clone)]
pub struct ScriptModuleResolver {
    loader: Arc<ModuleLoader>,
    state: Arc<Mutex<ResolverState>>,
}

impl ScriptModuleResolver {
    pub fn new(loader: ModuleLoader) -> Self {
        Self {
            loader: Arc::new(loader),
            state: Arc::new(Mutex::new(ResolverState::default())),
        }
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    fn state(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cached_paths(&self) -> Vec<String> {
        let mut paths = self.state().modules.keys().cloned().collect::<Vec<_>>();
        paths.sort();
        paths
    }

    /// Aliases of the modules `module` imported at its top level, sorted.
    /// Empty when `module` has not finished loading.
    pub fn import_aliases(&self, module: &str) -> Vec<String> {
        let state = self.state();
        let mut aliases = state
            .modules
            .get(module)
            .map(|loaded| {
                loaded
                    .iter_sub_modules()
                    .map(|(alias, _)| alias.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        aliases.sort();
        aliases
    }

    fn imported_module(&self, module: &str, alias: &str) -> Option<Arc<Module>> {
        let state = self.state();
        let loaded = state.modules.get(module)?;
        let imported = loaded
            .iter_sub_modules()
            .find(|(name, _)| *name == alias)
            .map(|(_, imported)| Arc::clone(imported));
        imported
    }

    pub fn load_module(
        &self,
        engine: &Engine,
        path: &str,
        pos: Position,
    ) -> Result<Arc<Module>, Box<EvalAltResult>> {
        {
            let mut state = self.state();
            if let Some(module) = state.modules.get(path) {
                return Ok(Arc::clone(module));
            }
            if !state.loading.insert(path.to_string()) {
                return Err(Box::new(EvalAltResult::ErrorInModule(
                    path.to_string(),
                    Box::new(EvalAltResult::ErrorRuntime(
                        format!("Cyclic import of module \"{}\".", path).into(),
                        pos,
                    )),
                    pos,
                )));
            }
        }

        let result = self.compile_and_eval(engine, path, pos);

        let mut state = self.state();
        state.loading.remove(path);
        let module = result?;
        state.modules.insert(path.to_string(), Arc::clone(&module));
        Ok(module)
    }

    fn compile_and_eval(
        &self,
        engine: &Engine,
        path: &str,
        pos: Position,
    ) -> Result<Arc<Module>, Box<EvalAltResult>> {
        let source = self
            .loader
            .load(path)
            .ok_or_else(|| Box::new(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos)))?;

        let mut ast = engine.compile(&source.text).map_err(|error| {
            Box::new(EvalAltResult::ErrorInModule(
                path.to_string(),
                Box::new(EvalAltResult::ErrorParsing(*error.0, error.1)),
                pos,
            ))
        })?;
        ast.set_source(path);

        debug!(module = path, "evaluating module");
        let module = Module::eval_ast_as_new(Scope::new(), &ast, engine)
            .map_err(|error| Box::new(EvalAltResult::ErrorInModule(path.to_string(), error, pos)))?;
        Ok(Arc::new(module))
    }
}

impl ModuleResolver for ScriptModuleResolver {
    fn resolve(
        &self,
        engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Arc<Module>, Box<EvalAltResult>> {
        if let Some((module, alias)) = path.split_once(IMPORT_ALIAS_SEPARATOR) {
            return self
                .imported_module(module, alias)
                .ok_or_else(|| Box::new(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos)));
        }
        self.load_module(engine, path, pos)
    }
}
