use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use rhai::module_resolvers::ModuleResolversCollection;
use rhai::{Dynamic, Engine, EvalAltResult, Map, Position, Scope, AST};
use tracing::{debug, info};
use tw_core::{format_hash, TweakConfig, TweakError};

use crate::bindings::{BindingDispatcher, BindingEnv, NATIVE_MODULES, SCRIPT_LOG_TARGET};
use crate::loader::ModuleLoader;
use crate::resolver::{ScriptModuleResolver, IMPORT_ALIAS_SEPARATOR};
use crate::signature::CallSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Compile,
    Runtime,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Compile => f.write_str("compile"),
            FailureKind::Runtime => f.write_str("runtime"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CallFailure {
    fn from_eval(error: &EvalAltResult) -> Self {
        let kind = if is_compile_error(error) {
            FailureKind::Compile
        } else {
            FailureKind::Runtime
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

pub fn is_compile_error(error: &EvalAltResult) -> bool {
    match error {
        EvalAltResult::ErrorParsing(..) => true,
        EvalAltResult::ErrorInModule(_, inner, _)
        | EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_compile_error(inner),
        _ => false,
    }
}

fn string_literal(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Re-imports every alias of `module` before calling `target.name(args..)`,
/// so closures created there can still reach the modules it imported.
fn call_handle_source(module: Option<&str>, aliases: &[String], signature: &CallSignature) -> String {
    let mut source = String::new();
    if let Some(module) = module {
        for alias in aliases {
            let path = format!("{}{}{}", module, IMPORT_ALIAS_SEPARATOR, alias);
            source.push_str(&format!("import {} as {};\n", string_literal(&path), alias));
        }
    }
    let args = (0..signature.arity())
        .map(|index| format!("arg{}", index))
        .collect::<Vec<_>>()
        .join(", ");
    source.push_str(&format!("target.{}({})", signature.name(), args));
    source
}

/// The embedded runtime after a successful bootstrap. Not thread-safe on its
/// own; callers serialize access through the owning context.
/// The base object is a shared value: state a script keeps in `this`
/// persists across calls.
pub struct EmbeddedRuntime {
    engine: Engine,
    scripts: ScriptModuleResolver,
    base_object: Dynamic,
    entry_module: String,
    tweak_signature: CallSignature,
    update_name: String,
    call_handles: HashMap<(Option<String>, CallSignature), AST>,
}

impl EmbeddedRuntime {
    pub fn bootstrap(config: &TweakConfig, env: &BindingEnv) -> Result<Self, TweakError> {
        let mut engine = Engine::new();
        engine.on_print(|text| info!(target: SCRIPT_LOG_TARGET, "[SCRIPT] {}", text));
        engine.on_debug(|text, source, pos| {
            debug!(
                target: SCRIPT_LOG_TARGET,
                "[SCRIPT DEBUG] {} @ {}: {}",
                source.unwrap_or("<call>"),
                pos,
                text
            )
        });

        let natives = BindingDispatcher::new(env).install(&mut engine, NATIVE_MODULES)?;
        let scripts = ScriptModuleResolver::new(ModuleLoader::new(config.clone()));
        let mut resolvers = ModuleResolversCollection::new();
        resolvers.push(natives);
        resolvers.push(scripts.clone());
        engine.set_module_resolver(resolvers);

        let entry = scripts
            .load_module(&engine, &config.entry_module, Position::NONE)
            .map_err(|error| {
                let failure = CallFailure::from_eval(&error);
                TweakError::fatal(
                    "RUNTIME_BOOTSTRAP_FAILED",
                    format!(
                        "Failed to initialise module \"{}\" ({}).",
                        config.entry_module, failure
                    ),
                )
            })?;
        let base_object = entry
            .get_var_value::<Dynamic>(&config.base_object)
            .ok_or_else(|| {
                TweakError::fatal(
                    "RUNTIME_BASE_OBJECT_MISSING",
                    format!(
                        "Module \"{}\" does not export \"{}\".",
                        config.entry_module, config.base_object
                    ),
                )
            })?;

        // Exported constants arrive read-only; `this` must stay writable.
        let writable = base_object
            .read_lock::<Map>()
            .map(|map| Dynamic::from_map(map.clone()));
        let base_object = writable.unwrap_or(base_object).into_shared();

        info!(
            entry = %config.entry_module,
            modules = scripts.cached_paths().len(),
            "embedded runtime initialised"
        );
        Ok(Self {
            engine,
            scripts,
            base_object,
            entry_module: config.entry_module.clone(),
            tweak_signature: CallSignature::new(config.tweak_method.clone(), 3),
            update_name: config.update_method.clone(),
            call_handles: HashMap::new(),
        })
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.scripts.cached_paths()
    }

    /// Calls `target.name(args..)` inside the imports of `module`, the script
    /// module that created `target`. A syntax error in the generated call is
    /// a compile failure; anything raised while it runs is a runtime failure.
    pub fn call(
        &mut self,
        target: &Dynamic,
        module: Option<&str>,
        signature: &CallSignature,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, CallFailure> {
        let key = (module.map(str::to_string), signature.clone());
        let ast = match self.call_handles.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(signature = %signature, module = ?module, "compiling call handle");
                let aliases = module
                    .map(|module| self.scripts.import_aliases(module))
                    .unwrap_or_default();
                let mut ast = self
                    .engine
                    .compile(call_handle_source(module, &aliases, signature))
                    .map_err(|error| CallFailure {
                        kind: FailureKind::Compile,
                        message: error.to_string(),
                    })?;
                if let Some(module) = module {
                    ast.set_source(module);
                }
                entry.insert(ast)
            }
        };

        let mut scope = Scope::new();
        scope.push_dynamic("target", target.clone());
        for (index, value) in args.into_iter().enumerate() {
            scope.push_dynamic(format!("arg{}", index), value);
        }
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|error| CallFailure::from_eval(&error))
    }

    pub fn tweak(&mut self, name_hash: u64, ext_hash: u64, text: &str) -> Result<String, CallFailure> {
        let target = self.base_object.clone();
        let module = self.entry_module.clone();
        let signature = self.tweak_signature.clone();
        let args = vec![
            Dynamic::from(format_hash(name_hash)),
            Dynamic::from(format_hash(ext_hash)),
            Dynamic::from(text.to_string()),
        ];
        let result = self.call(&target, Some(&module), &signature, args)?;
        let type_name = result.type_name();
        result.into_string().map_err(|_| CallFailure {
            kind: FailureKind::Runtime,
            message: format!("{} returned {} instead of a string", signature, type_name),
        })
    }

    pub fn has_update(&self) -> bool {
        self.base_object
            .read_lock::<Map>()
            .is_some_and(|map| map.contains_key(self.update_name.as_str()))
    }

    pub fn update(&mut self) -> Result<(), CallFailure> {
        let target = self.base_object.clone();
        let module = self.entry_module.clone();
        let signature = CallSignature::new(self.update_name.clone(), 0);
        self.call(&target, Some(&module), &signature, Vec::new())
            .map(|_| ())
    }
}
