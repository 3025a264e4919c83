mod builtin;
mod datastore;
pub mod manifest;
mod xml;

use std::any::TypeId;
use std::ops::Deref;
use std::sync::Arc;

use rhai::module_resolvers::StaticModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Module, NativeCallContext, Position};
use tracing::debug;
use tw_core::TweakError;

use crate::asset_hooks::AssetHookRegistry;
use crate::fatal::FatalSignal;
use crate::plugin::PluginLoader;
use crate::registry::ObjectRegistry;
use crate::signature::CallSignature;

pub use builtin::{file_info, list_directory, BuiltinBindings, SCRIPT_LOG_TARGET};
pub use datastore::{DatastoreBindings, ScriptAssetHook};
pub use manifest::{ClassDecl, MethodDecl, NativeModuleDecl, NATIVE_MODULES};
pub use xml::{ScriptDocument, ScriptNode, XmlBindings};

pub type ScriptResult = Result<Dynamic, Box<EvalAltResult>>;

pub type ForeignFn =
    Arc<dyn Fn(&NativeCallContext<'_>, &mut [&mut Dynamic]) -> ScriptResult + Send + Sync>;

pub(crate) fn foreign(
    func: impl Fn(&NativeCallContext<'_>, &mut [&mut Dynamic]) -> ScriptResult + Send + Sync + 'static,
) -> ForeignFn {
    Arc::new(func)
}

#[derive(Clone, Copy)]
pub struct ForeignClass {
    pub type_name: &'static str,
    pub type_id: TypeId,
    register: fn(&mut Engine, &'static str),
}

fn register_type<T: Clone + Send + Sync + 'static>(engine: &mut Engine, type_name: &'static str) {
    engine.register_type_with_name::<T>(type_name);
}

impl ForeignClass {
    pub fn of<T: Clone + Send + Sync + 'static>(type_name: &'static str) -> Self {
        Self {
            type_name,
            type_id: TypeId::of::<T>(),
            register: register_type::<T>,
        }
    }

    fn register(&self, engine: &mut Engine) {
        (self.register)(engine, self.type_name);
    }
}

/// Services the native bindings call back into.
#[derive(Clone)]
pub struct BindingEnv {
    pub registry: Arc<ObjectRegistry>,
    pub asset_hooks: Arc<AssetHookRegistry>,
    pub plugins: Arc<dyn PluginLoader>,
    pub fatal: Arc<FatalSignal>,
}

pub trait ForeignResolver {
    fn bind_class(&self, module: &str, class: &str) -> Option<ForeignClass>;
    fn bind_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignFn>;
}

pub enum BindingResolver {
    Xml(XmlBindings),
    Datastore(DatastoreBindings),
    Builtin(BuiltinBindings),
}

impl ForeignResolver for BindingResolver {
    fn bind_class(&self, module: &str, class: &str) -> Option<ForeignClass> {
        match self {
            BindingResolver::Xml(bindings) => bindings.bind_class(module, class),
            BindingResolver::Datastore(bindings) => bindings.bind_class(module, class),
            BindingResolver::Builtin(bindings) => bindings.bind_class(module, class),
        }
    }

    fn bind_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignFn> {
        match self {
            BindingResolver::Xml(bindings) => bindings.bind_method(module, class, is_static, signature),
            BindingResolver::Datastore(bindings) => {
                bindings.bind_method(module, class, is_static, signature)
            }
            BindingResolver::Builtin(bindings) => {
                bindings.bind_method(module, class, is_static, signature)
            }
        }
    }
}

/// Tries each resolver in order; the first match wins.
pub struct BindingDispatcher {
    resolvers: Vec<BindingResolver>,
}

impl BindingDispatcher {
    pub fn new(env: &BindingEnv) -> Self {
        Self::with_resolvers(vec![
            BindingResolver::Xml(XmlBindings),
            BindingResolver::Datastore(DatastoreBindings::new(Arc::clone(&env.asset_hooks))),
            BindingResolver::Builtin(BuiltinBindings::new(env)),
        ])
    }

    pub fn with_resolvers(resolvers: Vec<BindingResolver>) -> Self {
        Self { resolvers }
    }

    /// Registers every foreign class of `modules` with `engine` and builds the
    /// native module table. Instance methods are registered globally on the
    /// class type; static methods live in a sub-module named after the class.
    pub fn install(
        &self,
        engine: &mut Engine,
        modules: &[NativeModuleDecl],
    ) -> Result<StaticModuleResolver, TweakError> {
        let mut resolver = StaticModuleResolver::new();
        for decl in modules {
            let mut module = Module::new();
            for class in decl.classes {
                let class_module = self.install_class(engine, decl.path, class)?;
                module.set_sub_module(class.name, class_module);
            }
            debug!(module = decl.path, "registered native module");
            resolver.insert(decl.path, module);
        }
        Ok(resolver)
    }

    fn install_class(
        &self,
        engine: &mut Engine,
        module_path: &str,
        class: &ClassDecl,
    ) -> Result<Module, TweakError> {
        let receiver = if class.foreign {
            let bound = self.bind_class(module_path, class.name).ok_or_else(|| {
                TweakError::fatal(
                    "BINDING_CLASS_UNRESOLVED",
                    format!(
                        "Could not find foreign class \"{}\" in module \"{}\".",
                        class.name, module_path
                    ),
                )
            })?;
            bound.register(engine);
            Some(bound.type_id)
        } else {
            None
        };

        let mut class_module = Module::new();
        for method in class.methods {
            let signature = CallSignature::parse(method.signature).ok_or_else(|| {
                TweakError::fatal(
                    "BINDING_SIGNATURE_INVALID",
                    format!(
                        "Foreign method \"{}.{}\" has a malformed signature.",
                        class.name, method.signature
                    ),
                )
            })?;
            let func = self
                .bind_method(module_path, class.name, method.is_static, method.signature)
                .ok_or_else(|| {
                    TweakError::fatal(
                        "BINDING_METHOD_UNRESOLVED",
                        format!(
                            "Could not find foreign method \"{}.{}\" in module \"{}\".",
                            class.name, method.signature, module_path
                        ),
                    )
                })?;
            let dynamic_args = vec![TypeId::of::<Dynamic>(); signature.arity()];

            if method.is_static {
                set_static_fn(&mut class_module, signature.name(), signature.arity(), func)
                    .ok_or_else(|| {
                        TweakError::fatal(
                            "BINDING_SIGNATURE_INVALID",
                            format!(
                                "Static method \"{}.{}\" takes more than {} arguments.",
                                class.name, method.signature, MAX_STATIC_ARITY
                            ),
                        )
                    })?;
                continue;
            }

            let receiver = receiver.ok_or_else(|| {
                TweakError::fatal(
                    "BINDING_METHOD_UNRESOLVED",
                    format!(
                        "Instance method \"{}.{}\" requires a foreign class.",
                        class.name, method.signature
                    ),
                )
            })?;
            let mut arg_types = Vec::with_capacity(dynamic_args.len() + 1);
            arg_types.push(receiver);
            arg_types.extend(dynamic_args);
            engine.register_raw_fn(
                signature.name().to_string(),
                arg_types,
                move |context, args| func(&context, args),
            );
        }
        Ok(class_module)
    }
}

const MAX_STATIC_ARITY: usize = 3;

/// Static methods are plain module functions taking `Dynamic` parameters.
fn set_static_fn(module: &mut Module, name: &str, arity: usize, func: ForeignFn) -> Option<u64> {
    let hash = match arity {
        0 => module.set_native_fn(name, move |context: NativeCallContext| {
            func(&context, &mut [])
        }),
        1 => module.set_native_fn(name, move |context: NativeCallContext, mut a: Dynamic| {
            func(&context, &mut [&mut a])
        }),
        2 => module.set_native_fn(
            name,
            move |context: NativeCallContext, mut a: Dynamic, mut b: Dynamic| {
                func(&context, &mut [&mut a, &mut b])
            },
        ),
        3 => module.set_native_fn(
            name,
            move |context: NativeCallContext, mut a: Dynamic, mut b: Dynamic, mut c: Dynamic| {
                func(&context, &mut [&mut a, &mut b, &mut c])
            },
        ),
        _ => return None,
    };
    Some(hash)
}

impl ForeignResolver for BindingDispatcher {
    fn bind_class(&self, module: &str, class: &str) -> Option<ForeignClass> {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.bind_class(module, class))
    }

    fn bind_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignFn> {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.bind_method(module, class, is_static, signature))
    }
}

pub(crate) fn script_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message.into()),
        Position::NONE,
    ))
}

pub(crate) fn string_arg(args: &[&mut Dynamic], index: usize, call: &str) -> Result<String, Box<EvalAltResult>> {
    let value = args
        .get(index)
        .ok_or_else(|| script_error(format!("{}: missing argument {}.", call, index + 1)))?;
    (**value).clone().into_string().map_err(|actual| {
        script_error(format!(
            "{}: argument {} must be a string, got {}.",
            call,
            index + 1,
            actual
        ))
    })
}

pub(crate) fn bool_arg(args: &[&mut Dynamic], index: usize, call: &str) -> Result<bool, Box<EvalAltResult>> {
    let value = args
        .get(index)
        .ok_or_else(|| script_error(format!("{}: missing argument {}.", call, index + 1)))?;
    value.as_bool().map_err(|actual| {
        script_error(format!(
            "{}: argument {} must be a bool, got {}.",
            call,
            index + 1,
            actual
        ))
    })
}

pub(crate) fn typed_arg<'a, T: Clone + Send + Sync + 'static>(
    args: &'a [&mut Dynamic],
    index: usize,
    call: &str,
    expected: &str,
) -> Result<impl Deref<Target = T> + 'a, Box<EvalAltResult>> {
    args.get(index)
        .and_then(|value| value.read_lock::<T>())
        .ok_or_else(|| {
            script_error(format!(
                "{}: argument {} must be {}.",
                call,
                index + 1,
                expected
            ))
        })
}
