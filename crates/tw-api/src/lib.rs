use std::borrow::Cow;
use std::ops::Deref;
use std::path::Path;
use std::process;
use std::sync::Arc;

use tracing::{error, warn};
use tw_core::{format_hash, BridgeValue, HostArg, TweakConfig, TweakError};
use tw_runtime::{BridgeError, DataStore, PluginLoader, RuntimeStatus, TweakContext};

#[derive(Clone, Default)]
pub struct TweakerOptions {
    pub config: TweakConfig,
    pub plugins: Option<Arc<dyn PluginLoader>>,
}

pub fn create_tweaker(options: TweakerOptions) -> Tweaker {
    let context = match options.plugins {
        Some(plugins) => TweakContext::with_plugin_loader(options.config, plugins),
        None => TweakContext::new(options.config),
    };
    Tweaker {
        context: Arc::new(context),
    }
}

pub fn create_tweaker_from_config_file(path: &Path) -> Result<Tweaker, TweakError> {
    let config = TweakConfig::from_json_file(path)?;
    Ok(create_tweaker(TweakerOptions {
        config,
        plugins: None,
    }))
}

/// The bytes the host parser should read: either the caller's buffer or a
/// replacement owned here and released on drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TweakedBuffer<'a> {
    Original(&'a [u8]),
    Replaced(Vec<u8>),
}

impl TweakedBuffer<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TweakedBuffer::Original(data) => data,
            TweakedBuffer::Replaced(data) => data,
        }
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self, TweakedBuffer::Replaced(_))
    }
}

impl Deref for TweakedBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// The interception layer as seen by the pipeline: a switch that stops
/// nested asset loads from being routed through the tweaker again.
pub trait AssetInterceptor {
    fn set_enabled(&self, enabled: bool);
}

/// Keeps interception off until dropped.
pub struct InterceptionSuspended<'a, I: AssetInterceptor + ?Sized> {
    interceptor: &'a I,
}

impl<'a, I: AssetInterceptor + ?Sized> InterceptionSuspended<'a, I> {
    pub fn new(interceptor: &'a I) -> Self {
        interceptor.set_enabled(false);
        Self { interceptor }
    }
}

impl<I: AssetInterceptor + ?Sized> Drop for InterceptionSuspended<'_, I> {
    fn drop(&mut self) {
        self.interceptor.set_enabled(true);
    }
}

/// Logs `error` and terminates the process.
pub fn exit_fatal(error: &TweakError) -> ! {
    error!(code = %error.code, "fatal: {}", error.message);
    process::exit(1)
}

#[derive(Clone)]
pub struct Tweaker {
    context: Arc<TweakContext>,
}

impl Tweaker {
    pub fn new(config: TweakConfig) -> Self {
        create_tweaker(TweakerOptions {
            config,
            plugins: None,
        })
    }

    pub fn context(&self) -> &Arc<TweakContext> {
        &self.context
    }

    pub fn status(&self) -> RuntimeStatus {
        self.context.status()
    }

    pub fn tweak_buffer<'a>(
        &self,
        name_hash: u64,
        ext_hash: u64,
        data: &'a [u8],
    ) -> Result<TweakedBuffer<'a>, TweakError> {
        let Ok(text) = std::str::from_utf8(data) else {
            warn!(
                name = %format_hash(name_hash),
                ext = %format_hash(ext_hash),
                "asset is not valid UTF-8, skipping tweak"
            );
            return Ok(TweakedBuffer::Original(data));
        };
        Ok(match self.context.tweak(name_hash, ext_hash, text)? {
            Cow::Borrowed(_) => TweakedBuffer::Original(data),
            Cow::Owned(text) => TweakedBuffer::Replaced(text.into_bytes()),
        })
    }

    /// Tweaks `data` and hands the result to `parse`. Interception stays
    /// suspended until `parse` returns, and the replacement buffer is
    /// released right after.
    pub fn load_asset<I, R>(
        &self,
        interceptor: &I,
        name_hash: u64,
        ext_hash: u64,
        data: &[u8],
        parse: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, TweakError>
    where
        I: AssetInterceptor + ?Sized,
    {
        let _suspended = InterceptionSuspended::new(interceptor);
        let buffer = self.tweak_buffer(name_hash, ext_hash, data)?;
        Ok(parse(buffer.as_bytes()))
    }

    /// [`Tweaker::load_asset`] for the interception hook itself, where a
    /// fatal error has nowhere to go but process exit.
    pub fn intercept<I, R>(
        &self,
        interceptor: &I,
        name_hash: u64,
        ext_hash: u64,
        data: &[u8],
        parse: impl FnOnce(&[u8]) -> R,
    ) -> R
    where
        I: AssetInterceptor + ?Sized,
    {
        match self.load_asset(interceptor, name_hash, ext_hash, data, parse) {
            Ok(parsed) => parsed,
            Err(error) => exit_fatal(&error),
        }
    }

    pub fn invoke(
        &self,
        object: &str,
        method: &str,
        args: &[HostArg],
    ) -> Result<BridgeValue, BridgeError> {
        self.context.invoke(object, method, args)
    }

    pub fn open_asset_override(&self, name_hash: u64, ext_hash: u64) -> Option<Box<dyn DataStore>> {
        self.context.open_asset_override(name_hash, ext_hash)
    }

    pub fn ignore_file(&self, name_hash: u64, ext_hash: u64) {
        self.context.ignore_file(name_hash, ext_hash);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.context.set_enabled(enabled);
    }

    pub fn host_update(&self) -> Result<(), TweakError> {
        self.context.host_update()
    }
}
