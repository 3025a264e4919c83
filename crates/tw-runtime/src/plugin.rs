use std::path::Path;

/// Capability for loading mod-supplied native extension modules.
pub trait PluginLoader: Send + Sync {
    fn load_plugin(&self, path: &Path) -> Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPluginLoader;

impl PluginLoader for UnsupportedPluginLoader {
    fn load_plugin(&self, path: &Path) -> Result<(), String> {
        Err(format!(
            "native plugins are not supported by this host (requested {})",
            path.display()
        ))
    }
}
