//! Installed-package lookup in a `node_modules` tree.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tessera_core::paths::join_paths;
use tessera_core::{CompilerSystem, InstalledModule, ModuleLocator, Version};
use tracing::debug;

#[derive(Deserialize)]
struct PackageManifest {
    version: String,
}

/// Reads `<root>/node_modules/<name>/package.json` through a
/// `CompilerSystem`, so it works on every host.
pub struct NodeModulesLocator {
    system: Arc<dyn CompilerSystem>,
    root: String,
}

impl NodeModulesLocator {
    pub fn new(system: Arc<dyn CompilerSystem>, root: &str) -> Self {
        let root = system.resolve_path(root);
        Self { system, root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Directory a package named `name` would be installed in.
    pub fn package_dir(&self, name: &str) -> String {
        join_paths(&self.root, &format!("node_modules/{name}"))
    }
}

#[async_trait]
impl ModuleLocator for NodeModulesLocator {
    async fn locate(&self, name: &str) -> Option<InstalledModule> {
        let dir = self.package_dir(name);
        let raw = self
            .system
            .read_file(&join_paths(&dir, "package.json"))
            .await?;

        let manifest: PackageManifest = match serde_json::from_str(&raw) {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!(package = name, error = %e, "Unreadable package manifest");
                return None;
            }
        };
        let version = match Version::parse(&manifest.version) {
            Ok(version) => version,
            Err(e) => {
                debug!(package = name, error = %e, "Unparseable package version");
                return None;
            }
        };

        Some(InstalledModule {
            name: name.to_string(),
            version,
            path: dir,
        })
    }
}
