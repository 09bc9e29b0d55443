//! Lazy dependency resolution over a `node_modules` tree.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::{
    CompilerSystem, InstallError, LazyError, LazyModuleResolver, PackageInstaller, Version,
    VersionRange,
};
use tessera_runtime::{InMemorySystem, NodeModulesLocator};

/// Writes a manifest into the in-memory tree, like a package manager would.
struct FakeInstaller {
    system: Arc<dyn CompilerSystem>,
    version: &'static str,
}

#[async_trait]
impl PackageInstaller for FakeInstaller {
    async fn install(&self, name: &str, _range: &VersionRange) -> Result<Version, InstallError> {
        let dir = format!("/app/node_modules/{name}");
        self.system
            .mkdir(&dir, tessera_core::MkdirOptions::recursive())
            .await;
        let manifest = format!(r#"{{"name":"{name}","version":"{}"}}"#, self.version);
        let written = self
            .system
            .write_file(&format!("{dir}/package.json"), &manifest)
            .await;
        if let Some(error) = written.error {
            return Err(InstallError::new(error.to_string()));
        }
        Version::parse(self.version).map_err(|e| InstallError::new(e.to_string()))
    }
}

fn resolver(system: &Arc<dyn CompilerSystem>, version: &'static str) -> LazyModuleResolver {
    LazyModuleResolver::new(
        Arc::new(NodeModulesLocator::new(Arc::clone(system), "/app")),
        Arc::new(FakeInstaller {
            system: Arc::clone(system),
            version,
        }),
    )
}

#[tokio::test]
async fn test_installed_in_range_is_used_as_is() {
    let system: Arc<dyn CompilerSystem> = Arc::new(InMemorySystem::new().with_files([(
        "/app/node_modules/jest/package.json",
        r#"{"version":"25.3.0"}"#,
    )]));

    let module = resolver(&system, "0.0.1").resolve("jest").await.unwrap();
    assert_eq!(module.version, Version::new(25, 3, 0));
    assert_eq!(module.path, "/app/node_modules/jest");
    assert!(!module.acquired);
}

#[tokio::test]
async fn test_missing_package_is_acquired() {
    let system: Arc<dyn CompilerSystem> = Arc::new(InMemorySystem::new());

    let module = resolver(&system, "25.1.0").resolve("jest").await.unwrap();
    assert_eq!(module.version, Version::new(25, 1, 0));
    assert!(module.acquired);
    assert!(system.access("/app/node_modules/jest/package.json").await);
}

#[tokio::test]
async fn test_out_of_range_acquisition_is_unavailable() {
    let system: Arc<dyn CompilerSystem> = Arc::new(InMemorySystem::new());

    let err = resolver(&system, "1.0.0").resolve("jest").await.unwrap_err();
    assert!(matches!(err, LazyError::DependencyUnavailable { ref name, .. } if name == "jest"));
}
