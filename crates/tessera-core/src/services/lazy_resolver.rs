//! On-demand resolution of optional heavyweight dependencies.
//!
//! Each declared dependency carries a closed version range. `resolve` reads
//! the installed version through a `ModuleLocator`; if it is missing or out
//! of range the `PackageInstaller` acquires one inside the range and the
//! locator is asked again. Successful resolutions are cached for the life
//! of the resolver. Concurrent requests for one name share a single
//! in-flight resolution, so acquisition runs at most once at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{Version, VersionRange};
use crate::ports::{InstalledModule, ModuleLocator, PackageInstaller};

/// Dependencies the toolchain may pull in when a feature first needs them.
const DEFAULT_DEPENDENCIES: &[(&str, (u64, u64, u64), (u64, u64, u64))] = &[
    ("@types/jest", (24, 9, 1), (25, 2, 3)),
    ("@types/puppeteer", (1, 19, 0), (2, 0, 1)),
    ("jest", (24, 9, 0), (26, 0, 1)),
    ("jest-cli", (24, 9, 0), (26, 0, 1)),
    ("pixelmatch", (4, 0, 2), (4, 0, 2)),
    ("puppeteer", (1, 19, 0), (2, 1, 1)),
    ("puppeteer-core", (1, 19, 0), (2, 1, 1)),
    ("workbox-build", (4, 3, 1), (4, 3, 1)),
];

/// The built-in dependency table.
pub fn default_lazy_dependencies() -> HashMap<String, VersionRange> {
    DEFAULT_DEPENDENCIES
        .iter()
        .filter_map(|(name, min, max)| {
            let range = VersionRange::new(
                Version::new(min.0, min.1, min.2),
                Version::new(max.0, max.1, max.2),
            )
            .ok()?;
            Some(((*name).to_string(), range))
        })
        .collect()
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LazyError {
    /// No version inside the range could be made importable.
    #[error("Dependency {name} {range} is unavailable: {cause}")]
    DependencyUnavailable {
        name: String,
        range: VersionRange,
        cause: String,
    },

    #[error("{name} is not a declared lazy dependency")]
    UndeclaredDependency { name: String },
}

/// A dependency verified to be importable within its range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModule {
    pub name: String,
    pub version: Version,
    pub path: String,
    /// Whether this resolution had to acquire the package.
    pub acquired: bool,
}

impl ResolvedModule {
    fn from_installed(module: InstalledModule, acquired: bool) -> Self {
        Self {
            name: module.name,
            version: module.version,
            path: module.path,
            acquired,
        }
    }
}

type Resolution = Shared<BoxFuture<'static, Result<ResolvedModule, LazyError>>>;

#[derive(Default)]
struct ResolverState {
    resolved: HashMap<String, ResolvedModule>,
    in_flight: HashMap<String, Resolution>,
}

pub struct LazyModuleResolver {
    locator: Arc<dyn ModuleLocator>,
    installer: Arc<dyn PackageInstaller>,
    dependencies: HashMap<String, VersionRange>,
    state: Mutex<ResolverState>,
}

impl LazyModuleResolver {
    /// Resolver over the built-in dependency table.
    pub fn new(locator: Arc<dyn ModuleLocator>, installer: Arc<dyn PackageInstaller>) -> Self {
        Self::with_dependencies(locator, installer, default_lazy_dependencies())
    }

    pub fn with_dependencies(
        locator: Arc<dyn ModuleLocator>,
        installer: Arc<dyn PackageInstaller>,
        dependencies: HashMap<String, VersionRange>,
    ) -> Self {
        Self {
            locator,
            installer,
            dependencies,
            state: Mutex::new(ResolverState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declared range for `name`.
    pub fn declared(&self, name: &str) -> Option<&VersionRange> {
        self.dependencies.get(name)
    }

    /// Declared dependency names, sorted.
    pub fn dependency_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dependencies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Cached resolution for `name`, without touching the host.
    pub fn cached(&self, name: &str) -> Option<ResolvedModule> {
        self.lock().resolved.get(name).cloned()
    }

    /// Resolve `name`, acquiring it if needed.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedModule, LazyError> {
        let range = self
            .dependencies
            .get(name)
            .cloned()
            .ok_or_else(|| LazyError::UndeclaredDependency {
                name: name.to_string(),
            })?;

        let resolution = {
            let mut state = self.lock();
            if let Some(module) = state.resolved.get(name) {
                return Ok(module.clone());
            }
            if let Some(existing) = state.in_flight.get(name) {
                debug!(dependency = name, "Joining in-flight resolution");
                existing.clone()
            } else {
                let resolution = resolve_uncached(
                    Arc::clone(&self.locator),
                    Arc::clone(&self.installer),
                    name.to_string(),
                    range,
                )
                .boxed()
                .shared();
                state
                    .in_flight
                    .insert(name.to_string(), resolution.clone());
                resolution
            }
        };

        let result = resolution.clone().await;

        let mut state = self.lock();
        if state
            .in_flight
            .get(name)
            .is_some_and(|current| current.ptr_eq(&resolution))
        {
            state.in_flight.remove(name);
        }
        if let Ok(module) = &result {
            state
                .resolved
                .entry(name.to_string())
                .or_insert_with(|| module.clone());
        }
        result
    }
}

async fn resolve_uncached(
    locator: Arc<dyn ModuleLocator>,
    installer: Arc<dyn PackageInstaller>,
    name: String,
    range: VersionRange,
) -> Result<ResolvedModule, LazyError> {
    let unavailable = |cause: String| LazyError::DependencyUnavailable {
        name: name.clone(),
        range: range.clone(),
        cause,
    };

    match locator.locate(&name).await {
        Some(module) if range.contains(&module.version) => {
            debug!(dependency = %name, version = %module.version, "Using installed dependency");
            return Ok(ResolvedModule::from_installed(module, false));
        }
        Some(module) => info!(
            dependency = %name,
            installed = %module.version,
            %range,
            "Installed dependency outside supported range; acquiring"
        ),
        None => info!(dependency = %name, %range, "Dependency not installed; acquiring"),
    }

    let version = installer.install(&name, &range).await.map_err(|e| {
        warn!(dependency = %name, error = %e, "Dependency acquisition failed");
        unavailable(e.message)
    })?;

    if !range.contains(&version) {
        return Err(unavailable(format!(
            "package manager installed {version}, outside the supported range"
        )));
    }

    match locator.locate(&name).await {
        Some(module) if range.contains(&module.version) => {
            info!(dependency = %name, version = %module.version, "Dependency acquired");
            Ok(ResolvedModule::from_installed(module, true))
        }
        Some(module) => Err(unavailable(format!(
            "installed version {} is still outside the supported range",
            module.version
        ))),
        None => Err(unavailable(
            "package is not importable after installation".to_string(),
        )),
    }
}
