//! Lazy dependency adapters.

mod installer;
mod locator;

pub use installer::NpmInstaller;
pub use locator::NodeModulesLocator;
