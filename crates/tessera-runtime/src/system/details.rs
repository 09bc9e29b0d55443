//! Host snapshot from `sysinfo`.

use std::sync::Arc;

use sysinfo::System;
use tessera_core::SystemDetails;
use tessera_core::paths::normalize_path;

/// Runtime name reported in `SystemDetails`.
pub const RUNTIME_NAME: &str = "tessera";

/// Snapshot the current host.
///
/// Free memory is re-read from the OS on every `free_memory()` call.
pub fn host_details() -> SystemDetails {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_all();

    let cpu_model = sys
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .unwrap_or_default();

    let release = System::os_version()
        .or_else(System::kernel_version)
        .unwrap_or_default();

    SystemDetails::new(
        cpu_model,
        num_cpus::get(),
        std::env::consts::OS,
        release,
        RUNTIME_NAME,
        env!("CARGO_PKG_VERSION"),
        normalize_path(&std::env::temp_dir().to_string_lossy()),
        sys.total_memory(),
        Arc::new(available_memory),
    )
}

fn available_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_details_are_plausible() {
        let details = host_details();
        assert!(details.cpus >= 1);
        assert_eq!(details.platform, std::env::consts::OS);
        assert_eq!(details.runtime, RUNTIME_NAME);
        assert!(!details.tmp_dir.contains('\\'));
        assert!(details.total_memory >= details.free_memory());
    }
}
