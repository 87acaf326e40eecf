/// System module: running kernel, host architecture, /boot space, changelogs
/// and the privileged package installers

pub mod boot;
pub mod changelog;
pub mod installer;

use std::process::Command;

pub use boot::{boot_space, format_size, BootSpace};
pub use changelog::{kernel_changelog, RemoteChangelog};
pub use installer::{AptGetInstaller, InstallerOutput, PackageInstaller, SynapticInstaller};

/// Returned by the kernel queries when `uname` cannot be run.
pub const UNKNOWN_KERNEL: &str = "unknown";

/// Logging macros for convenient access
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::info!("{}", msg);
    }}
}

/// Get the currently running kernel release, e.g. "4.10.0-28-generic"
pub fn current_kernel() -> String {
    match Command::new("uname").arg("-r").output() {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        Ok(out) => {
            log_info!("[System] uname -r exited with {:?}", out.status.code());
            UNKNOWN_KERNEL.to_string()
        }
        Err(e) => {
            log_info!("[System] Failed to get running kernel: {}", e);
            UNKNOWN_KERNEL.to_string()
        }
    }
}

/// Major series of a kernel release: "4.10" for "4.10.0-28-generic"
pub fn kernel_major(release: &str) -> String {
    let mut parts = release.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) if !major.is_empty() => format!("{}.{}", major, minor),
        _ => UNKNOWN_KERNEL.to_string(),
    }
}

/// Major series of the running kernel.
pub fn current_kernel_major() -> String {
    kernel_major(&current_kernel())
}

/// Debian architecture tag of the host.
pub fn debian_arch() -> String {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        "mips64" => "mips64el",
        other => other,
    }
    .to_string()
}

/// Whether a Debian architecture tag denotes a 64-bit userland.
pub fn is_64bit_arch(arch: &str) -> bool {
    matches!(
        arch,
        "amd64" | "arm64" | "ppc64el" | "ppc64" | "riscv64" | "s390x" | "mips64el" | "loong64" | "sparc64"
    )
}

/// Whether the host runs a 64-bit userland.
pub fn host_is_64bit() -> bool {
    cfg!(target_pointer_width = "64")
}
