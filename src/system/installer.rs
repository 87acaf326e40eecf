//! Privileged package installers
//!
//! The dispatcher only knows the [`PackageInstaller`] trait: hand over an
//! ordered operation list, block until the external tool exits, get its
//! output back. Both implementations wrap the actual tool with `pkexec` so
//! PolicyKit handles authentication.

use crate::error::InstallerError;
use crate::log_info;
use crate::models::{Operation, Verb};
use std::io::Write;
use std::process::Command;

/// Default privilege escalation helper.
pub const DEFAULT_ELEVATION: &str = "pkexec";

/// Captured output of an installer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallerOutput {
    pub stdout: String,
    pub stderr: String,
}

impl InstallerOutput {
    fn append(&mut self, other: InstallerOutput) {
        self.stdout.push_str(&other.stdout);
        self.stderr.push_str(&other.stderr);
    }
}

/// Out-of-process package installer.
pub trait PackageInstaller {
    /// Run the operations in order; blocks until the tool exits.
    fn submit(&self, operations: &[Operation]) -> Result<InstallerOutput, InstallerError>;

    /// Refresh the package lists.
    fn refresh(&self) -> Result<InstallerOutput, InstallerError>;
}

/// Run `program args...`, optionally through an elevation helper, capturing output.
fn run_command(
    elevation: Option<&str>,
    program: &str,
    args: &[String],
) -> Result<InstallerOutput, InstallerError> {
    let mut command = match elevation {
        Some(helper) => {
            let mut c = Command::new(helper);
            c.arg(program);
            c
        }
        None => Command::new(program),
    };
    command.args(args);

    let cmd_line = format!("{} {}", elevation.unwrap_or_default(), program)
        .trim()
        .to_string();
    log_info!("[Installer] Running {} {}", cmd_line, args.join(" "));

    let output = command.output().map_err(|source| InstallerError::Spawn {
        cmd: cmd_line.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !stdout.is_empty() {
        log::info!("[{}] stdout: {}", program, stdout);
    }
    if !stderr.is_empty() {
        log::info!("[{}] stderr: {}", program, stderr);
    }

    if output.status.success() {
        Ok(InstallerOutput { stdout, stderr })
    } else {
        Err(InstallerError::ExitStatus {
            cmd: cmd_line,
            code: output.status.code(),
        })
    }
}

/// Drives synaptic in non-interactive mode with a selections file.
#[derive(Debug, Clone)]
pub struct SynapticInstaller {
    pub binary: String,
    pub elevation: Option<String>,
}

impl Default for SynapticInstaller {
    fn default() -> Self {
        SynapticInstaller {
            binary: "/usr/sbin/synaptic".to_string(),
            elevation: Some(DEFAULT_ELEVATION.to_string()),
        }
    }
}

impl SynapticInstaller {
    /// `package<TAB>verb` lines, as understood by `--set-selections-file`.
    pub fn selections(operations: &[Operation]) -> String {
        operations
            .iter()
            .map(|op| format!("{}\t{}\n", op.package, op.verb))
            .collect()
    }

    fn base_args() -> Vec<String> {
        ["--hide-main-window", "--non-interactive"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl PackageInstaller for SynapticInstaller {
    fn submit(&self, operations: &[Operation]) -> Result<InstallerOutput, InstallerError> {
        // Keep the file alive until synaptic has exited.
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(Self::selections(operations).as_bytes())?;
        file.flush()?;

        let mut args = Self::base_args();
        args.extend(
            [
                "-o",
                "Synaptic::closeZvt=true",
                "--progress-str",
                "Installing kernel packages. Please wait, this can take some time.",
                "--finish-str",
                "The kernel packages were processed.",
                "--set-selections-file",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(file.path().to_string_lossy().to_string());

        run_command(self.elevation.as_deref(), &self.binary, &args)
    }

    fn refresh(&self) -> Result<InstallerOutput, InstallerError> {
        let mut args = Self::base_args();
        args.push("--update-at-startup".to_string());
        run_command(self.elevation.as_deref(), &self.binary, &args)
    }
}

/// Drives `apt-get`, one invocation per run of consecutive operations sharing a verb.
#[derive(Debug, Clone)]
pub struct AptGetInstaller {
    pub binary: String,
    pub elevation: Option<String>,
}

impl Default for AptGetInstaller {
    fn default() -> Self {
        AptGetInstaller {
            binary: "apt-get".to_string(),
            elevation: Some(DEFAULT_ELEVATION.to_string()),
        }
    }
}

impl AptGetInstaller {
    /// Argument lists for each `apt-get` call, preserving operation order.
    pub fn invocations(operations: &[Operation]) -> Vec<Vec<String>> {
        let mut runs: Vec<(Verb, Vec<String>)> = Vec::new();
        for op in operations {
            match runs.last_mut() {
                Some((verb, packages)) if *verb == op.verb => {
                    packages.push(op.package.clone());
                    continue;
                }
                _ => {}
            }
            runs.push((op.verb, vec![op.package.clone()]));
        }

        runs.into_iter()
            .map(|(verb, packages)| {
                let mut args = vec!["-y".to_string(), verb.to_string(), "--".to_string()];
                args.extend(packages);
                args
            })
            .collect()
    }
}

impl PackageInstaller for AptGetInstaller {
    fn submit(&self, operations: &[Operation]) -> Result<InstallerOutput, InstallerError> {
        let mut combined = InstallerOutput::default();
        for args in Self::invocations(operations) {
            combined.append(run_command(self.elevation.as_deref(), &self.binary, &args)?);
        }
        Ok(combined)
    }

    fn refresh(&self) -> Result<InstallerOutput, InstallerError> {
        run_command(self.elevation.as_deref(), &self.binary, &["update".to_string()])
    }
}
