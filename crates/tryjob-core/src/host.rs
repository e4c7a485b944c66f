//! Facts about the machine the jobs ran on.
//!
//! Hostname comes from `sysinfo`; revisions and GPU details are probed with
//! external commands through the [`CommandRunner`], and a probe that fails
//! simply leaves the fact unknown.

use std::path::{Path, PathBuf};
use sysinfo::System;
use tracing::{debug, warn};

use crate::config::Os;
use crate::runner::{run_checked, CommandRunner};

/// GPU name and driver version, when discoverable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuInfo {
    pub name: Option<String>,
    pub driver_version: Option<String>,
}

/// Environment facts that go into report titles and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub hostname: String,
    pub os: Os,
    pub work_dir: PathBuf,
    pub chrome_revision: Option<String>,
    pub aquarium_revision: Option<String>,
    pub gpu: GpuInfo,
}

impl HostFacts {
    pub fn new(hostname: impl Into<String>, os: Os, work_dir: PathBuf) -> Self {
        Self {
            hostname: hostname.into(),
            os,
            work_dir,
            chrome_revision: None,
            aquarium_revision: None,
            gpu: GpuInfo::default(),
        }
    }

    /// Hostname and working directory of the current process.
    pub fn detect(os: Os) -> Self {
        let work_dir = std::env::current_dir().unwrap_or_else(|e| {
            warn!(error = %e, "Cannot read working directory");
            PathBuf::from(".")
        });
        Self::new(hostname(), os, work_dir)
    }
}

/// Local hostname, `unknown` when it cannot be read.
pub fn hostname() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// HEAD commit of the git checkout at `repo_dir`.
pub async fn source_revision(runner: &dyn CommandRunner, repo_dir: &Path) -> Option<String> {
    let cmd = vec![
        "git".to_string(),
        "-C".to_string(),
        repo_dir.display().to_string(),
        "rev-parse".to_string(),
        "HEAD".to_string(),
    ];
    match run_checked(runner, &cmd).await {
        Ok(out) => {
            let sha = out.trim().to_string();
            (!sha.is_empty()).then_some(sha)
        }
        Err(failure) => {
            warn!(dir = %repo_dir.display(), exit_code = failure.exit_code, "Cannot read source revision");
            None
        }
    }
}

/// Probe the GPU with the platform's usual tools.
pub async fn discover_gpu(runner: &dyn CommandRunner, os: Os) -> GpuInfo {
    let probe = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();

    let info = match os {
        Os::Linux => {
            let name = run_checked(runner, &probe(&["lspci"]))
                .await
                .ok()
                .and_then(|out| parse_lspci_gpu(&out));
            let driver_version = run_checked(runner, &probe(&["glxinfo", "-B"]))
                .await
                .ok()
                .and_then(|out| parse_glxinfo_driver(&out));
            GpuInfo {
                name,
                driver_version,
            }
        }
        Os::Win => run_checked(
            runner,
            &probe(&[
                "wmic",
                "path",
                "win32_VideoController",
                "get",
                "Name,DriverVersion",
                "/format:list",
            ]),
        )
        .await
        .map(|out| parse_wmic_gpu(&out))
        .unwrap_or_default(),
        Os::Mac => GpuInfo {
            name: run_checked(runner, &probe(&["system_profiler", "SPDisplaysDataType"]))
                .await
                .ok()
                .and_then(|out| parse_system_profiler_gpu(&out)),
            driver_version: None,
        },
    };

    debug!(gpu = ?info.name, driver = ?info.driver_version, "GPU discovery finished");
    info
}

/// First `VGA compatible controller` entry of `lspci` output.
pub fn parse_lspci_gpu(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("VGA compatible controller"))
        .and_then(|line| line.split_once("VGA compatible controller: "))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Driver part of the `OpenGL version string` line, e.g. `Mesa 23.1.4`.
pub fn parse_glxinfo_driver(output: &str) -> Option<String> {
    let version = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("OpenGL version string:"))?
        .trim();
    match version.find("Mesa") {
        Some(idx) => Some(version[idx..].to_string()),
        None => version.split_whitespace().last().map(str::to_string),
    }
}

/// `Name=` and `DriverVersion=` of the first adapter in `wmic /format:list`.
pub fn parse_wmic_gpu(output: &str) -> GpuInfo {
    let mut info = GpuInfo::default();
    for line in output.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("Name=") {
            if info.name.is_none() && !value.is_empty() {
                info.name = Some(value.to_string());
            }
        } else if let Some(value) = line.strip_prefix("DriverVersion=") {
            if info.driver_version.is_none() && !value.is_empty() {
                info.driver_version = Some(value.to_string());
            }
        }
    }
    info
}

/// `Chipset Model:` of the first display adapter.
pub fn parse_system_profiler_gpu(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Chipset Model:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedRunner;

    #[test]
    fn test_lspci_picks_vga_controller() {
        let out = "00:00.0 Host bridge: Intel Corporation Device 9b61\n\
                   00:02.0 VGA compatible controller: Intel Corporation UHD Graphics 620\n\
                   00:14.0 USB controller: Intel Corporation Device 02ed";
        assert_eq!(
            parse_lspci_gpu(out).as_deref(),
            Some("Intel Corporation UHD Graphics 620")
        );
        assert_eq!(parse_lspci_gpu("00:14.0 USB controller: x"), None);
    }

    #[test]
    fn test_glxinfo_driver_version() {
        let out = "name of display: :0\n    OpenGL version string: 4.6 (Compatibility Profile) Mesa 23.1.4\n";
        assert_eq!(parse_glxinfo_driver(out).as_deref(), Some("Mesa 23.1.4"));

        let out = "OpenGL version string: 4.6.0 NVIDIA 535.54.03";
        assert_eq!(parse_glxinfo_driver(out).as_deref(), Some("535.54.03"));
        assert_eq!(parse_glxinfo_driver("nothing"), None);
    }

    #[test]
    fn test_wmic_list_format() {
        let out = "\r\n\r\nDriverVersion=31.0.101.4502\r\nName=Intel(R) Iris(R) Xe Graphics\r\n\r\n";
        let info = parse_wmic_gpu(out);
        assert_eq!(info.name.as_deref(), Some("Intel(R) Iris(R) Xe Graphics"));
        assert_eq!(info.driver_version.as_deref(), Some("31.0.101.4502"));
    }

    #[test]
    fn test_system_profiler_chipset() {
        let out = "Graphics/Displays:\n\n    Apple M1:\n\n      Chipset Model: Apple M1\n      Type: GPU\n";
        assert_eq!(parse_system_profiler_gpu(out).as_deref(), Some("Apple M1"));
    }

    #[tokio::test]
    async fn test_discover_gpu_on_linux() {
        let runner = ScriptedRunner::new()
            .respond("lspci", "00:02.0 VGA compatible controller: AMD Radeon RX 6600\n")
            .fail("glxinfo", 127, "glxinfo: not found");
        let info = discover_gpu(&runner, Os::Linux).await;
        assert_eq!(info.name.as_deref(), Some("AMD Radeon RX 6600"));
        assert_eq!(info.driver_version, None);
    }

    #[tokio::test]
    async fn test_source_revision_trims_output() {
        let runner = ScriptedRunner::new().respond("git -C /src/chrome rev-parse", "abc123\n");
        let rev = source_revision(&runner, Path::new("/src/chrome")).await;
        assert_eq!(rev.as_deref(), Some("abc123"));

        let runner = ScriptedRunner::new().fail("git", 128, "not a git repository");
        assert_eq!(source_revision(&runner, Path::new("/tmp")).await, None);
    }

    #[test]
    fn test_hostname_is_never_empty() {
        assert!(!hostname().is_empty());
    }
}
