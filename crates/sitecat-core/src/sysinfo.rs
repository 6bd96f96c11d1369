//! Architecture and operating system of a site or gateway.

use derive_more::Display;
use std::str::FromStr;

use crate::{Error, Result};

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum Architecture {
    #[display("x86")]
    X86,
    #[default]
    #[display("x86_64")]
    X86_64,
    #[display("ppc")]
    Ppc,
    #[display("ppc_64")]
    Ppc64,
    #[display("ppc64le")]
    Ppc64le,
    #[display("ia64")]
    Ia64,
    #[display("sparcv7")]
    Sparcv7,
    #[display("sparcv9")]
    Sparcv9,
    #[display("amd64")]
    Amd64,
    #[display("aarch64")]
    Aarch64,
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x86" => Ok(Self::X86),
            "x86_64" => Ok(Self::X86_64),
            "ppc" => Ok(Self::Ppc),
            "ppc_64" => Ok(Self::Ppc64),
            "ppc64le" => Ok(Self::Ppc64le),
            "ia64" => Ok(Self::Ia64),
            "sparcv7" => Ok(Self::Sparcv7),
            "sparcv9" => Ok(Self::Sparcv9),
            "amd64" => Ok(Self::Amd64),
            "aarch64" => Ok(Self::Aarch64),
            _ => Err(Error::invalid("arch", s)),
        }
    }
}

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum Os {
    #[default]
    #[display("linux")]
    Linux,
    #[display("sunos")]
    Sunos,
    #[display("aix")]
    Aix,
    #[display("macosx")]
    Macosx,
    #[display("windows")]
    Windows,
}

impl FromStr for Os {
    type Err = Error;

    /// OS names are matched case-insensitively; older catalogs use `LINUX`.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "sunos" => Ok(Self::Sunos),
            "aix" => Ok(Self::Aix),
            "macosx" => Ok(Self::Macosx),
            "windows" => Ok(Self::Windows),
            _ => Err(Error::invalid("os", s)),
        }
    }
}

/// System information attached to a site.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SysInfo {
    pub arch: Architecture,
    pub os: Os,
    pub os_release: Option<String>,
    pub os_version: Option<String>,
    pub glibc: Option<String>,
}

impl SysInfo {
    pub fn new(arch: Architecture, os: Os) -> Self {
        Self {
            arch,
            os,
            ..Self::default()
        }
    }

    /// Parse the legacy VDS form `ARCH::OS[:VERSION[:GLIBC]]`, e.g. `INTEL32::LINUX`.
    pub fn from_vds(value: &str) -> Result<Self> {
        let (arch, rest) = value
            .split_once("::")
            .ok_or_else(|| Error::invalid("sysinfo", value))?;

        let arch = match arch.trim().to_ascii_uppercase().as_str() {
            "INTEL32" => Architecture::X86,
            "INTEL64" => Architecture::X86_64,
            "AMD64" => Architecture::Amd64,
            "SPARCV7" => Architecture::Sparcv7,
            "SPARCV9" => Architecture::Sparcv9,
            "IA64" => Architecture::Ia64,
            _ => return Err(Error::invalid("sysinfo arch", arch)),
        };

        let mut parts = rest.split(':');
        let os = parts.next().unwrap_or_default().trim().parse::<Os>()?;
        let os_version = parts
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let glibc = parts
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(Self {
            arch,
            os,
            os_release: None,
            os_version,
            glibc,
        })
    }

    /// Render in the legacy VDS form. Architectures without a VDS name map to `INTEL64`.
    pub fn to_vds(&self) -> String {
        let arch = match self.arch {
            Architecture::X86 => "INTEL32",
            Architecture::Amd64 => "AMD64",
            Architecture::Sparcv7 => "SPARCV7",
            Architecture::Sparcv9 => "SPARCV9",
            Architecture::Ia64 => "IA64",
            _ => "INTEL64",
        };
        let mut out = format!("{}::{}", arch, self.os.to_string().to_ascii_uppercase());
        if let Some(version) = &self.os_version {
            out.push(':');
            out.push_str(version);
            if let Some(glibc) = &self.glibc {
                out.push(':');
                out.push_str(glibc);
            }
        }
        out
    }
}
