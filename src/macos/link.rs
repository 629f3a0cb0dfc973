//! Inspect and modify Mach-O binaries with goblin, `install_name_tool` and
//! `codesign`.
use fs_err::File;
use goblin::mach::Mach;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::relink::RelinkError;
use crate::system_tools::{SystemTools, Tool};

/// The operations the rpath fixer needs on a binary.
pub trait BinaryToolchain {
    /// Install names of the libraries `path` links against, without the
    /// binary itself.
    fn inspect(&self, path: &Path) -> Result<Vec<String>, RelinkError>;

    /// Replace the dependency `old` of `path` by `new`.
    fn change_dependency(&self, path: &Path, old: &str, new: &Path) -> Result<(), RelinkError>;

    /// Ad-hoc sign `path` after it was modified.
    fn sign(&self, path: &Path) -> Result<(), RelinkError>;
}

/// Only parse the magic number of a file and check if it is a thin Mach-O
/// file. Universal binaries are not considered.
pub fn is_macho(path: &Path) -> Result<bool, std::io::Error> {
    let mut file = File::open(path)?;
    let mut buf: [u8; 4] = [0; 4];
    match file.read_exact(&mut buf) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e),
    }

    match goblin::mach::parse_magic_and_ctx(&buf, 0) {
        Ok((_, Some(_))) => Ok(true),
        Ok((_, None)) => Ok(false),
        Err(_) => Ok(false),
    }
}

/// Parse the dependencies out of the bytes of a thin Mach-O binary.
pub fn parse_dependencies(path: &Path, bytes: &[u8]) -> Result<Vec<String>, RelinkError> {
    match Mach::parse(bytes)? {
        // goblin lists the binary itself as `self`
        Mach::Binary(mach) => Ok(mach
            .libs
            .iter()
            .filter(|lib| **lib != "self")
            .map(|lib| lib.to_string())
            .collect()),
        Mach::Fat(_) => Err(RelinkError::FileTypeNotHandled(path.to_path_buf())),
    }
}

/// The toolchain found on a macOS host.
#[derive(Debug, Default)]
pub struct MachOToolchain {
    system_tools: SystemTools,
}

impl MachOToolchain {
    pub fn new(system_tools: SystemTools) -> Self {
        Self { system_tools }
    }

    fn codesign_command(&self, path: &Path) -> Result<std::process::Command, RelinkError> {
        let codesign: PathBuf = self.system_tools.find_tool(Tool::Codesign)?;
        let is_system_codesign = codesign.starts_with("/usr/bin/");

        let mut cmd = std::process::Command::new(codesign);
        cmd.args(["-f", "-s", "-"]);
        if is_system_codesign {
            cmd.arg("--preserve-metadata=entitlements,requirements");
        }
        cmd.arg(path);
        Ok(cmd)
    }
}

impl BinaryToolchain for MachOToolchain {
    fn inspect(&self, path: &Path) -> Result<Vec<String>, RelinkError> {
        let bytes = fs_err::read(path)?;
        parse_dependencies(path, &bytes)
    }

    fn change_dependency(&self, path: &Path, old: &str, new: &Path) -> Result<(), RelinkError> {
        tracing::debug!("install_name_tool -change {} {} {:?}", old, new.display(), path);
        let mut cmd = self.system_tools.call(Tool::InstallNameTool)?;
        cmd.arg("-change").arg(old).arg(new).arg(path);
        self.system_tools.run(Tool::InstallNameTool, &mut cmd)?;
        Ok(())
    }

    fn sign(&self, path: &Path) -> Result<(), RelinkError> {
        let mut cmd = self.codesign_command(path)?;
        tracing::debug!("Running codesign: {:?}", cmd);
        self.system_tools.run(Tool::Codesign, &mut cmd)?;
        Ok(())
    }
}
