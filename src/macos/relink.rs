//! Rewrite `@rpath` references of Mach-O binaries to absolute paths inside the
//! runtime prefix.
//!
//! Conda builds link against `@rpath/libfoo.dylib` and rely on the rpaths of
//! the conda environment. Once the files are moved into the wheel layout
//! those rpaths no longer resolve, so every reference is pointed at
//! `<runtime prefix>/lib/<name>`. Dylibs found this way are fixed in turn,
//! depth first, and every modified binary is re-signed.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::link::BinaryToolchain;
use crate::permissions::{ModeGuard, READ_WRITE};
use crate::system_tools::ToolError;

const RPATH_PREFIX: &str = "@rpath";

#[derive(thiserror::Error, Debug)]
pub enum RelinkError {
    #[error("failed to read or write Mach-O file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse Mach-O file: {0}")]
    Parse(#[from] goblin::error::Error),

    #[error("file type not handled: {}", .0.display())]
    FileTypeNotHandled(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{} links against {dependency} but {} does not exist", .binary.display(), .expected.display())]
    DependencyNotFound {
        binary: PathBuf,
        dependency: String,
        expected: PathBuf,
    },
}

/// The progress of a single binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixState {
    /// Not looked at yet
    Pending,
    /// Dependencies are known, references are being rewritten
    Inspected,
    /// All references are rewritten
    Patched,
    /// The binary was signed again
    Resigned,
    /// Finished
    Done,
}

struct Frame {
    path: PathBuf,
    state: FixState,
    dependencies: Vec<String>,
    next: usize,
    _guard: Option<ModeGuard>,
}

impl Frame {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: FixState::Pending,
            dependencies: Vec::new(),
            next: 0,
            _guard: None,
        }
    }
}

/// Fixes the rpaths of a set of binaries against one runtime prefix.
///
/// Dependencies are keyed by their file name. A dylib that was fixed once,
/// or is currently being fixed further up the stack, is not visited again
/// for the rest of the run.
pub struct RpathFixer<'a, T: BinaryToolchain> {
    toolchain: &'a T,
    library_dir: PathBuf,
    visited: HashSet<String>,
    fixed: Vec<PathBuf>,
}

impl<'a, T: BinaryToolchain> RpathFixer<'a, T> {
    pub fn new(toolchain: &'a T, runtime_prefix: &Path) -> Self {
        Self {
            toolchain,
            library_dir: runtime_prefix.join("lib"),
            visited: HashSet::new(),
            fixed: Vec::new(),
        }
    }

    /// The binaries that were fixed so far, in the order they were finished
    pub fn fixed(&self) -> &[PathBuf] {
        &self.fixed
    }

    /// Fix `root` and every dylib it reaches through `@rpath`.
    pub fn fix(&mut self, root: &Path) -> Result<(), RelinkError> {
        tracing::debug!("Fixing rpaths of {}", root.display());
        let mut stack = vec![Frame::new(root.to_path_buf())];

        while let Some(frame) = stack.last_mut() {
            match frame.state {
                FixState::Pending => {
                    frame._guard = Some(ModeGuard::new(&frame.path, READ_WRITE)?);
                    let own_name = file_name(&frame.path.to_string_lossy()).to_string();
                    frame.dependencies = self
                        .toolchain
                        .inspect(&frame.path)?
                        .into_iter()
                        .filter(|dep| dep.starts_with(RPATH_PREFIX) && file_name(dep) != own_name)
                        .collect();
                    frame.state = FixState::Inspected;
                }
                FixState::Inspected => {
                    let Some(dependency) = frame.dependencies.get(frame.next).cloned() else {
                        frame.state = FixState::Patched;
                        continue;
                    };
                    frame.next += 1;

                    let name = file_name(&dependency).to_string();
                    let resolved = self.library_dir.join(&name);
                    if !resolved.exists() {
                        return Err(RelinkError::DependencyNotFound {
                            binary: frame.path.clone(),
                            dependency,
                            expected: resolved,
                        });
                    }
                    self.toolchain
                        .change_dependency(&frame.path, &dependency, &resolved)?;

                    if name.ends_with(".dylib") && self.visited.insert(name) {
                        stack.push(Frame::new(resolved));
                    }
                }
                FixState::Patched => {
                    self.toolchain.sign(&frame.path)?;
                    frame.state = FixState::Resigned;
                }
                FixState::Resigned => {
                    tracing::trace!("Fixed {}", frame.path.display());
                    self.fixed.push(frame.path.clone());
                    frame.state = FixState::Done;
                }
                FixState::Done => {
                    stack.pop();
                }
            }
        }

        Ok(())
    }
}

fn file_name(install_name: &str) -> &str {
    install_name.rsplit('/').next().unwrap_or(install_name)
}

/// Fix every root with a single visited set.
pub fn fix_rpaths<T: BinaryToolchain>(
    toolchain: &T,
    runtime_prefix: &Path,
    roots: &[PathBuf],
) -> Result<Vec<PathBuf>, RelinkError> {
    let mut fixer = RpathFixer::new(toolchain, runtime_prefix);
    for root in roots {
        fixer.fix(root)?;
    }
    Ok(fixer.fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs_err as fs;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Inspect(String),
        Change(String, String, PathBuf),
        Sign(String),
    }

    /// A toolchain that records calls instead of touching binaries.
    #[derive(Default)]
    struct FakeToolchain {
        dependencies: HashMap<String, Vec<String>>,
        calls: RefCell<Vec<Call>>,
    }

    impl FakeToolchain {
        fn with(mut self, binary: &str, dependencies: &[&str]) -> Self {
            self.dependencies.insert(
                binary.to_string(),
                dependencies.iter().map(|d| d.to_string()).collect(),
            );
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn signed(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Sign(name) => Some(name),
                    _ => None,
                })
                .collect()
        }
    }

    fn name(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    impl BinaryToolchain for FakeToolchain {
        fn inspect(&self, path: &Path) -> Result<Vec<String>, RelinkError> {
            self.calls.borrow_mut().push(Call::Inspect(name(path)));
            Ok(self.dependencies.get(&name(path)).cloned().unwrap_or_default())
        }

        fn change_dependency(&self, path: &Path, old: &str, new: &Path) -> Result<(), RelinkError> {
            self.calls.borrow_mut().push(Call::Change(
                name(path),
                old.to_string(),
                new.to_path_buf(),
            ));
            Ok(())
        }

        fn sign(&self, path: &Path) -> Result<(), RelinkError> {
            self.calls.borrow_mut().push(Call::Sign(name(path)));
            Ok(())
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        prefix: PathBuf,
        out: PathBuf,
    }

    fn fixture(runtime_libs: &[&str], roots: &[&str]) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("prefix");
        let out = tmp.path().join("out");
        fs::create_dir_all(prefix.join("lib")).unwrap();
        fs::create_dir_all(&out).unwrap();
        for lib in runtime_libs {
            fs::write(prefix.join("lib").join(lib), "").unwrap();
        }
        for root in roots {
            fs::write(out.join(root), "").unwrap();
        }
        Fixture {
            _tmp: tmp,
            prefix,
            out,
        }
    }

    #[test]
    fn rewrites_rpath_references_only() {
        let f = fixture(&["libboost_python.dylib"], &["cctbx_ext.so"]);
        let toolchain = FakeToolchain::default().with(
            "cctbx_ext.so",
            &[
                "@rpath/libboost_python.dylib",
                "/usr/lib/libSystem.B.dylib",
                "@rpath/cctbx_ext.so",
            ],
        );

        let fixed = fix_rpaths(&toolchain, &f.prefix, &[f.out.join("cctbx_ext.so")]).unwrap();

        assert_eq!(
            toolchain.calls(),
            [
                Call::Inspect("cctbx_ext.so".into()),
                Call::Change(
                    "cctbx_ext.so".into(),
                    "@rpath/libboost_python.dylib".into(),
                    f.prefix.join("lib/libboost_python.dylib"),
                ),
                Call::Inspect("libboost_python.dylib".into()),
                Call::Sign("libboost_python.dylib".into()),
                Call::Sign("cctbx_ext.so".into()),
            ]
        );
        assert_eq!(
            fixed,
            [
                f.prefix.join("lib/libboost_python.dylib"),
                f.out.join("cctbx_ext.so"),
            ]
        );
    }

    #[test]
    fn cycles_terminate() {
        let f = fixture(&["liba.dylib", "libb.dylib"], &["ext.so"]);
        let toolchain = FakeToolchain::default()
            .with("ext.so", &["@rpath/liba.dylib"])
            .with("liba.dylib", &["@rpath/libb.dylib"])
            .with("libb.dylib", &["@rpath/liba.dylib"]);

        fix_rpaths(&toolchain, &f.prefix, &[f.out.join("ext.so")]).unwrap();

        assert_eq!(toolchain.signed(), ["libb.dylib", "liba.dylib", "ext.so"]);
        // the back reference is still rewritten
        assert!(toolchain.calls().contains(&Call::Change(
            "libb.dylib".into(),
            "@rpath/liba.dylib".into(),
            f.prefix.join("lib/liba.dylib"),
        )));
    }

    #[test]
    fn each_binary_is_signed_once_after_its_rewrites() {
        let f = fixture(&["liba.dylib", "libb.dylib"], &["one.so", "two.so"]);
        let toolchain = FakeToolchain::default()
            .with("one.so", &["@rpath/liba.dylib", "@rpath/libb.dylib"])
            .with("two.so", &["@rpath/liba.dylib"])
            .with("liba.dylib", &["@rpath/libb.dylib"]);

        fix_rpaths(
            &toolchain,
            &f.prefix,
            &[f.out.join("one.so"), f.out.join("two.so")],
        )
        .unwrap();

        let mut signed = toolchain.signed();
        signed.sort();
        assert_eq!(signed, ["liba.dylib", "libb.dylib", "one.so", "two.so"]);

        let calls = toolchain.calls();
        for binary in ["liba.dylib", "libb.dylib", "one.so", "two.so"] {
            let sign = calls
                .iter()
                .position(|c| *c == Call::Sign(binary.into()))
                .unwrap();
            let last_change = calls
                .iter()
                .rposition(|c| matches!(c, Call::Change(b, _, _) if b == binary));
            if let Some(last_change) = last_change {
                assert!(last_change < sign, "{binary} was signed before it was patched");
            }
        }
    }

    #[test]
    fn missing_dependency_is_fatal() {
        let f = fixture(&[], &["ext.so"]);
        let toolchain = FakeToolchain::default().with("ext.so", &["@rpath/libmissing.dylib"]);

        let err = fix_rpaths(&toolchain, &f.prefix, &[f.out.join("ext.so")]).unwrap_err();
        match err {
            RelinkError::DependencyNotFound {
                dependency,
                expected,
                ..
            } => {
                assert_eq!(dependency, "@rpath/libmissing.dylib");
                assert_eq!(expected, f.prefix.join("lib/libmissing.dylib"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(toolchain.signed().is_empty());
    }

    #[test]
    fn non_dylib_dependencies_are_not_followed() {
        let f = fixture(&["libz.so.1"], &["tool"]);
        let toolchain = FakeToolchain::default().with("tool", &["@rpath/libz.so.1"]);

        fix_rpaths(&toolchain, &f.prefix, &[f.out.join("tool")]).unwrap();
        assert_eq!(toolchain.signed(), ["tool"]);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_binaries_are_restored() {
        use crate::permissions::set_mode;
        use std::os::unix::fs::PermissionsExt;

        let f = fixture(&[], &["ext.so"]);
        let root = f.out.join("ext.so");
        set_mode(&root, 0o444).unwrap();

        fix_rpaths(&FakeToolchain::default(), &f.prefix, &[root.clone()]).unwrap();
        let mode = fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o444);
    }
}
