//! Python launchers for dispatchers and their registration in the package
//! metadata.
//!
//! A wheel cannot ship arbitrary executables as commands, so every dispatcher
//! gets a small python module next to it whose `run_command` function runs
//! the dispatcher and forwards the exit code. The launchers are then listed
//! as console scripts in `pyproject.toml`.
use fs_err as fs;
use minijinja::{Environment, context};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::consts::{
    LAUNCHER_FUNCTION, PACKAGE_INITIALIZER, SCRIPTS_BEGIN, SCRIPTS_END, SCRIPTS_MARKER,
};
use crate::utils::strip_script_suffix;

const LAUNCHER_TEMPLATE: &str = include_str!("templates/launcher.py.j2");

/// Errors raised while generating entry points
#[derive(Debug, thiserror::Error)]
pub enum EntryPointError {
    #[error("dispatchers {first:?} and {second:?} both map to the launcher module {stub:?}")]
    DuplicateEntryPoint {
        stub: String,
        first: String,
        second: String,
    },

    #[error("the launcher {launcher:?} for dispatcher {dispatcher:?} would overwrite the file {shadowed:?}")]
    LauncherShadowsFile {
        launcher: String,
        dispatcher: String,
        shadowed: String,
    },

    #[error("{} contains a generated scripts block without an end marker", .0.display())]
    UnterminatedBlock(PathBuf),

    #[error("failed to render launcher: {0}")]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A console script pointing at a generated launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// The command users type
    pub command: String,
    /// Dotted module path of the launcher
    pub module: String,
    /// Function inside the launcher module
    pub function: String,
    /// File name of the dispatcher the launcher runs
    pub dispatcher: String,
}

impl EntryPoint {
    /// The last component of the module path, which is also the launcher file stem
    pub fn stub(&self) -> &str {
        self.module.rsplit('.').next().unwrap_or(&self.module)
    }

    /// File name of the launcher module
    pub fn launcher_file(&self) -> String {
        format!("{}.py", self.stub())
    }

    /// The `pyproject.toml` line registering this entry point
    pub fn script_line(&self) -> String {
        format!("\"{}\" = \"{}:{}\"", self.command, self.module, self.function)
    }
}

/// Turn a command name into a valid python module name.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, and a leading digit
/// gets a `_` prefix.
pub fn stub_name(command: &str) -> String {
    let mut stub = command
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();
    if stub.starts_with(|c: char| c.is_ascii_digit()) {
        stub.insert(0, '_');
    }
    stub
}

/// The entry points of one conversion, ordered by command name.
#[derive(Debug, Clone)]
pub struct DispatcherRegistry {
    dispatcher_module: String,
    entries: BTreeMap<String, EntryPoint>,
    // every dispatcher file name seen, launchers must not reuse one
    files: BTreeSet<String>,
}

impl DispatcherRegistry {
    /// Create an empty registry for launchers living in `dispatcher_module`.
    pub fn new(dispatcher_module: impl Into<String>) -> Self {
        Self {
            dispatcher_module: dispatcher_module.into(),
            entries: BTreeMap::new(),
            files: BTreeSet::new(),
        }
    }

    /// Register the dispatchers at the given paths.
    pub fn from_dispatchers<'a>(
        dispatcher_module: impl Into<String>,
        dispatchers: impl IntoIterator<Item = &'a PathBuf>,
    ) -> Result<Self, EntryPointError> {
        let mut registry = Self::new(dispatcher_module);
        for dispatcher in dispatchers {
            if let Some(file_name) = dispatcher.file_name() {
                registry.register(&file_name.to_string_lossy())?;
            }
        }
        Ok(registry)
    }

    /// Register a dispatcher by file name. The package initializer is skipped.
    ///
    /// Launchers share the directory with the dispatchers, so a launcher file
    /// name that equals a dispatcher or the package initializer is an error.
    pub fn register(&mut self, file_name: &str) -> Result<Option<&EntryPoint>, EntryPointError> {
        if file_name == PACKAGE_INITIALIZER {
            return Ok(None);
        }
        if let Some(existing) = self.entries.values().find(|e| e.launcher_file() == file_name) {
            return Err(EntryPointError::LauncherShadowsFile {
                launcher: existing.launcher_file(),
                dispatcher: existing.dispatcher.clone(),
                shadowed: file_name.to_string(),
            });
        }
        self.files.insert(file_name.to_string());

        let command = strip_script_suffix(file_name);
        if command.is_empty() {
            tracing::warn!("Dispatcher {file_name:?} has no command name, skipping");
            return Ok(None);
        }

        let stub = stub_name(command);
        if let Some(existing) = self.entries.values().find(|e| e.stub() == stub) {
            return Err(EntryPointError::DuplicateEntryPoint {
                stub,
                first: existing.dispatcher.clone(),
                second: file_name.to_string(),
            });
        }

        let entry = EntryPoint {
            command: command.to_string(),
            module: format!("{}.{}", self.dispatcher_module, stub),
            function: LAUNCHER_FUNCTION.to_string(),
            dispatcher: file_name.to_string(),
        };
        let launcher = entry.launcher_file();
        if launcher == PACKAGE_INITIALIZER || self.files.contains(&launcher) {
            return Err(EntryPointError::LauncherShadowsFile {
                launcher: launcher.clone(),
                dispatcher: file_name.to_string(),
                shadowed: launcher,
            });
        }
        Ok(Some(self.entries.entry(command.to_string()).or_insert(entry)))
    }

    /// Entry points ordered by command
    pub fn entries(&self) -> impl Iterator<Item = &EntryPoint> {
        self.entries.values()
    }

    /// Number of registered entry points
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the launcher source for one entry point.
    pub fn render_launcher(&self, entry: &EntryPoint) -> Result<String, EntryPointError> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        let source = env.render_str(
            LAUNCHER_TEMPLATE,
            context! {
                dispatcher_module => self.dispatcher_module,
                function => entry.function,
                dispatcher => entry.dispatcher,
            },
        )?;
        Ok(source)
    }

    /// Write one `<stub>.py` launcher per entry point into `dispatcher_dir`.
    pub fn write_launchers(&self, dispatcher_dir: &Path) -> Result<Vec<PathBuf>, EntryPointError> {
        let mut written = Vec::with_capacity(self.entries.len());
        for entry in self.entries() {
            let path = dispatcher_dir.join(entry.launcher_file());
            fs::write(&path, self.render_launcher(entry)?)?;
            tracing::debug!("Wrote launcher {} for {}", path.display(), entry.command);
            written.push(path);
        }
        Ok(written)
    }

    /// The lines of the generated scripts block, delimiters included.
    pub fn scripts_block(&self) -> Vec<String> {
        std::iter::once(SCRIPTS_BEGIN.to_string())
            .chain(self.entries().map(EntryPoint::script_line))
            .chain(std::iter::once(SCRIPTS_END.to_string()))
            .collect()
    }

    /// Insert the scripts block into `metadata`.
    ///
    /// The line holding the `INSERT_SCRIPTS_HERE` marker, or a block written
    /// by an earlier run, is replaced. Returns `None` if neither is present.
    pub fn patch_metadata(&self, metadata: &str) -> Option<String> {
        let mut out = String::with_capacity(metadata.len());
        let mut lines = metadata.split_inclusive('\n');
        let mut patched = false;

        while let Some(line) = lines.next() {
            let is_block = line.trim() == SCRIPTS_BEGIN;
            if !is_block && !line.contains(SCRIPTS_MARKER) {
                out.push_str(line);
                continue;
            }

            let content = line.trim_end_matches(['\r', '\n']);
            let ending = match &line[content.len()..] {
                "" => "\n",
                ending => ending,
            };
            let indent = &content[..content.len() - content.trim_start().len()];
            for block_line in self.scripts_block() {
                out.push_str(indent);
                out.push_str(&block_line);
                out.push_str(ending);
            }
            patched = true;

            if is_block {
                // drop the previous block
                if !lines.by_ref().any(|l| l.trim() == SCRIPTS_END) {
                    return None;
                }
            }
        }

        patched.then_some(out)
    }

    /// Register the entry points in the metadata file at `path`.
    ///
    /// Returns whether the file was modified.
    pub fn register_scripts(&self, path: &Path) -> Result<bool, EntryPointError> {
        let metadata = fs::read_to_string(path)?;
        if metadata.lines().any(|l| l.trim() == SCRIPTS_BEGIN)
            && !metadata.lines().any(|l| l.trim() == SCRIPTS_END)
        {
            return Err(EntryPointError::UnterminatedBlock(path.to_path_buf()));
        }

        match self.patch_metadata(&metadata) {
            Some(patched) => {
                if patched != metadata {
                    fs::write(path, patched)?;
                }
                tracing::info!(
                    "Registered {} entry points in {}",
                    self.len(),
                    path.display()
                );
                Ok(true)
            }
            None => {
                tracing::warn!(
                    "No {SCRIPTS_MARKER} marker in {}, entry points were not registered",
                    path.display()
                );
                Ok(false)
            }
        }
    }
}
