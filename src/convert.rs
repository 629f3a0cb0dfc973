//! The `convert` pipeline: turn an extracted conda package into a wheel
//! source tree.
use rattler_conda_types::Platform;
use std::path::Path;

use crate::classify::Classifier;
use crate::dispatchers::rewrite_dispatchers;
use crate::entry_points::{DispatcherRegistry, EntryPointError};
use crate::layout::OutputLayout;
use crate::macos::{BinaryToolchain, MachOToolchain, RelinkError, fix_rpaths, is_macho};
use crate::manifest::{ManifestError, PackageManifest};
use crate::materialize::{MaterializeError, materialize};
use crate::platform::PlatformStrategy;
use crate::summary::ConversionResult;
use crate::tool_configuration::ConverterConfig;

/// Errors that abort a conversion
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    EntryPoint(#[from] EntryPointError),

    #[error("failed to fix rpaths: {0}")]
    Relink(#[from] RelinkError),

    #[error("no runtime prefix given, pass --runtime-prefix or set CONDA_PREFIX to convert {0} packages")]
    MissingRuntimePrefix(Platform),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convert the package described by `config` with the Mach-O tools of the host.
pub fn convert(config: &ConverterConfig) -> Result<ConversionResult, ConvertError> {
    convert_with_toolchain(config, &MachOToolchain::default())
}

/// Convert the package described by `config`, relinking with `toolchain`.
pub fn convert_with_toolchain<T: BinaryToolchain>(
    config: &ConverterConfig,
    toolchain: &T,
) -> Result<ConversionResult, ConvertError> {
    let strategy = PlatformStrategy::for_platform(config.target_platform);
    let runtime_prefix = match (&config.runtime_prefix, strategy.fix_rpaths()) {
        (Some(prefix), true) => Some(prefix.as_path()),
        (None, true) => return Err(ConvertError::MissingRuntimePrefix(strategy.platform())),
        (_, false) => None,
    };

    tracing::info!(
        "Converting {} ({}) into {}",
        config.package_path.display(),
        strategy.platform(),
        config.output_dir.display()
    );

    let manifest = PackageManifest::from_package_directory(&config.package_path)?;
    let layout = OutputLayout::new(&config.output_dir, &config.package_name);
    layout.prepare()?;

    let classifier = Classifier::new(
        strategy.clone(),
        layout.clone(),
        config.ignored_names.iter().cloned(),
    );
    let records = manifest
        .entries()
        .iter()
        .map(|entry| classifier.record(manifest.root(), &entry.relative_path))
        .collect::<Vec<_>>();

    let materialized = materialize(&records)?;

    let rewritten = rewrite_dispatchers(strategy.dispatcher_rewrite(), &materialized.dispatchers)?;
    if !rewritten.is_empty() {
        tracing::info!("Rewrote {} dispatchers", rewritten.len());
    }

    let mut relinked = Vec::new();
    if let Some(prefix) = runtime_prefix {
        let mut roots = materialized.libraries.clone();
        for path in materialized
            .dispatchers
            .iter()
            .chain(materialized.data_files.iter())
        {
            if is_macho(path)? {
                roots.push(path.clone());
            }
        }
        relinked = fix_rpaths(toolchain, prefix, &roots)?;
        tracing::info!(
            "Fixed rpaths of {} binaries against {}",
            relinked.len(),
            prefix.display()
        );
    }

    let registry =
        DispatcherRegistry::from_dispatchers(layout.dispatcher_module(), &materialized.dispatchers)?;
    registry.write_launchers(layout.dispatcher_dir())?;
    register_entry_points(&registry, &config.pyproject)?;

    let mut result = ConversionResult::new(&materialized, manifest.len());
    result.entry_points = registry.len();
    result.relinked = relinked.len();
    result.log();
    Ok(result)
}

fn register_entry_points(
    registry: &DispatcherRegistry,
    pyproject: &Path,
) -> Result<(), EntryPointError> {
    if !pyproject.is_file() {
        tracing::warn!(
            "{} does not exist, {} entry points were not registered",
            pyproject.display(),
            registry.len()
        );
        return Ok(());
    }
    registry.register_scripts(pyproject)?;
    Ok(())
}
