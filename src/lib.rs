//! The library pieces of `conda-to-wheel`: repackaging conda-built packages
//! into a wheel source tree, downloading CI artifacts and stamping versions.

pub mod artifact;
pub mod classify;
pub mod console_utils;
pub mod consts;
pub mod convert;
pub mod dispatchers;
pub mod entry_points;
pub mod layout;
pub mod macos;
pub mod manifest;
pub mod materialize;
pub mod opt;
pub mod platform;
pub mod summary;
pub mod system_tools;
pub mod tool_configuration;
pub mod utils;
pub mod version;

mod permissions;
