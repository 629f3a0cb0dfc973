//! Platform capabilities, resolved once at startup.
//!
//! The classifier and the materializer never look at the platform directly.
//! Everything that differs between Linux, macOS and Windows packages is
//! captured here and handed down as a [`PlatformStrategy`].

use rattler_conda_types::Platform;

/// How dispatcher launchers need to be rewritten after copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherRewrite {
    /// Leave dispatchers untouched
    None,
    /// Point shell dispatchers at `bin/python` instead of `python.app`
    MacOsPythonApp,
    /// Simplify `.bat` dispatchers so they run from the wheel layout
    WindowsBatch,
}

/// The set of platform specific behaviours used during a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformStrategy {
    platform: Platform,
    library_suffixes: &'static [&'static str],
    windows_layout: bool,
    fix_rpaths: bool,
    dispatcher_rewrite: DispatcherRewrite,
}

impl PlatformStrategy {
    /// Select the strategy for the given target platform.
    pub fn for_platform(platform: Platform) -> Self {
        if platform.is_windows() {
            Self {
                platform,
                library_suffixes: &["pyd", "dll"],
                windows_layout: true,
                fix_rpaths: false,
                dispatcher_rewrite: DispatcherRewrite::WindowsBatch,
            }
        } else if platform.is_osx() {
            Self {
                platform,
                // python extension modules use `.so` on macOS as well
                library_suffixes: &["so"],
                windows_layout: false,
                fix_rpaths: true,
                dispatcher_rewrite: DispatcherRewrite::MacOsPythonApp,
            }
        } else {
            Self {
                platform,
                library_suffixes: &["so"],
                windows_layout: false,
                fix_rpaths: false,
                dispatcher_rewrite: DispatcherRewrite::None,
            }
        }
    }

    /// Strategy for the platform this binary was compiled for.
    pub fn current() -> Self {
        Self::for_platform(Platform::current())
    }

    /// The target platform
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Returns true if `extension` is a native library suffix on this platform.
    pub fn is_library_suffix(&self, extension: &str) -> bool {
        self.library_suffixes.contains(&extension)
    }

    /// Whether the `Library/` and `Lib/` prefixes of Windows packages are classified.
    pub fn windows_layout(&self) -> bool {
        self.windows_layout
    }

    /// Whether `@rpath` references need to be rewritten and binaries re-signed.
    pub fn fix_rpaths(&self) -> bool {
        self.fix_rpaths
    }

    /// The dispatcher rewrite to apply after copying.
    pub fn dispatcher_rewrite(&self) -> DispatcherRewrite {
        self.dispatcher_rewrite
    }
}
