//! Mach-O specific post processing.
pub mod link;
pub mod relink;

pub use link::{BinaryToolchain, MachOToolchain, is_macho};
pub use relink::{FixState, RelinkError, RpathFixer, fix_rpaths};
