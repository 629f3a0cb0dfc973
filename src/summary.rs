//! The outcome of a conversion run.
use std::fmt;

use crate::materialize::Materialized;

/// Counts of a conversion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionResult {
    /// Files copied into the output layout
    pub copied: usize,
    /// Manifest entries that were not copied
    pub ignored: usize,
    /// Manifest entries processed, copied or ignored
    pub total: usize,
    /// Number of entries in the package manifest
    pub expected: usize,
    pub dispatchers: usize,
    pub libraries: usize,
    pub data_files: usize,
    pub modules: usize,
    /// Generated launchers
    pub entry_points: usize,
    /// Mach-O binaries whose rpaths were rewritten
    pub relinked: usize,
}

impl ConversionResult {
    /// Summarize the copy step of a package with `expected` manifest entries.
    pub fn new(materialized: &Materialized, expected: usize) -> Self {
        Self {
            copied: materialized.copied,
            ignored: materialized.ignored,
            total: materialized.processed(),
            expected,
            dispatchers: materialized.dispatchers.len(),
            libraries: materialized.libraries.len(),
            data_files: materialized.data_files.len(),
            modules: materialized.modules.len(),
            entry_points: 0,
            relinked: 0,
        }
    }

    /// Every manifest entry was accounted for.
    pub fn is_satisfied(&self) -> bool {
        self.total == self.expected
    }

    /// The summary as a table.
    pub fn table(&self) -> comfy_table::Table {
        let mut table = comfy_table::Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_FULL_CONDENSED)
            .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
            .set_header(vec!["Files", "Count"]);

        for (label, count) in [
            ("Dispatchers", self.dispatchers),
            ("Shared libraries", self.libraries),
            ("Data files", self.data_files),
            ("Modules", self.modules),
            ("Copied", self.copied),
            ("Ignored", self.ignored),
            ("Total", self.total),
            ("Manifest entries", self.expected),
            ("Entry points", self.entry_points),
            ("Relinked", self.relinked),
        ] {
            table.add_row(vec![label.to_string(), count.to_string()]);
        }
        table
    }

    /// Log the summary table.
    pub fn log(&self) {
        tracing::info!("\n{}", self.table());
        if !self.is_satisfied() {
            tracing::error!(
                "Processed {} files but the manifest lists {}",
                self.total,
                self.expected
            );
        }
    }
}

impl fmt::Display for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "copied {} files, ignored {}, processed {} of {}",
            self.copied, self.ignored, self.total, self.expected
        )
    }
}
