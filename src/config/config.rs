use crate::common::constants::{
    DEFAULT_NON_DETERMINISTIC_FUNCTIONS, DEFAULT_PROGRESS_INTERVAL, ENV_PREFIX,
};
use crate::common::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Query engine settings.
///
/// Every field has a default, so an empty configuration is valid. Settings
/// are read-only for the duration of a query run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Allows equi-joins to run as hash joins.
    pub use_hash_join: bool,
    /// Allows inequality joins to run as parallel sort-merge joins.
    pub use_sort_merge_join: bool,
    /// Allows independent CTEs of one dependency level to run concurrently.
    pub use_cte_parallelization: bool,
    /// Enables common subexpression elimination over each evaluation scope.
    pub use_common_subexpression_elimination: bool,
    /// Function names whose results must never be cached. Compared
    /// case-insensitively.
    pub non_deterministic_functions: BTreeSet<String>,
    /// Number of probe-side partitions for the sort-merge join.
    pub merge_partitions: usize,
    /// Rows between data source progress callbacks.
    pub progress_interval: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_hash_join: true,
            use_sort_merge_join: true,
            use_cte_parallelization: true,
            use_common_subexpression_elimination: true,
            non_deterministic_functions: DEFAULT_NON_DETERMINISTIC_FUNCTIONS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            merge_partitions: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl Settings {
    /// Loads settings from an optional file, overlaid with `RUSTYQUERY_*`
    /// environment variables, e.g. `RUSTYQUERY_USE_HASH_JOIN=false`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("non_deterministic_functions"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings.normalized())
    }

    /// Returns true if calls to the named function must never be cached.
    pub fn is_non_deterministic(&self, name: &str) -> bool {
        self.non_deterministic_functions
            .contains(&name.to_lowercase())
    }

    /// Lowercases function names and clamps counts to sane minimums.
    fn normalized(mut self) -> Self {
        self.non_deterministic_functions = self
            .non_deterministic_functions
            .iter()
            .map(|name| name.to_lowercase())
            .collect();
        self.merge_partitions = self.merge_partitions.max(1);
        self.progress_interval = self.progress_interval.max(1);
        self
    }

    /// Settings with every optimization switched off: nested loop joins,
    /// sequential CTEs, no subexpression caching.
    pub fn baseline() -> Self {
        Self {
            use_hash_join: false,
            use_sort_merge_join: false,
            use_cte_parallelization: false,
            use_common_subexpression_elimination: false,
            ..Self::default()
        }
    }
}
