//! Codec settings as they appear in a catalog's `settings:` block

use crate::aggregate::AggregateConfig;
use crate::flatten::{FlattenConfig, DEFAULT_CARTESIAN_ROW_CAP};
use crate::path::ResolverConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecSettings {
    /// Wildcard join/split separator
    pub separator: String,
    pub max_join_size: Option<usize>,
    /// Swallow missing-attribute and out-of-range errors
    pub ignore_errors: bool,
    /// Cell text written where a swallowed read had no value
    pub null_marker: Option<String>,
    pub cartesian_row_cap: usize,
    /// Let merge regions span neighbouring objects
    pub coalesce_merges: bool,
    /// Report repeated, non-adjacent row groups on import (debug builds by default)
    pub check_grouping: Option<bool>,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            separator: ",".to_string(),
            max_join_size: None,
            ignore_errors: false,
            null_marker: None,
            cartesian_row_cap: DEFAULT_CARTESIAN_ROW_CAP,
            coalesce_merges: false,
            check_grouping: None,
        }
    }
}

impl CodecSettings {
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            separator: self.separator.clone(),
            max_join_size: self.max_join_size,
            ignore_errors: self.ignore_errors,
            null_placeholder: self
                .null_marker
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        }
    }

    pub fn flatten_config(&self) -> FlattenConfig {
        FlattenConfig {
            resolver: self.resolver_config(),
            cartesian_row_cap: self.cartesian_row_cap,
            coalesce_merges: self.coalesce_merges,
        }
    }

    pub fn aggregate_config(&self) -> AggregateConfig {
        let defaults = AggregateConfig::default();
        AggregateConfig {
            resolver: self.resolver_config(),
            check_grouping: self.check_grouping.unwrap_or(defaults.check_grouping),
        }
    }
}
