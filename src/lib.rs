//! Flatsheet - structural codec between nested records and flat spreadsheet rows
//!
//! Export flattens records into header-keyed rows plus vertical merge regions;
//! import regroups consecutive rows back into records.
//!
//! # Features
//!
//! - Path expressions (`dept.leader.name`, `skills[0]`, `skills[*]`, `properties[city]`)
//! - Nested composites flattened up to a depth ceiling, with prefix/suffix naming
//! - List attributes expanded into rows: MAX_LENGTH, MIN_LENGTH or CARTESIAN
//! - Hierarchical merge regions (`depends_on` chains)
//! - Streaming import with per-row issue reporting
//! - Excel import/export
//!
//! # Example
//!
//! ```no_run
//! use royalbit_flatsheet::{aggregate, flatten, AggregateConfig, CellKind, Field, Record, Schema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
//! struct Item {
//!     name: String,
//!     qty: u32,
//! }
//!
//! impl Record for Item {
//!     fn schema() -> Schema {
//!         Schema::new("Item")
//!             .field(Field::column("name", "name", CellKind::Text))
//!             .field(Field::column("qty", "qty", CellKind::Integer))
//!     }
//! }
//!
//! #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
//! struct Order {
//!     order_no: String,
//!     items: Vec<Item>,
//! }
//!
//! impl Record for Order {
//!     fn schema() -> Schema {
//!         Schema::new("Order")
//!             .field(Field::column("order_no", "orderNo", CellKind::Text).merge())
//!             .field(Field::many::<Item>("items").prefix("item-"))
//!     }
//! }
//!
//! let orders = vec![Order {
//!     order_no: "O1".to_string(),
//!     items: vec![Item { name: "A".to_string(), qty: 1 }],
//! }];
//! let flat = flatten(&orders)?;
//! let back = aggregate::<Order>(&flat.rows, AggregateConfig::default())?;
//! assert_eq!(back.records, orders);
//! # Ok::<(), royalbit_flatsheet::FlatsheetError>(())
//! ```

pub mod aggregate;
pub mod cli;
pub mod coerce;
pub mod config;
pub mod error;
pub mod excel;
pub mod flatten;
pub mod path;
pub mod plan;
pub mod schema;
pub mod types;

// Re-export commonly used types
pub use aggregate::{aggregate, Aggregate, AggregateConfig, AggregateOutput, Aggregator, RowIssue};
pub use config::CodecSettings;
pub use error::{FlatsheetError, FlatsheetResult};
pub use flatten::{flatten, FlattenConfig, FlattenIssue, FlattenOutput, Flattener};
pub use path::{Path, PathResolver, ResolverConfig};
pub use plan::{analyze, FlattenPlan};
pub use schema::{Catalog, Field, Record, Schema};
pub use types::{CellKind, CellValue, FlatRow, MergeRegion, MultiListStrategy};
