//! Export direction: records -> flat rows + merge regions

mod merge;

pub use merge::merge_regions;

use crate::coerce::json_to_cell;
use crate::error::{FlatsheetError, FlatsheetResult};
use crate::path::{PathResolver, ResolverConfig};
use crate::plan::{analyze, ColumnPlan, FlattenPlan, GroupPlan};
use crate::schema::Record;
use crate::types::{CellKind, CellValue, FlatRow, MergeRegion, MultiListStrategy};
use serde::Serialize;
use serde_json::Value;
use std::ops::Range;
use tracing::{debug, warn};

/// Row ceiling for one object under CARTESIAN expansion
pub const DEFAULT_CARTESIAN_ROW_CAP: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct FlattenConfig {
    pub resolver: ResolverConfig,
    pub cartesian_row_cap: usize,
    /// Let merge regions continue across object boundaries
    pub coalesce_merges: bool,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            cartesian_row_cap: DEFAULT_CARTESIAN_ROW_CAP,
            coalesce_merges: false,
        }
    }
}

/// A non-fatal problem met while flattening one object
#[derive(Debug)]
pub struct FlattenIssue {
    /// Index of the source object
    pub object: usize,
    pub error: FlatsheetError,
}

#[derive(Debug, Default, Serialize)]
pub struct FlattenOutput {
    pub headers: Vec<String>,
    pub rows: Vec<FlatRow>,
    pub merges: Vec<MergeRegion>,
    #[serde(skip)]
    pub issues: Vec<FlattenIssue>,
}

/// Flatten `objects` with the default configuration
pub fn flatten<T: Record>(objects: &[T]) -> FlatsheetResult<FlattenOutput> {
    Flattener::new(FlattenConfig::default()).flatten(objects)
}

pub struct Flattener {
    config: FlattenConfig,
    resolver: PathResolver,
}

impl Flattener {
    pub fn new(config: FlattenConfig) -> Self {
        let resolver = PathResolver::new(config.resolver.clone());
        Self { config, resolver }
    }

    pub fn flatten<T: Record>(&self, objects: &[T]) -> FlatsheetResult<FlattenOutput> {
        let plan = analyze::<T>()?;
        let values = objects
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.flatten_values(&values, &plan)
    }

    /// Flatten records already in value form
    ///
    /// Rows of one object are contiguous and follow source order. A path or
    /// list error aborts the batch, tagged with the failing object's index.
    pub fn flatten_values(
        &self,
        objects: &[Value],
        plan: &FlattenPlan,
    ) -> FlatsheetResult<FlattenOutput> {
        let mut output = FlattenOutput {
            headers: plan.headers.clone(),
            ..FlattenOutput::default()
        };
        let mut spans: Vec<Range<usize>> = Vec::with_capacity(objects.len());

        for (index, object) in objects.iter().enumerate() {
            let rows = self
                .expand(index, object, plan, &mut output.issues)
                .map_err(|e| e.in_object(index))?;
            let start = output.rows.len();
            output.rows.extend(rows);
            spans.push(start..output.rows.len());
        }

        output.merges = merge_regions(
            &plan.merge_rules,
            &output.rows,
            &spans,
            self.config.coalesce_merges,
        );

        debug!(
            record = %plan.type_name,
            objects = objects.len(),
            rows = output.rows.len(),
            merges = output.merges.len(),
            "flattened batch"
        );
        Ok(output)
    }

    /// All rows of one object; nothing is emitted unless every row succeeds
    fn expand(
        &self,
        index: usize,
        object: &Value,
        plan: &FlattenPlan,
        issues: &mut Vec<FlattenIssue>,
    ) -> FlatsheetResult<Vec<FlatRow>> {
        let mut object_cells = Vec::with_capacity(plan.columns.len());
        for column in &plan.columns {
            object_cells.push((column.header.as_str(), self.read_cell(object, column)?));
        }

        let mut lists: Vec<&[Value]> = Vec::with_capacity(plan.groups.len());
        for group in &plan.groups {
            let mut items = self.resolver.get_list(object, &group.path)?;
            if let Some(cap) = group.max_rows {
                if items.len() > cap {
                    debug!(
                        attribute = %group.attribute,
                        len = items.len(),
                        cap,
                        "list truncated to max_rows"
                    );
                    items = &items[..cap];
                }
            }
            lists.push(items);
        }

        let lengths: Vec<usize> = lists.iter().map(|l| l.len()).collect();
        let selections = self.select(index, plan, &lengths, issues);

        let mut rows = Vec::with_capacity(selections.len());
        for selection in selections {
            let mut row = FlatRow::with_columns(&plan.headers);
            for (header, cell) in &object_cells {
                row.insert(*header, cell.clone());
            }
            for ((group, items), picked) in plan.groups.iter().zip(&lists).zip(&selection) {
                if let Some(i) = picked {
                    self.write_element(&mut row, group, &items[*i])?;
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn write_element(
        &self,
        row: &mut FlatRow,
        group: &GroupPlan,
        element: &Value,
    ) -> FlatsheetResult<()> {
        for column in &group.columns {
            row.insert(column.header.clone(), self.read_cell(element, column)?);
        }
        Ok(())
    }

    fn read_cell(&self, root: &Value, column: &ColumnPlan) -> FlatsheetResult<CellValue> {
        let value = self.resolver.get(root, &column.path)?;
        // Joined wildcard text stays text whatever the element kind
        let kind = if column.path.is_wildcard() {
            CellKind::Auto
        } else {
            column.kind
        };
        Ok(json_to_cell(&value, kind))
    }

    /// Element index chosen from each list, per output row; `None` is a blank
    fn select(
        &self,
        index: usize,
        plan: &FlattenPlan,
        lengths: &[usize],
        issues: &mut Vec<FlattenIssue>,
    ) -> Vec<Vec<Option<usize>>> {
        if lengths.is_empty() {
            return vec![Vec::new()];
        }

        let pick = |row: usize| -> Vec<Option<usize>> {
            lengths
                .iter()
                .map(|&len| (row < len).then_some(row))
                .collect()
        };

        match plan.strategy {
            MultiListStrategy::MaxLength => {
                let count = lengths.iter().copied().max().unwrap_or(0).max(1);
                (0..count).map(pick).collect()
            }
            MultiListStrategy::MinLength => {
                let count = lengths.iter().copied().min().unwrap_or(0);
                if count == 0 {
                    return vec![vec![None; lengths.len()]];
                }
                (0..count).map(pick).collect()
            }
            MultiListStrategy::Cartesian => self.cartesian(index, plan, lengths, issues),
        }
    }

    /// Every combination, last list varying fastest; empty lists count as one blank
    fn cartesian(
        &self,
        index: usize,
        plan: &FlattenPlan,
        lengths: &[usize],
        issues: &mut Vec<FlattenIssue>,
    ) -> Vec<Vec<Option<usize>>> {
        let radices: Vec<usize> = lengths.iter().map(|&len| len.max(1)).collect();
        let requested = radices
            .iter()
            .try_fold(1usize, |acc, &r| acc.checked_mul(r))
            .unwrap_or(usize::MAX);

        let cap = self.config.cartesian_row_cap;
        let count = if requested > cap {
            let error = FlatsheetError::CartesianExplosion { requested, cap };
            warn!(record = %plan.type_name, object = index, "{}", error);
            issues.push(FlattenIssue {
                object: index,
                error,
            });
            cap.max(1)
        } else {
            requested
        };

        let mut digits = vec![0usize; radices.len()];
        let mut selections = Vec::with_capacity(count);
        for _ in 0..count {
            selections.push(
                digits
                    .iter()
                    .zip(lengths)
                    .map(|(&d, &len)| (len > 0).then_some(d))
                    .collect(),
            );
            for pos in (0..digits.len()).rev() {
                digits[pos] += 1;
                if digits[pos] < radices[pos] {
                    break;
                }
                digits[pos] = 0;
            }
        }
        selections
    }
}
