//! Import direction: consecutive flat rows -> records
//!
//! Rows are consumed one at a time. A row whose object-level cells differ from
//! the previous row's starts a new record; every row also contributes one
//! element to each expanded list unless all of that list's cells are blank.
//!
//! Callers must deliver the rows of one record contiguously, in export order.
//! A key that comes back after a different group forms a second record; with
//! `check_grouping` on this is reported as a [`FlatsheetError::GroupNotContiguous`]
//! issue.

use crate::error::{FlatsheetError, FlatsheetResult};
use crate::path::{PathResolver, ResolverConfig, Templates};
use crate::plan::{analyze, ColumnPlan, FlattenPlan};
use crate::schema::Record;
use crate::types::FlatRow;
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateConfig {
    pub resolver: ResolverConfig,
    /// Report keys that reappear after an intervening group
    pub check_grouping: bool,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            check_grouping: cfg!(debug_assertions),
        }
    }
}

/// A problem confined to one input row
#[derive(Debug)]
pub struct RowIssue {
    /// 0-based index into the data rows
    pub row: usize,
    pub column: Option<String>,
    pub error: FlatsheetError,
}

#[derive(Debug)]
pub struct AggregateOutput<T> {
    pub records: Vec<T>,
    pub issues: Vec<RowIssue>,
}

/// Rebuild records of type `T` from a full row batch
///
/// Records that fail to deserialize are dropped and reported against their
/// first row.
pub fn aggregate<T: Record>(
    rows: &[FlatRow],
    config: AggregateConfig,
) -> FlatsheetResult<AggregateOutput<T>> {
    let mut aggregator = Aggregator::for_record::<T>(config)?;
    let mut finished = Vec::new();

    for row in rows {
        if let Some(done) = aggregator.push_tracked(row)? {
            finished.push(done);
        }
    }
    finished.extend(aggregator.finish_tracked());

    let mut issues = aggregator.take_issues();
    let mut records = Vec::with_capacity(finished.len());
    for (first_row, value) in finished {
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push(record),
            Err(e) => issues.push(RowIssue {
                row: first_row,
                column: None,
                error: e.into(),
            }),
        }
    }
    issues.sort_by_key(|issue| issue.row);

    Ok(AggregateOutput { records, issues })
}

/// Streaming row-to-record state machine
pub struct Aggregator {
    plan: Arc<FlattenPlan>,
    resolver: PathResolver,
    /// Record being filled and the row it started on
    current: Option<(usize, Value)>,
    current_key: Option<Vec<String>>,
    /// Keys of finished groups, kept only while checking grouping
    seen_keys: Option<HashSet<Vec<String>>>,
    row_index: usize,
    issues: Vec<RowIssue>,
}

impl Aggregator {
    pub fn new(plan: Arc<FlattenPlan>, config: AggregateConfig) -> Self {
        Self {
            plan,
            resolver: PathResolver::new(config.resolver),
            current: None,
            current_key: None,
            seen_keys: config.check_grouping.then(HashSet::new),
            row_index: 0,
            issues: Vec::new(),
        }
    }

    pub fn for_record<T: Record>(config: AggregateConfig) -> FlatsheetResult<Self> {
        Ok(Self::new(analyze::<T>()?, config))
    }

    /// Feed the next row; returns the record it completed, if any
    pub fn push(&mut self, row: &FlatRow) -> FlatsheetResult<Option<Value>> {
        Ok(self.push_tracked(row)?.map(|(_, value)| value))
    }

    /// The record still being filled
    pub fn finish(&mut self) -> Option<Value> {
        self.finish_tracked().map(|(_, value)| value)
    }

    /// Per-row problems collected so far
    pub fn take_issues(&mut self) -> Vec<RowIssue> {
        std::mem::take(&mut self.issues)
    }

    fn finish_tracked(&mut self) -> Option<(usize, Value)> {
        if let (Some(key), Some(seen)) = (self.current_key.take(), self.seen_keys.as_mut()) {
            seen.insert(key);
        }
        self.current.take()
    }

    fn push_tracked(&mut self, row: &FlatRow) -> FlatsheetResult<Option<(usize, Value)>> {
        let plan = Arc::clone(&self.plan);
        let index = self.row_index;
        self.row_index += 1;

        let key: Vec<String> = plan
            .key_headers()
            .into_iter()
            .map(|header| row.cell(header).render().trim().to_string())
            .collect();

        let mut emitted = None;
        if self.current.is_none() || self.current_key.as_ref() != Some(&key) {
            emitted = self.finish_tracked();
            if self.seen_keys.as_ref().is_some_and(|seen| seen.contains(&key)) {
                let error = FlatsheetError::GroupNotContiguous {
                    row: index,
                    key: key.clone(),
                };
                warn!(record = %plan.type_name, "{}", error);
                self.issues.push(RowIssue {
                    row: index,
                    column: None,
                    error,
                });
            }

            let mut object = plan.zero_value();
            for column in &plan.columns {
                self.write(&mut object, column, row, index, plan.templates())?;
            }
            for group in &plan.groups {
                self.resolver.set_with(
                    &mut object,
                    &group.path,
                    Value::Array(Vec::new()),
                    plan.templates(),
                )?;
            }
            self.current = Some((index, object));
            self.current_key = Some(key);
        }

        for group in &plan.groups {
            if group.columns.iter().all(|c| row.cell(&c.header).is_blank()) {
                continue;
            }
            let mut element = group.element.clone();
            for column in &group.columns {
                self.write(&mut element, column, row, index, &group.templates)?;
            }
            if let Some((_, object)) = self.current.as_mut() {
                self.resolver
                    .push(object, &group.path, element, plan.templates())?;
            }
        }

        Ok(emitted)
    }

    /// Blank cells keep the zero value; unparseable ones become row issues
    fn write(
        &mut self,
        target: &mut Value,
        column: &ColumnPlan,
        row: &FlatRow,
        index: usize,
        templates: &dyn Templates,
    ) -> FlatsheetResult<()> {
        let cell = row.cell(&column.header);
        if cell.is_blank() {
            return Ok(());
        }
        match self
            .resolver
            .set_cell(target, &column.path, cell, column.kind, templates)
        {
            Err(error @ FlatsheetError::TypeCoercionFailure { .. }) => {
                debug!(row = index, column = %column.header, "{}", error);
                self.issues.push(RowIssue {
                    row: index,
                    column: Some(column.header.clone()),
                    error,
                });
                Ok(())
            }
            other => other,
        }
    }
}

/// Iterator adapter turning a row stream into a record stream
pub struct Aggregate<I> {
    rows: I,
    aggregator: Aggregator,
    done: bool,
}

impl<I> Aggregate<I> {
    pub fn new(rows: I, aggregator: Aggregator) -> Self {
        Self {
            rows,
            aggregator,
            done: false,
        }
    }

    pub fn take_issues(&mut self) -> Vec<RowIssue> {
        self.aggregator.take_issues()
    }
}

impl<I> Iterator for Aggregate<I>
where
    I: Iterator,
    I::Item: Borrow<FlatRow>,
{
    type Item = FlatsheetResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for row in self.rows.by_ref() {
            match self.aggregator.push(row.borrow()) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.done = true;
        self.aggregator.finish().map(Ok)
    }
}
