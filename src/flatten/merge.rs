//! Vertical merge regions over flattened rows

use crate::plan::MergeRule;
use crate::types::{CellValue, FlatRow, MergeRegion};
use std::ops::Range;

/// Regions for every mergeable column, ordered by start row then column order
///
/// `spans` are the row ranges of the source objects. A column merges over an
/// object's whole range only when it and every column it depends on hold one
/// value throughout. With `coalesce`, eligible ranges of neighbouring objects
/// join when those values also match across the boundary.
pub fn merge_regions(
    rules: &[MergeRule],
    rows: &[FlatRow],
    spans: &[Range<usize>],
    coalesce: bool,
) -> Vec<MergeRegion> {
    let mut regions: Vec<(usize, MergeRegion)> = Vec::new();

    for (order, rule) in rules.iter().enumerate() {
        let mut run: Option<(Range<usize>, Vec<&CellValue>)> = None;

        for span in spans {
            let values = match constant_values(rule, rows, span) {
                Some(values) => values,
                None => {
                    close(order, rule, run.take(), &mut regions);
                    continue;
                }
            };

            run = match run.take() {
                Some((current, current_values))
                    if coalesce && current.end == span.start && current_values == values =>
                {
                    Some((current.start..span.end, current_values))
                }
                previous => {
                    close(order, rule, previous, &mut regions);
                    Some((span.clone(), values))
                }
            };
        }
        close(order, rule, run, &mut regions);
    }

    regions.sort_by_key(|(order, region)| (region.start_row, *order));
    regions.into_iter().map(|(_, region)| region).collect()
}

fn close<'a>(
    order: usize,
    rule: &MergeRule,
    run: Option<(Range<usize>, Vec<&'a CellValue>)>,
    regions: &mut Vec<(usize, MergeRegion)>,
) {
    if let Some((range, _)) = run {
        if range.len() >= 2 {
            regions.push((order, MergeRegion::new(rule.column.clone(), range.start, range.end)));
        }
    }
}

/// Values of the column and its ancestors when each is constant over `span`
fn constant_values<'a>(
    rule: &MergeRule,
    rows: &'a [FlatRow],
    span: &Range<usize>,
) -> Option<Vec<&'a CellValue>> {
    let block = rows.get(span.clone())?;
    let first = block.first()?;

    std::iter::once(&rule.column)
        .chain(rule.ancestors.iter())
        .map(|column| {
            let value = first.cell(column);
            block
                .iter()
                .all(|row| row.cell(column) == value)
                .then_some(value)
        })
        .collect()
}
