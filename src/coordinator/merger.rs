//! Combines per-database grids into one text block.
//!
//! Databases share no declared keys, so the join column is guessed from
//! names: a column ending in `id` that appears in at least two grids. When
//! several candidates appear in the same number of grids the lexically
//! smallest (lower-cased) name wins. The first grid in branch order that has
//! the key is the join base, so surviving rows keep its order.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::coordinator::execution::AggregateResult;
use crate::grid::{write_grid, ParsedGrid};

/// A joined table built from several grids.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTable {
    pub key: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Database names that took part in the join.
    pub sources: Vec<String>,
}

/// Result of merging one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedData {
    pub joined: Option<JoinedTable>,
    pub text: String,
}

/// Picks the join column shared by the most grids, if at least two share one.
pub fn find_join_key(grids: &[ParsedGrid]) -> Option<String> {
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for grid in grids {
        let mut seen: Vec<String> = grid
            .columns
            .iter()
            .map(|c| c.to_lowercase())
            .filter(|c| c.ends_with("id"))
            .collect();
        seen.sort();
        seen.dedup();
        for candidate in seen {
            *tally.entry(candidate).or_default() += 1;
        }
    }

    // BTreeMap iterates in lexical order; keep the first of equal counts
    let mut best: Option<(&String, usize)> = None;
    for (name, count) in &tally {
        if *count >= 2 && best.is_none_or(|(_, best_count)| *count > best_count) {
            best = Some((name, *count));
        }
    }
    best.map(|(name, _)| name.clone())
}

/// Inner-joins every grid holding `key` onto the first such grid. A base row
/// survives only if every other grid has a row with an equal key value
/// (compared case-insensitively); the first matching row is used.
pub fn inner_join(grids: &[ParsedGrid], key: &str) -> Option<JoinedTable> {
    let participants: Vec<(&ParsedGrid, &str)> = grids
        .iter()
        .filter_map(|g| g.column(key).map(|column| (g, column)))
        .collect();
    let ((base, base_key), others) = participants.split_first()?;
    if others.is_empty() {
        return None;
    }

    // (grid index in participants, source column) per output column
    let mut layout: Vec<(usize, String)> = base.columns.iter().map(|c| (0, c.clone())).collect();
    for (index, (grid, _)) in others.iter().enumerate() {
        for column in &grid.columns {
            if !layout.iter().any(|(_, c)| c.eq_ignore_ascii_case(column)) {
                layout.push((index + 1, column.clone()));
            }
        }
    }

    let mut rows = Vec::new();
    'rows: for base_row in &base.rows {
        let Some(value) = base_row.get(*base_key).filter(|v| is_joinable(v)) else {
            continue;
        };

        let mut matched = vec![base_row];
        for (grid, grid_key) in others {
            let found = grid.rows.iter().find(|row| {
                row.get(*grid_key)
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case(value.trim()))
            });
            match found {
                Some(row) => matched.push(row),
                None => continue 'rows,
            }
        }

        rows.push(
            layout
                .iter()
                .map(|(index, column)| matched[*index].get(column).cloned().unwrap_or_default())
                .collect(),
        );
    }

    Some(JoinedTable {
        key: (*base_key).to_string(),
        columns: layout.into_iter().map(|(_, c)| c).collect(),
        rows,
        sources: participants
            .iter()
            .map(|(g, _)| g.database_name.clone())
            .collect(),
    })
}

fn is_joinable(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.eq_ignore_ascii_case("NULL")
}

/// Renders the combined table (when a join produced rows) followed by every
/// branch's own grid or error.
pub fn merge_results(aggregate: &AggregateResult) -> MergedData {
    let grids: Vec<ParsedGrid> = aggregate
        .successful()
        .filter_map(|r| ParsedGrid::parse(&r.database_id, &r.database_name, &r.raw_result_grid))
        .filter(|g| !g.is_empty())
        .collect();

    let joined = if grids.len() >= 2 {
        find_join_key(&grids).and_then(|key| {
            debug!("Joining {} grids on {}", grids.len(), key);
            inner_join(&grids, &key)
        })
    } else {
        None
    };
    let joined = joined.filter(|j| !j.rows.is_empty());

    let mut sections = Vec::new();
    if let Some(table) = &joined {
        info!(
            "Merged {} rows across {} databases on {}",
            table.rows.len(),
            table.sources.len(),
            table.key
        );
        // Writes into memory only
        let body = write_grid(&table.columns, &table.rows).unwrap_or_default();
        sections.push(format!(
            "=== Combined results ({} joined on {}) ===\n{}",
            table.sources.join(" + "),
            table.key,
            body
        ));
    }

    for result in &aggregate.branch_results {
        let body = if result.success {
            result.raw_result_grid.trim_end().to_string()
        } else {
            format!(
                "Error: {}",
                result.error_message.as_deref().unwrap_or("Unknown error")
            )
        };
        sections.push(format!(
            "=== {} ({}) ===\n{}",
            result.database_name, result.database_id, body
        ));
    }

    MergedData {
        joined,
        text: sections.join("\n\n"),
    }
}
