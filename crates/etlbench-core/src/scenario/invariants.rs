//! Invariant checks over target snapshots.
//!
//! Each check sees the target table before and after one invocation and
//! returns a detail message on failure.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use etlbench_store::{format_record_date, parse_record_date, OrderRecord, TargetRow};

use super::schedule::ScenarioDay;
use crate::domain::Invariant;

/// Everything a check may look at for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub day: &'a ScenarioDay,
    pub invocation: u8,
    pub before: &'a [TargetRow],
    pub after: &'a [TargetRow],
    /// Keys of every source record inserted so far.
    pub source_keys: &'a BTreeSet<i64>,
}

/// Check one invariant. `Err` carries the failure detail.
pub fn check(invariant: Invariant, obs: &Observation<'_>) -> Result<(), String> {
    match invariant {
        Invariant::UniqueKeys => unique_keys(obs.after),
        Invariant::ChronologicalLoadOrder => chronological_load_order(obs.before, obs.after),
        Invariant::RerunIsNoop => rerun_is_noop(obs.before, obs.after),
        Invariant::WatermarkBoundaryInclusive => match &obs.day.boundary_record {
            Some(record) => boundary_present_once(record, obs.after),
            None => Ok(()),
        },
        Invariant::MonthBoundaryAdmitted => {
            all_present("new-month records", &obs.day.batch, obs.after)
        }
        Invariant::LateArrivalsAdmitted => {
            all_present("late-arriving records", &obs.day.late_arrivals, obs.after)
        }
        Invariant::CompleteLoad => complete_load(obs.source_keys, obs.after),
    }
}

fn key_counts(rows: &[TargetRow]) -> BTreeMap<Option<i64>, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.order_id).or_insert(0) += 1;
    }
    counts
}

fn unique_keys(after: &[TargetRow]) -> Result<(), String> {
    let counts = key_counts(after);
    if let Some(nulls) = counts.get(&None) {
        return Err(format!("{nulls} row(s) have a NULL order_id"));
    }
    let duplicated: Vec<(i64, usize)> = counts
        .iter()
        .filter_map(|(key, &n)| key.filter(|_| n > 1).map(|k| (k, n)))
        .collect();
    match duplicated.first() {
        Some((key, n)) => Err(format!(
            "order_id {key} appears {n} times ({} duplicated key(s) in total)",
            duplicated.len()
        )),
        None => Ok(()),
    }
}

fn chronological_load_order(before: &[TargetRow], after: &[TargetRow]) -> Result<(), String> {
    let existing: HashSet<&TargetRow> = before.iter().collect();
    let mut previous = None;

    for row in after.iter().filter(|row| !existing.contains(row)) {
        let text = row
            .created_at
            .as_deref()
            .ok_or_else(|| format!("rowid {} has a NULL created_at", row.rowid))?;
        let at = parse_record_date(text)
            .ok_or_else(|| format!("rowid {} has unparseable created_at '{text}'", row.rowid))?;

        if let Some((prev_rowid, prev_at)) = previous {
            if at < prev_at {
                return Err(format!(
                    "rowid {} ({}) was written after rowid {prev_rowid} ({})",
                    row.rowid,
                    format_record_date(&at),
                    format_record_date(&prev_at),
                ));
            }
        }
        previous = Some((row.rowid, at));
    }
    Ok(())
}

fn rerun_is_noop(before: &[TargetRow], after: &[TargetRow]) -> Result<(), String> {
    if before.len() != after.len() {
        return Err(format!(
            "row count changed from {} to {} on rerun",
            before.len(),
            after.len()
        ));
    }
    if key_counts(before) != key_counts(after) {
        return Err("key multiset changed on rerun".to_string());
    }
    Ok(())
}

fn boundary_present_once(record: &OrderRecord, after: &[TargetRow]) -> Result<(), String> {
    let n = after
        .iter()
        .filter(|row| row.order_id == Some(record.order_id))
        .count();
    match n {
        1 => Ok(()),
        0 => Err(format!(
            "order_id {} dated {} (equal to the watermark) was not loaded",
            record.order_id,
            record.created_at_text()
        )),
        n => Err(format!(
            "order_id {} dated {} was loaded {n} times",
            record.order_id,
            record.created_at_text()
        )),
    }
}

fn all_present(what: &str, expected: &[OrderRecord], after: &[TargetRow]) -> Result<(), String> {
    let loaded: HashSet<i64> = after.iter().filter_map(|row| row.order_id).collect();
    let missing: Vec<&OrderRecord> = expected
        .iter()
        .filter(|r| !loaded.contains(&r.order_id))
        .collect();
    match missing.first() {
        None => Ok(()),
        Some(first) => Err(format!(
            "{} of {} {what} missing (first: order_id {} dated {})",
            missing.len(),
            expected.len(),
            first.order_id,
            first.created_at_text()
        )),
    }
}

fn complete_load(source_keys: &BTreeSet<i64>, after: &[TargetRow]) -> Result<(), String> {
    let loaded: BTreeSet<i64> = after.iter().filter_map(|row| row.order_id).collect();
    let missing = source_keys.difference(&loaded).count();
    let extra = loaded.difference(source_keys).count();
    if missing > 0 || extra > 0 || after.len() != source_keys.len() {
        return Err(format!(
            "target has {} rows, a full load has {} ({missing} key(s) missing, {extra} unexpected)",
            after.len(),
            source_keys.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rowid: i64, key: i64, at: &str) -> TargetRow {
        TargetRow {
            rowid,
            order_id: Some(key),
            created_at: Some(at.to_string()),
        }
    }

    #[test]
    fn test_unique_keys() {
        assert!(unique_keys(&[row(1, 1, "x"), row(2, 2, "x")]).is_ok());
        let err = unique_keys(&[row(1, 1, "x"), row(2, 1, "x"), row(3, 2, "x")]).unwrap_err();
        assert!(err.starts_with("order_id 1 appears 2 times"), "{err}");

        let null = TargetRow {
            rowid: 4,
            order_id: None,
            created_at: None,
        };
        assert!(unique_keys(&[null]).unwrap_err().contains("NULL"));
    }

    #[test]
    fn test_chronological_order_only_checks_new_rows() {
        let before = vec![row(1, 1, "02/02/2024 00:00:00")];
        // Old row is later than the new ones; only the new rows are compared.
        let after = vec![
            row(1, 1, "02/02/2024 00:00:00"),
            row(2, 2, "31/01/2024 10:00:00"),
            row(3, 3, "01/02/2024 09:00:00"),
        ];
        assert!(chronological_load_order(&before, &after).is_ok());

        let inverted = vec![
            row(1, 3, "01/02/2024 09:00:00"),
            row(2, 2, "31/01/2024 10:00:00"),
        ];
        let err = chronological_load_order(&[], &inverted).unwrap_err();
        assert!(err.contains("rowid 2 (31/01/2024 10:00:00)"), "{err}");
    }

    #[test]
    fn test_unparseable_date_fails() {
        let after = vec![row(1, 1, "yesterday")];
        assert!(chronological_load_order(&[], &after)
            .unwrap_err()
            .contains("unparseable"));
    }

    #[test]
    fn test_rerun_noop() {
        let rows = vec![row(1, 1, "x"), row(2, 2, "x")];
        assert!(rerun_is_noop(&rows, &rows).is_ok());
        let mut grown = rows.clone();
        grown.push(row(3, 2, "x"));
        assert!(rerun_is_noop(&rows, &grown)
            .unwrap_err()
            .contains("from 2 to 3"));
    }

    #[test]
    fn test_complete_load() {
        let keys: BTreeSet<i64> = [1, 2].into_iter().collect();
        assert!(complete_load(&keys, &[row(1, 1, "x"), row(2, 2, "x")]).is_ok());
        let err = complete_load(&keys, &[row(1, 1, "x")]).unwrap_err();
        assert!(err.contains("1 key(s) missing"), "{err}");
    }
}
