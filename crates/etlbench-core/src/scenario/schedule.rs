//! Deterministic day-by-day timeline generation.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use etlbench_store::{OrderRecord, RunContext};

use super::{ScenarioConfig, ScenarioError};
use crate::domain::Invariant;

/// One simulated calendar day of the replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDay {
    pub index: usize,
    pub date: NaiveDate,
    /// Regular records created on `date`.
    pub batch: Vec<OrderRecord>,
    /// Injected records dated in the past.
    pub late_arrivals: Vec<OrderRecord>,
    /// Injected record dated exactly at the previous watermark.
    pub boundary_record: Option<OrderRecord>,
    /// 1, or 2 on duplicate-run days.
    pub invocations: u8,
    pub starts_new_month: bool,
    pub is_final: bool,
}

impl ScenarioDay {
    /// Everything inserted into the source on this day.
    pub fn records(&self) -> impl Iterator<Item = &OrderRecord> {
        self.batch
            .iter()
            .chain(&self.late_arrivals)
            .chain(self.boundary_record.iter())
    }

    /// Simulated "now" of an invocation: the night after `date`, an hour apart.
    pub fn run_context(&self, invocation: u8) -> RunContext {
        let midnight = self.date.and_time(NaiveTime::MIN);
        RunContext::new(
            midnight
                + TimeDelta::days(1)
                + TimeDelta::hours(i64::from(invocation)),
        )
    }

    /// Invariants to check after `invocation` (1-based), in declared order.
    pub fn invariants_due(&self, invocation: u8) -> Vec<Invariant> {
        let mut due = vec![Invariant::UniqueKeys, Invariant::ChronologicalLoadOrder];
        if invocation == 1 {
            if self.boundary_record.is_some() {
                due.push(Invariant::WatermarkBoundaryInclusive);
            }
            if self.starts_new_month {
                due.push(Invariant::MonthBoundaryAdmitted);
            }
            if !self.late_arrivals.is_empty() {
                due.push(Invariant::LateArrivalsAdmitted);
            }
        } else {
            due.push(Invariant::RerunIsNoop);
        }
        if self.is_final && invocation == self.invocations {
            due.push(Invariant::CompleteLoad);
        }
        due.sort();
        due
    }
}

/// Build the full timeline. Same config (including seed), same timeline.
pub fn build_schedule(config: &ScenarioConfig) -> Result<Vec<ScenarioDay>, ScenarioError> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut next_id: i64 = 1;
    let mut watermark: Option<NaiveDateTime> = None;
    let mut days = Vec::with_capacity(config.days);

    for index in 0..config.days {
        let date = shift_date(config.start_date, index as u64, true)?;

        let batch: Vec<OrderRecord> = (0..config.records_per_day)
            .map(|_| random_order(&mut rng, &mut next_id, date))
            .collect();

        let late_arrivals = if config.late_arrival_days.contains(&index) {
            let count = ((config.records_per_day as f64 * config.late_fraction).round() as usize).max(1);
            let late_date = shift_date(date, config.late_lag_days, false)?;
            (0..count)
                .map(|_| random_order(&mut rng, &mut next_id, late_date))
                .collect()
        } else {
            Vec::new()
        };

        let boundary_record = match (config.boundary_days.contains(&index), watermark) {
            (true, Some(at)) => {
                let mut record = random_order(&mut rng, &mut next_id, at.date());
                record.created_at = at;
                Some(record)
            }
            _ => None,
        };

        let starts_new_month = days
            .last()
            .is_some_and(|prev: &ScenarioDay| prev.date.month() != date.month());
        let invocations = if config.duplicate_run_days.contains(&index) {
            2
        } else {
            1
        };

        let day = ScenarioDay {
            index,
            date,
            batch,
            late_arrivals,
            boundary_record,
            invocations,
            starts_new_month,
            is_final: index + 1 == config.days,
        };
        watermark = day.records().map(|r| r.created_at).chain(watermark).max();
        days.push(day);
    }

    Ok(days)
}

/// Small slice of the timeline for the agent's workspace: the days around the
/// first month change (or the opening days), `per_day` regular records each,
/// plus every injected record of those days.
pub fn sample_orders(schedule: &[ScenarioDay], per_day: usize) -> Vec<OrderRecord> {
    let pivot = schedule
        .iter()
        .position(|d| d.starts_new_month)
        .unwrap_or(1);
    let start = pivot.saturating_sub(1);
    let end = (pivot + 2).min(schedule.len());

    let mut sample = Vec::new();
    for day in schedule.get(start..end).unwrap_or_default() {
        sample.extend(day.batch.iter().take(per_day).cloned());
        sample.extend(day.late_arrivals.iter().cloned());
        sample.extend(day.boundary_record.iter().cloned());
    }
    sample
}

/// Run context matching the last day covered by [`sample_orders`].
pub fn sample_run_context(schedule: &[ScenarioDay]) -> Option<RunContext> {
    let pivot = schedule
        .iter()
        .position(|d| d.starts_new_month)
        .unwrap_or(1);
    let last = (pivot + 2).min(schedule.len()).checked_sub(1)?;
    schedule.get(last).map(|d| d.run_context(1))
}

fn shift_date(date: NaiveDate, days: u64, forward: bool) -> Result<NaiveDate, ScenarioError> {
    let shifted = if forward {
        date.checked_add_days(Days::new(days))
    } else {
        date.checked_sub_days(Days::new(days))
    };
    shifted.ok_or_else(|| {
        ScenarioError::InvalidConfig(format!("date {date} shifted by {days} days is out of range"))
    })
}

fn random_order(rng: &mut StdRng, next_id: &mut i64, date: NaiveDate) -> OrderRecord {
    let second_of_day: i64 = rng.gen_range(0..86_400);
    let cents: i64 = rng.gen_range(500..50_000);
    let record = OrderRecord {
        order_id: *next_id,
        customer_id: rng.gen_range(1..=500),
        amount: cents as f64 / 100.0,
        created_at: date.and_time(NaiveTime::MIN) + TimeDelta::seconds(second_of_day),
    };
    *next_id += 1;
    record
}
