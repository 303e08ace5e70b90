use crate::models::{ratio_or_zero, CanonicalSeries, RollingAggregate, UsageRecord};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Trailing window length, counted in records of a single service.
pub const ROLLING_WINDOW: usize = 30;

#[derive(Debug, Default)]
struct Window<'a> {
    records: VecDeque<&'a UsageRecord>,
    operations: u64,
}

impl<'a> Window<'a> {
    fn push(&mut self, record: &'a UsageRecord) {
        if self.records.len() == ROLLING_WINDOW {
            if let Some(old) = self.records.pop_front() {
                self.operations -= old.total_operations;
            }
        }
        self.operations += record.total_operations;
        self.records.push_back(record);
    }

    fn aggregate(&self, record: &UsageRecord) -> RollingAggregate {
        let len = self.records.len();
        // Float sums are taken over the window, not kept as running totals.
        let credits: f64 = self.records.iter().map(|r| r.total_credits).sum();
        let users: f64 = self.records.iter().map(|r| r.daily_unique_users).sum();
        let users_avg = users / len as f64;
        RollingAggregate {
            date: record.date,
            service_type: record.service_type.clone(),
            credits_30d_total: credits,
            operations_30d_total: self.operations,
            users_30d_avg: users_avg,
            cost_per_user_30d: ratio_or_zero(credits, users_avg),
            window_len: len,
        }
    }
}

/// Computes one trailing aggregate per record, in series order.
///
/// Windows never mix services, and they count available records rather than
/// calendar days: a service that reports every other day gets a window that
/// spans roughly twice as many days as one that reports daily.
pub fn rolling_aggregates(series: &CanonicalSeries) -> Vec<RollingAggregate> {
    let mut windows: HashMap<&str, Window<'_>> = HashMap::new();
    let mut out = Vec::with_capacity(series.records().len());

    for record in series.records() {
        let window = windows.entry(record.service_type.as_str()).or_default();
        window.push(record);
        out.push(window.aggregate(record));
    }

    out
}

/// The aggregate attached to each service's chronologically last record,
/// ordered by service type.
pub fn latest_per_service(aggregates: &[RollingAggregate]) -> Vec<RollingAggregate> {
    let mut latest: BTreeMap<&str, &RollingAggregate> = BTreeMap::new();
    for agg in aggregates {
        match latest.get(agg.service_type.as_str()) {
            Some(current) if current.date > agg.date => {}
            _ => {
                latest.insert(agg.service_type.as_str(), agg);
            }
        }
    }
    latest.into_values().cloned().collect()
}
