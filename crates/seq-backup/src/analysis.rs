// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Aggregate views over a set of request records.
//!
//! All rankings are descending and stable: equal counts or durations keep
//! the order in which their key first appeared in the input.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Local, Timelike};

use crate::record::{LogRecord, SENTINEL};

const TOP_ROUTES: usize = 5;
const TOP_SLOWEST: usize = 10;
const TOP_STAFF: usize = 5;
const TOP_COMPANIES: usize = 5;
const TOP_AVERAGE: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct SlowRequest {
    pub route: String,
    pub duration: i64,
    pub trace_id: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisReport {
    pub total: usize,
    pub top_routes: Vec<(String, usize)>,
    /// Ascending by status code.
    pub status_codes: Vec<(i32, usize)>,
    pub slowest: Vec<SlowRequest>,
    /// Ascending by hour of day, local time. Hours without requests are omitted.
    pub hourly: Vec<(u32, usize)>,
    pub top_staff: Vec<(String, usize)>,
    pub top_companies: Vec<(String, usize)>,
    /// Mean duration in milliseconds.
    pub average_duration_by_route: Vec<(String, f64)>,
}

/// Counts keys preserving first-appearance order.
fn count_by<K, I>(keys: I) -> Vec<(K, usize)>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, usize)> = Vec::new();
    for key in keys {
        match index.get(&key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(key.clone(), counts.len());
                counts.push((key, 1));
            }
        }
    }
    counts
}

fn top_by_count<K>(mut counts: Vec<(K, usize)>, n: usize) -> Vec<(K, usize)> {
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
}

fn top_identities<'a>(values: impl Iterator<Item = &'a str>, n: usize) -> Vec<(String, usize)> {
    let counts = count_by(
        values
            .filter(|v| *v != SENTINEL)
            .map(str::to_string),
    );
    top_by_count(counts, n)
}

/// Builds every view of the report. Pure; the input is not modified.
#[must_use]
pub fn analyze(records: &[LogRecord]) -> AnalysisReport {
    let route_counts = count_by(records.iter().map(|r| r.route.clone()));

    let mut status_codes = count_by(records.iter().map(|r| r.status_code));
    status_codes.sort_by_key(|(code, _)| *code);

    let mut slowest: Vec<&LogRecord> = records.iter().collect();
    slowest.sort_by(|a, b| b.duration.cmp(&a.duration));
    let slowest = slowest
        .into_iter()
        .take(TOP_SLOWEST)
        .map(|r| SlowRequest {
            route: r.route.clone(),
            duration: r.duration,
            trace_id: r.trace_id.clone(),
            timestamp: r.timestamp,
        })
        .collect();

    let mut hourly = count_by(records.iter().map(|r| r.timestamp.hour()));
    hourly.sort_by_key(|(hour, _)| *hour);

    let mut sums: HashMap<&str, i128> = HashMap::new();
    for record in records {
        *sums.entry(record.route.as_str()).or_default() += i128::from(record.duration);
    }
    #[allow(clippy::cast_precision_loss)]
    let mut averages: Vec<(String, f64)> = route_counts
        .iter()
        .map(|(route, count)| {
            let sum = sums.get(route.as_str()).copied().unwrap_or_default();
            (route.clone(), sum as f64 / *count as f64)
        })
        .collect();
    averages.sort_by(|a, b| b.1.total_cmp(&a.1));
    averages.truncate(TOP_AVERAGE);

    AnalysisReport {
        total: records.len(),
        top_routes: top_by_count(route_counts, TOP_ROUTES),
        status_codes,
        slowest,
        hourly,
        top_staff: top_identities(records.iter().map(|r| r.staff_id.as_str()), TOP_STAFF),
        top_companies: top_identities(
            records.iter().map(|r| r.company_id.as_str()),
            TOP_COMPANIES,
        ),
        average_duration_by_route: averages,
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total records: {}", self.total)?;

        writeln!(f, "\nTop {TOP_ROUTES} requested routes:")?;
        for (route, count) in &self.top_routes {
            writeln!(f, "  - {route:<40} {count} times")?;
        }

        writeln!(f, "\nStatus codes:")?;
        for (code, count) in &self.status_codes {
            writeln!(f, "  - {code}: {count}")?;
        }

        writeln!(f, "\nTop {TOP_SLOWEST} slowest requests:")?;
        for slow in &self.slowest {
            writeln!(
                f,
                "  - {:<40} {} ms (TraceId: {})",
                slow.route, slow.duration, slow.trace_id
            )?;
        }

        writeln!(f, "\nRequest volume by hour:")?;
        for (hour, count) in &self.hourly {
            writeln!(f, "  - {hour:02}:00 - {count} requests")?;
        }

        writeln!(f, "\nMost active staff:")?;
        for (staff, count) in &self.top_staff {
            writeln!(f, "  - {staff:<10} {count} times")?;
        }

        writeln!(f, "\nMost active companies:")?;
        for (company, count) in &self.top_companies {
            writeln!(f, "  - {company:<36} {count} times")?;
        }

        writeln!(f, "\nAverage duration per route:")?;
        for (route, avg) in &self.average_duration_by_route {
            writeln!(f, "  - {route:<40} {avg:.1} ms")?;
        }
        Ok(())
    }
}
