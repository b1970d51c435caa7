use std::cmp::Ordering;

use crate::access::{HeaderIndex, RowRef};
use crate::coerce;
use crate::filter::{FilterSpec, Operator};
use crate::models::{Row, Table};
use crate::rules::{self, Ranking, Rule, RuleFamily};

pub const RANKED_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub rule_id: &'static str,
    pub count: usize,
    pub percentage: f64,
    pub rows: Vec<usize>,
}

impl Bucket {
    pub fn matching_rows<'t>(&self, table: &'t Table) -> Vec<&'t Row> {
        self.rows.iter().filter_map(|&i| table.rows.get(i)).collect()
    }
}

pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

pub fn aggregate(table: &Table, rule: &Rule) -> Bucket {
    let index = HeaderIndex::for_table(table);
    aggregate_with(table, &index, rule)
}

fn aggregate_with(table: &Table, index: &HeaderIndex, rule: &Rule) -> Bucket {
    let rows: Vec<usize> = table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| rule.matches(&index.row(row)))
        .map(|(i, _)| i)
        .collect();

    Bucket {
        rule_id: rule.id,
        count: rows.len(),
        percentage: percentage(rows.len(), table.len()),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub row: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedBucket {
    pub bucket: Bucket,
    pub top: Vec<RankedRow>,
}

pub fn rank(table: &Table, bucket: Bucket, ranking: Ranking, limit: usize) -> RankedBucket {
    let index = HeaderIndex::for_table(table);
    let mut top: Vec<RankedRow> = bucket
        .rows
        .iter()
        .filter_map(|&row| {
            table.rows.get(row).map(|raw| RankedRow {
                row,
                score: ranking.score(&index.row(raw)),
            })
        })
        .collect();

    // Stable sort keeps table order among equal scores.
    top.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    top.truncate(limit);
    RankedBucket { bucket, top }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupStatus {
    Pending,
    AllGood,
    Flagged(Bucket),
}

impl GroupStatus {
    pub fn from_bucket(bucket: Bucket) -> Self {
        if bucket.count == 0 {
            GroupStatus::AllGood
        } else {
            GroupStatus::Flagged(bucket)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeBucket {
    pub label: &'static str,
    pub lower: f64,
    pub upper: f64,
    pub upper_inclusive: bool,
    pub overflow: bool,
    pub negative: bool,
}

const fn positive(label: &'static str, lower: f64, upper: f64) -> RangeBucket {
    RangeBucket { label, lower, upper, upper_inclusive: false, overflow: false, negative: false }
}

const fn negative(label: &'static str, lower: f64, upper: f64) -> RangeBucket {
    RangeBucket { label, lower, upper, upper_inclusive: false, overflow: false, negative: true }
}

pub const DELTA_BUCKET_COUNT: usize = 14;

/// Bounds are magnitudes; negative buckets mirror the positive ones.
pub static DELTA_BUCKETS: [RangeBucket; DELTA_BUCKET_COUNT] = [
    positive("0-0.25", 0.0, 0.25),
    positive("0.25-0.5", 0.25, 0.5),
    positive("0.5-0.75", 0.5, 0.75),
    positive("0.75-1", 0.75, 1.0),
    positive("1-1.5", 1.0, 1.5),
    RangeBucket { upper_inclusive: true, ..positive("1.5-2", 1.5, 2.0) },
    RangeBucket { overflow: true, ..positive(">2", 2.0, f64::INFINITY) },
    negative("-0.25-0", 0.0, 0.25),
    negative("-0.5--0.25", 0.25, 0.5),
    negative("-0.75--0.5", 0.5, 0.75),
    negative("-1--0.75", 0.75, 1.0),
    negative("-1.5--1", 1.0, 1.5),
    RangeBucket { upper_inclusive: true, ..negative("-2--1.5", 1.5, 2.0) },
    RangeBucket { overflow: true, ..negative("<-2", 2.0, f64::INFINITY) },
];

impl RangeBucket {
    fn contains_magnitude(&self, magnitude: f64) -> bool {
        if self.overflow {
            magnitude > self.lower
        } else if self.upper_inclusive {
            magnitude >= self.lower && magnitude <= self.upper
        } else {
            magnitude >= self.lower && magnitude < self.upper
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if value.is_nan() || (value < 0.0) != self.negative {
            return false;
        }
        self.contains_magnitude(value.abs())
    }

    /// Filters that select exactly this bucket's rows of `column`.
    pub fn filters(&self, column: &str) -> Vec<(String, FilterSpec)> {
        let spec = |operator: Operator, value: f64| FilterSpec::compare(column, operator, value.to_string());
        let mut specs = Vec::with_capacity(2);

        if self.negative {
            // Magnitude range [lo, hi) maps to (-hi, -lo], or [-hi, -lo) when
            // the upper end is inclusive.
            if self.overflow {
                specs.push(("max".to_string(), spec(Operator::Less, -self.lower)));
                return specs;
            }
            let low_op = if self.upper_inclusive { Operator::GreaterEqual } else { Operator::Greater };
            specs.push(("min".to_string(), spec(low_op, -self.upper)));
            let high_op = if self.lower == 0.0 { Operator::Less } else { Operator::LessEqual };
            specs.push(("max".to_string(), spec(high_op, -self.lower)));
        } else {
            if self.overflow {
                specs.push(("min".to_string(), spec(Operator::Greater, self.lower)));
                return specs;
            }
            specs.push(("min".to_string(), spec(Operator::GreaterEqual, self.lower)));
            let high_op = if self.upper_inclusive { Operator::LessEqual } else { Operator::Less };
            specs.push(("max".to_string(), spec(high_op, self.upper)));
        }
        specs
    }
}

pub fn bucket_for(value: f64) -> Option<&'static RangeBucket> {
    DELTA_BUCKETS.iter().find(|bucket| bucket.contains(value))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeCount {
    pub bucket: &'static RangeBucket,
    pub count: usize,
    pub percentage: f64,
}

pub fn distribution(table: &Table, column: &str) -> Vec<RangeCount> {
    let index = HeaderIndex::for_table(table);
    let mut counts = [0usize; DELTA_BUCKET_COUNT];

    for row in table.rows.iter() {
        // Blank and non-numeric cells belong to no bucket.
        let Some(value) = coerce::parse_number(index.row(row).get(column)) else {
            continue;
        };
        if let Some(slot) = DELTA_BUCKETS.iter().position(|bucket| bucket.contains(value)) {
            counts[slot] += 1;
        }
    }

    DELTA_BUCKETS
        .iter()
        .zip(counts)
        .map(|(bucket, count)| RangeCount {
            bucket,
            count,
            percentage: percentage(count, table.len()),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct RcaSummary {
    pub total_rows: usize,
    pub sync_enabled_rows: usize,
    pub agency: Vec<RankedBucket>,
    pub portal: Vec<RankedBucket>,
    pub desirable_gate: Bucket,
    pub groups: Vec<(&'static str, GroupStatus)>,
}

impl RcaSummary {
    pub fn compute(table: &Table) -> Self {
        let index = HeaderIndex::for_table(table);

        let family = |family: RuleFamily| -> Vec<RankedBucket> {
            rules::by_family(family)
                .map(|rule| {
                    let bucket = aggregate_with(table, &index, rule);
                    match rule.ranking {
                        Some(ranking) => rank(table, bucket, ranking, RANKED_LIMIT),
                        None => RankedBucket { bucket, top: Vec::new() },
                    }
                })
                .collect()
        };

        let gate_rows: Vec<usize> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| rules::desirable_acos_gate(&index.row(row)))
            .map(|(i, _)| i)
            .collect();


        Self {
            total_rows: table.len(),
            sync_enabled_rows: table
                .rows
                .iter()
                .filter(|row| sync_enabled(&index.row(row)))
                .count(),
            agency: family(RuleFamily::Agency),
            portal: family(RuleFamily::Portal),
            desirable_gate: Bucket {
                rule_id: "desirable_acos_gate",
                count: gate_rows.len(),
                percentage: percentage(gate_rows.len(), table.len()),
                rows: gate_rows,
            },
            groups: group_statuses(Some(table)),
        }
    }
}

pub fn group_statuses(table: Option<&Table>) -> Vec<(&'static str, GroupStatus)> {
    let Some(table) = table else {
        return rules::by_family(RuleFamily::DesirableAcos)
            .map(|rule| (rule.id, GroupStatus::Pending))
            .collect();
    };
    let index = HeaderIndex::for_table(table);
    rules::by_family(RuleFamily::DesirableAcos)
        .map(|rule| (rule.id, GroupStatus::from_bucket(aggregate_with(table, &index, rule))))
        .collect()
}

fn sync_enabled(row: &RowRef<'_>) -> bool {
    coerce::to_bool(row.get(crate::columns::SYNC_STATUS))
}
