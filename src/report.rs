use std::fmt::Write;

use crate::access::HeaderIndex;
use crate::aggregate::{self, GroupStatus, RankedBucket, RcaSummary};
use crate::codec::{DrillDown, FilterSource};
use crate::coerce::{self, currency_or_dash, format_currency, format_percent};
use crate::columns::{AD_GROUP, CAMPAIGN, CPC_PERIOD_1, CPC_PERIOD_2, TARGETING};
use crate::models::Table;
use crate::rules;

const RANKED_ROWS_SHOWN: usize = 10;

fn write_family(
    output: &mut String,
    table: &Table,
    index: &HeaderIndex,
    title: &str,
    buckets: &[RankedBucket],
    grid_path: &str,
) {
    let _ = writeln!(output, "## {title}");

    for ranked in buckets.iter() {
        let bucket = &ranked.bucket;
        let Some(rule) = rules::find(bucket.rule_id) else {
            continue;
        };
        let _ = writeln!(
            output,
            "- `{}`: {} rows ({}) - {}",
            rule.id,
            bucket.count,
            format_percent(bucket.percentage),
            rule.description
        );
        if bucket.count > 0 {
            let _ = writeln!(output, "  - drill down: {}", DrillDown::replay(rule).link(grid_path));
        }

        for ranked_row in ranked.top.iter().take(RANKED_ROWS_SHOWN) {
            let Some(row) = table.rows.get(ranked_row.row) else {
                continue;
            };
            let view = index.row(row);
            let link = DrillDown::row_equality(&[
                (CAMPAIGN, view.text(CAMPAIGN)),
                (AD_GROUP, view.text(AD_GROUP)),
                (TARGETING, view.text(TARGETING)),
            ])
            .link(grid_path);
            let change = if ranked_row.score > 0.0 {
                format!("+{}", format_currency(ranked_row.score))
            } else {
                format_currency(ranked_row.score)
            };
            let _ = writeln!(
                output,
                "  - {} / {} / {}: CPC {} -> {} ({change}) {}",
                view.text(CAMPAIGN),
                view.text(AD_GROUP),
                view.text(TARGETING),
                currency_or_dash(view.num(CPC_PERIOD_1)),
                currency_or_dash(view.num(CPC_PERIOD_2)),
                link
            );
        }
    }
    let _ = writeln!(output);
}

pub fn build_report(table: &Table, delta_column: &str, grid_path: &str) -> String {
    let summary = RcaSummary::compute(table);
    let index = HeaderIndex::for_table(table);
    let mut output = String::new();

    let _ = writeln!(output, "# Root Cause Analysis: {}", table.name);
    let _ = writeln!(
        output,
        "Uploaded {} with {} rows across {} columns",
        table.uploaded_at.format("%Y-%m-%d %H:%M UTC"),
        summary.total_rows,
        table.headers.len()
    );
    if !table.notes.trim().is_empty() {
        let _ = writeln!(output, "Notes: {}", table.notes.trim());
    }
    let _ = writeln!(
        output,
        "Sync enabled on {} rows ({})",
        summary.sync_enabled_rows,
        format_percent(aggregate::percentage(summary.sync_enabled_rows, summary.total_rows))
    );
    let _ = writeln!(output);

    if table.is_empty() {
        let _ = writeln!(output, "The table has no rows.");
        return output;
    }

    write_family(&mut output, table, &index, "Agency", &summary.agency, grid_path);
    write_family(&mut output, table, &index, "Portal", &summary.portal, grid_path);

    let _ = writeln!(output, "## Desirable ACOS");
    let _ = writeln!(
        output,
        "{} rows pass the desirable ACOS gate ({})",
        summary.desirable_gate.count,
        format_percent(summary.desirable_gate.percentage)
    );
    for (position, (rule_id, status)) in summary.groups.iter().enumerate() {
        let label = format!("GRP#{}", position + 1);
        match status {
            GroupStatus::Pending => {
                let _ = writeln!(output, "- {label}: not computed");
            }
            GroupStatus::AllGood => {
                let _ = writeln!(output, "- {label}: All Good");
            }
            GroupStatus::Flagged(bucket) => {
                let link = rules::find(rule_id)
                    .map(|rule| DrillDown::replay(rule).link(grid_path))
                    .unwrap_or_default();
                let _ = writeln!(
                    output,
                    "- {label}: {} rows ({}) {link}",
                    bucket.count,
                    format_percent(bucket.percentage)
                );
            }
        }
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## {delta_column} Distribution");
    for range in aggregate::distribution(table, delta_column).iter() {
        if range.count == 0 {
            continue;
        }
        let drill = DrillDown::Multi {
            source: FilterSource::DataAggregation,
            specs: range.bucket.filters(delta_column),
        };
        let _ = writeln!(
            output,
            "- {}: {} rows ({}) {}",
            range.bucket.label,
            range.count,
            coerce::percent_or_dash(range.percentage),
            drill.link(grid_path)
        );
    }

    output
}
