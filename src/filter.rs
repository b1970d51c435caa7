use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::access::{ColumnAccessor, HeaderIndex};
use crate::coerce;
use crate::columns::CVR_WATERFALL_LEVEL;
use crate::models::{RawValue, Row, Table};
use crate::rules::{self, Rule};

pub const RULE_COLUMN: &str = "rule";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    Contains,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Between,
    ReplayRule,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Contains => "contains",
            Operator::Greater => "greater",
            Operator::Less => "less",
            Operator::GreaterEqual => "greaterEqual",
            Operator::LessEqual => "lessEqual",
            Operator::Between => "between",
            Operator::ReplayRule => "replayRule",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter operator `{0}`")]
pub struct UnknownOperator(pub String);

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let operator = match value.trim() {
            "equals" | "=" => Operator::Equals,
            "contains" => Operator::Contains,
            "greater" | ">" => Operator::Greater,
            "less" | "<" => Operator::Less,
            "greaterEqual" | ">=" => Operator::GreaterEqual,
            "lessEqual" | "<=" => Operator::LessEqual,
            "between" => Operator::Between,
            "replayRule" => Operator::ReplayRule,
            other => return Err(UnknownOperator(other.to_string())),
        };
        Ok(operator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub column: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl FilterSpec {
    pub fn compare(column: &str, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: Some(value.into()),
            value_from: None,
            value_to: None,
            rule_id: None,
        }
    }

    pub fn between(column: &str, from: Option<&str>, to: Option<&str>) -> Self {
        Self {
            column: column.to_string(),
            operator: Operator::Between,
            value: None,
            value_from: from.map(str::to_string),
            value_to: to.map(str::to_string),
            rule_id: None,
        }
    }

    pub fn replay(rule_id: &str) -> Self {
        Self {
            column: RULE_COLUMN.to_string(),
            operator: Operator::ReplayRule,
            value: None,
            value_from: None,
            value_to: None,
            rule_id: Some(rule_id.to_string()),
        }
    }

    /// Parses the `column:operator:value` shorthand; `between` takes `from..to`.
    pub fn parse_shorthand(text: &str) -> Result<Self, UnknownOperator> {
        // Columns and values may both contain `:`; the first segment naming
        // an operator splits them.
        let split = text.match_indices(':').find_map(|(start, _)| {
            let (operator, value) = text[start + 1..].split_once(':')?;
            let operator: Operator = operator.parse().ok()?;
            Some((&text[..start], operator, value))
        });
        let Some((column, operator, value)) = split else {
            let operator = text.rsplitn(3, ':').nth(1).unwrap_or_default();
            return Err(UnknownOperator(operator.trim().to_string()));
        };

        Ok(match operator {
            Operator::Between => {
                let (from, to) = value.split_once("..").unwrap_or((value, ""));
                FilterSpec::between(column, Some(from), Some(to))
            }
            Operator::ReplayRule => FilterSpec::replay(value),
            _ => FilterSpec::compare(column, operator, value),
        })
    }
}

enum Check {
    Equals { expected: String, strip_level: bool },
    Contains(String),
    Compare { operator: Operator, threshold: Option<f64> },
    Between { from: Option<f64>, to: Option<f64> },
    Always,
    Never,
    Replay(&'static Rule),
}

struct CompiledSpec {
    accessor: ColumnAccessor,
    check: Check,
}

pub struct CompiledFilters<'t> {
    index: HeaderIndex,
    specs: Vec<CompiledSpec>,
    table: &'t Table,
}

fn strip_level_suffix(text: &str) -> &str {
    text.strip_suffix(".0").unwrap_or(text)
}

fn usable_bound(bound: Option<&str>) -> Option<f64> {
    bound
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .and_then(coerce::parse_numeric_text)
}

fn compile_spec(index: &HeaderIndex, spec: &FilterSpec) -> CompiledSpec {
    let value = spec.value.as_deref().unwrap_or_default();
    let check = match spec.operator {
        Operator::Equals => Check::Equals {
            expected: value.trim().to_lowercase(),
            strip_level: spec.column == CVR_WATERFALL_LEVEL,
        },
        Operator::Contains => Check::Contains(value.to_lowercase()),
        Operator::Greater | Operator::Less | Operator::GreaterEqual | Operator::LessEqual => {
            Check::Compare {
                operator: spec.operator,
                threshold: coerce::parse_numeric_text(value),
            }
        }
        Operator::Between => {
            let from = usable_bound(spec.value_from.as_deref());
            let to = usable_bound(spec.value_to.as_deref());
            if from.is_none() && to.is_none() {
                Check::Always
            } else {
                Check::Between { from, to }
            }
        }
        Operator::ReplayRule => match spec.rule_id.as_deref().and_then(rules::find) {
            Some(rule) => Check::Replay(rule),
            None => {
                log::warn!(
                    "replay filter references unknown rule {:?}; it matches nothing",
                    spec.rule_id
                );
                Check::Never
            }
        },
    };

    CompiledSpec {
        accessor: ColumnAccessor::resolve(index, &spec.column),
        check,
    }
}

fn cell_number(cell: Option<&RawValue>) -> Option<f64> {
    coerce::parse_number(cell)
}

impl CompiledSpec {
    fn matches(&self, index: &HeaderIndex, row: &Row) -> bool {
        match &self.check {
            Check::Always => true,
            Check::Never => false,
            Check::Replay(rule) => rule.matches(&index.row(row)),
            Check::Equals { expected, strip_level } => {
                let cell = self
                    .accessor
                    .get(row)
                    .map(RawValue::to_string)
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase();
                if *strip_level {
                    strip_level_suffix(&cell) == strip_level_suffix(expected)
                } else {
                    cell == *expected
                }
            }
            Check::Contains(needle) => self
                .accessor
                .get(row)
                .map(RawValue::to_string)
                .unwrap_or_default()
                .to_lowercase()
                .contains(needle.as_str()),
            Check::Compare { operator, threshold } => {
                let (Some(threshold), Some(cell)) = (threshold, cell_number(self.accessor.get(row)))
                else {
                    return false;
                };
                match operator {
                    Operator::Greater => cell > *threshold,
                    Operator::Less => cell < *threshold,
                    Operator::GreaterEqual => cell >= *threshold,
                    Operator::LessEqual => cell <= *threshold,
                    _ => false,
                }
            }
            Check::Between { from, to } => {
                let Some(cell) = cell_number(self.accessor.get(row)) else {
                    return false;
                };
                from.map_or(true, |from| cell >= from) && to.map_or(true, |to| cell <= to)
            }
        }
    }
}

impl<'t> CompiledFilters<'t> {
    pub fn compile(table: &'t Table, specs: &[FilterSpec]) -> Self {
        let index = HeaderIndex::for_table(table);
        let specs = specs.iter().map(|spec| compile_spec(&index, spec)).collect();
        Self { index, specs, table }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.specs.iter().all(|spec| spec.matches(&self.index, row))
    }

    pub fn apply(&self) -> Vec<usize> {
        self.table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.matches(row))
            .map(|(i, _)| i)
            .collect()
    }
}

pub fn matches(row: &Row, specs: &[FilterSpec], table: &Table) -> bool {
    CompiledFilters::compile(table, specs).matches(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate;
    use crate::columns::*;

    fn positional_table(column: &str, values: &[&str]) -> Table {
        Table::new(
            "grid",
            vec!["Id".into(), column.into()],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| Row::Positional(vec![RawValue::Number(i as f64), RawValue::from(*v)]))
                .collect(),
        )
    }

    fn apply(table: &Table, specs: &[FilterSpec]) -> Vec<usize> {
        CompiledFilters::compile(table, specs).apply()
    }

    #[test]
    fn empty_spec_set_matches_everything() {
        let table = positional_table("X", &["a", "b", ""]);
        assert_eq!(apply(&table, &[]), vec![0, 1, 2]);
    }

    #[test]
    fn equals_and_contains_ignore_case() {
        let table = positional_table("Match Type", &["Exact", "BROAD", "phrase"]);
        let equals = FilterSpec::compare("Match Type", Operator::Equals, "exact");
        let contains = FilterSpec::compare("Match Type", Operator::Contains, "RA");
        assert_eq!(apply(&table, &[equals]), vec![0]);
        assert_eq!(apply(&table, &[contains]), vec![2]);
    }

    #[test]
    fn waterfall_level_ignores_trailing_point_zero() {
        let table = positional_table(CVR_WATERFALL_LEVEL, &["1.0", "1", "10", "2"]);
        let spec = FilterSpec::compare(CVR_WATERFALL_LEVEL, Operator::Equals, "1");
        assert_eq!(apply(&table, &[spec]), vec![0, 1]);

        let other = positional_table("Other", &["1.0", "1"]);
        let spec = FilterSpec::compare("Other", Operator::Equals, "1");
        assert_eq!(apply(&other, &[spec]), vec![1]);
    }

    #[test]
    fn numeric_comparisons_fail_on_non_numbers() {
        let table = positional_table("Spend", &["$12.00", "abc", "", "3"]);
        let greater = FilterSpec::compare("Spend", Operator::Greater, "5");
        let less_eq = FilterSpec::compare("Spend", Operator::LessEqual, "3");
        let junk = FilterSpec::compare("Spend", Operator::Greater, "lots");
        assert_eq!(apply(&table, &[greater]), vec![0]);
        assert_eq!(apply(&table, &[less_eq]), vec![3]);
        assert!(apply(&table, &[junk]).is_empty());
    }

    #[test]
    fn between_bounds() {
        let table = positional_table("Clicks", &["5", "10", "15", "x"]);
        let open = FilterSpec::between("Clicks", Some(" "), None);
        let lower = FilterSpec::between("Clicks", Some("10"), Some(""));
        let both = FilterSpec::between("Clicks", Some("5"), Some("10"));
        let upper = FilterSpec::between("Clicks", None, Some("9"));

        assert_eq!(apply(&table, &[open]), vec![0, 1, 2, 3]);
        assert_eq!(apply(&table, &[lower]), vec![1, 2]);
        assert_eq!(apply(&table, &[both]), vec![0, 1]);
        assert_eq!(apply(&table, &[upper]), vec![0]);
    }

    #[test]
    fn specs_are_conjunctive() {
        let table = positional_table("Clicks", &["5", "10", "15"]);
        let specs = [
            FilterSpec::compare("Clicks", Operator::GreaterEqual, "10"),
            FilterSpec::compare("Clicks", Operator::Less, "15"),
        ];
        assert_eq!(apply(&table, &specs), vec![1]);
    }

    #[test]
    fn unknown_rule_fails_closed() {
        let table = positional_table("X", &["a", "b"]);
        assert!(apply(&table, &[FilterSpec::replay("agency_overbidding_42")]).is_empty());

        let mut missing_id = FilterSpec::replay("x");
        missing_id.rule_id = None;
        assert!(apply(&table, &[missing_id]).is_empty());
    }

    #[test]
    fn replay_matches_aggregation_for_every_rule() {
        let headers: Vec<String> = [
            SYNC_STATUS,
            APPLIED_ACOS,
            TARGET_ACOS,
            AD_SPEND,
            PRICE,
            TOS_PCT,
            MIN_SUGGESTED_BID,
            CURRENT_BID,
            LATEST_BID,
            PREVIOUS_BID,
            EFFECTIVE_CEILING,
            CVR,
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        let raw = [
            ["false", "9999", "0.3", "0", "10", "0", "1.00", "0.50", "0.02", "0.02", "0.02", "0"],
            ["true", "0.1", "0.3", "4", "10", "20", "0.3", "0.5", "0.02", "0.05", "0.02", "3"],
            ["true", "9999", "0.3", "9", "10", "60", "0.3", "0.5", "0.40", "0.30", "1.0", "0"],
            ["false", "0.5", "0.3", "9", "10", "60", "0.3", "0.9", "0.40", "0.40", "1.0", "2"],
            ["", "0.1", "0.3", "0", "10", "40", "0.6", "0.9", "0.40", "0.40", "1.0", "2"],
        ];
        let rows = raw
            .iter()
            .map(|cells| Row::Positional(cells.iter().map(|c| RawValue::from(*c)).collect()))
            .collect();
        let table = Table::new("rca", headers, rows);

        for rule in rules::RULES.iter() {
            let replayed = apply(&table, &[FilterSpec::replay(rule.id)]);
            assert_eq!(replayed, aggregate::aggregate(&table, rule).rows, "{}", rule.id);
        }
        assert_eq!(apply(&table, &[FilterSpec::replay("agency_underbidding_1")]), vec![0]);
    }

    #[test]
    fn parses_cli_shorthand() {
        let spec = FilterSpec::parse_shorthand("M: TOS%:lessEqual:50").unwrap();
        assert_eq!(spec.column, "M: TOS%");
        assert_eq!(spec.operator, Operator::LessEqual);
        assert_eq!(spec.value.as_deref(), Some("50"));

        let between = FilterSpec::parse_shorthand("Clicks:between:5..").unwrap();
        assert_eq!(between.value_from.as_deref(), Some("5"));
        assert_eq!(between.value_to.as_deref(), Some(""));

        assert_eq!(
            FilterSpec::parse_shorthand("Clicks:roughly:5"),
            Err(UnknownOperator("roughly".into()))
        );

        let spec = FilterSpec::parse_shorthand("A: Campaign Name:contains:spring:sale").unwrap();
        assert_eq!(spec.column, "A: Campaign Name");
        assert_eq!(spec.operator, Operator::Contains);
        assert_eq!(spec.value.as_deref(), Some("spring:sale"));
    }

    #[test]
    fn single_row_helper_agrees_with_compiled() {
        let table = positional_table("Clicks", &["5", "10"]);
        let specs = [FilterSpec::compare("Clicks", Operator::Greater, "6")];
        assert!(!matches(&table.rows[0], &specs, &table));
        assert!(matches(&table.rows[1], &specs, &table));
    }
}
