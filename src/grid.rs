use std::cmp::Ordering;
use std::io::Write;

use crate::access::{ColumnAccessor, HeaderIndex};
use crate::coerce;
use crate::filter::{CompiledFilters, FilterSpec};
use crate::models::{RawValue, Table};

pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone)]
pub struct Sort {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct GridQuery {
    pub filters: Vec<FilterSpec>,
    pub sort: Option<Sort>,
    pub page: usize,
    pub page_size: usize,
    pub hidden_columns: Vec<String>,
}

impl Default for GridQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            hidden_columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridPage {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
    pub matching_rows: usize,
    pub page: usize,
    pub page_count: usize,
}

/// Numbers sort numerically, everything else case-insensitively; blanks last.
fn compare_cells(a: Option<&RawValue>, b: Option<&RawValue>) -> Ordering {
    let blank = |value: Option<&RawValue>| value.map_or(true, |v| v.to_string().trim().is_empty());
    match (blank(a), blank(b)) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    match (coerce::parse_number(a), coerce::parse_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => {
            let x = a.map(RawValue::to_string).unwrap_or_default().to_lowercase();
            let y = b.map(RawValue::to_string).unwrap_or_default().to_lowercase();
            x.cmp(&y)
        }
    }
}

pub fn query(table: &Table, query: &GridQuery) -> GridPage {
    let mut matches = CompiledFilters::compile(table, &query.filters).apply();
    let index = HeaderIndex::for_table(table);

    if let Some(sort) = &query.sort {
        let accessor = ColumnAccessor::resolve(&index, &sort.column);
        matches.sort_by(|&a, &b| {
            let ordering = compare_cells(accessor.get(&table.rows[a]), accessor.get(&table.rows[b]));
            if sort.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let visible: Vec<ColumnAccessor> = table
        .headers
        .iter()
        .filter(|header| !query.hidden_columns.contains(header))
        .map(|header| ColumnAccessor::resolve(&index, header))
        .collect();

    let page_size = query.page_size.max(1);
    let page_count = matches.len().div_ceil(page_size);
    let page = query.page.min(page_count.saturating_sub(1));

    let rows = matches
        .iter()
        .skip(page * page_size)
        .take(page_size)
        .map(|&i| {
            visible
                .iter()
                .map(|accessor| {
                    accessor
                        .get(&table.rows[i])
                        .map(RawValue::to_string)
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    GridPage {
        headers: visible.iter().map(|a| a.column().to_string()).collect(),
        rows,
        total_rows: table.len(),
        matching_rows: matches.len(),
        page,
        page_count,
    }
}

impl GridPage {
    pub fn write_csv<W: Write>(&self, out: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(&self.headers)?;
        for row in self.rows.iter() {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Operator;
    use crate::models::Row;

    fn table() -> Table {
        let rows = [("alpha", "10"), ("Bravo", "2"), ("charlie", ""), ("delta", "$30.00")]
            .iter()
            .map(|(name, spend)| Row::Positional(vec![RawValue::from(*name), RawValue::from(*spend)]))
            .collect();
        Table::new("grid", vec!["Name".into(), "Spend".into()], rows)
    }

    fn names(page: &GridPage) -> Vec<&str> {
        page.rows.iter().map(|row| row[0].as_str()).collect()
    }

    #[test]
    fn sorts_numbers_numerically_with_blanks_last() {
        let data = table();
        let ascending = query(
            &data,
            &GridQuery {
                sort: Some(Sort { column: "Spend".into(), descending: false }),
                ..GridQuery::default()
            },
        );
        assert_eq!(names(&ascending), ["Bravo", "alpha", "delta", "charlie"]);

        let by_name = query(
            &data,
            &GridQuery {
                sort: Some(Sort { column: "Name".into(), descending: true }),
                ..GridQuery::default()
            },
        );
        assert_eq!(names(&by_name), ["delta", "charlie", "Bravo", "alpha"]);
    }

    #[test]
    fn paginates_filtered_rows() {
        let data = table();
        let page = query(
            &data,
            &GridQuery {
                filters: vec![FilterSpec::compare("Spend", Operator::Greater, "1")],
                page: 1,
                page_size: 2,
                ..GridQuery::default()
            },
        );
        assert_eq!(page.total_rows, 4);
        assert_eq!(page.matching_rows, 3);
        assert_eq!(page.page_count, 2);
        assert_eq!(names(&page), ["delta"]);
    }

    #[test]
    fn out_of_range_page_clamps_to_last() {
        let page = query(&table(), &GridQuery { page: 99, page_size: 3, ..GridQuery::default() });
        assert_eq!(page.page, 1);
        assert_eq!(names(&page), ["delta"]);
    }

    #[test]
    fn hidden_columns_are_left_out() {
        let page = query(
            &table(),
            &GridQuery { hidden_columns: vec!["Name".into()], ..GridQuery::default() },
        );
        assert_eq!(page.headers, ["Spend"]);
        assert_eq!(page.rows[0], ["10"]);

        let mut out = Vec::new();
        page.write_csv(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Spend\n10\n"));
    }
}
