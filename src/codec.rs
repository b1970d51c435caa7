use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::filter::{FilterSpec, Operator, UnknownOperator};
use crate::rules::{self, RuleFamily};

pub const KEY_SOURCE: &str = "source";
pub const KEY_FILTER: &str = "filter";
pub const KEY_VALUE: &str = "value";
pub const KEY_OPERATOR: &str = "operator";
pub const KEY_VALUE_FROM: &str = "valueFrom";
pub const KEY_VALUE_TO: &str = "valueTo";
pub const KEY_FILTER_TYPE: &str = "filter_type";
pub const KEY_FAMILY: &str = "family";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSource {
    DataAggregation,
    RcaAnalysis,
    RcaPortal,
    RcaAgency,
}

impl FilterSource {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterSource::DataAggregation => "data_aggregation",
            FilterSource::RcaAnalysis => "rca_analysis",
            FilterSource::RcaPortal => "rca_portal",
            FilterSource::RcaAgency => "rca_agency",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "data_aggregation" => Some(FilterSource::DataAggregation),
            "rca_analysis" => Some(FilterSource::RcaAnalysis),
            "rca_portal" => Some(FilterSource::RcaPortal),
            "rca_agency" => Some(FilterSource::RcaAgency),
            _ => None,
        }
    }

    pub fn for_family(family: RuleFamily) -> Self {
        match family {
            RuleFamily::Agency => FilterSource::RcaAgency,
            RuleFamily::Portal => FilterSource::RcaPortal,
            RuleFamily::DesirableAcos => FilterSource::RcaAnalysis,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown drill-down source `{0}`")]
    UnknownSource(String),
    #[error(transparent)]
    Operator(#[from] UnknownOperator),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrillDown {
    Simple {
        source: FilterSource,
        spec: FilterSpec,
    },
    Multi {
        source: FilterSource,
        specs: Vec<(String, FilterSpec)>,
    },
    Replay {
        rule_id: String,
        family: RuleFamily,
    },
}

impl DrillDown {
    pub fn replay(rule: &rules::Rule) -> Self {
        DrillDown::Replay {
            rule_id: rule.id.to_string(),
            family: rule.family,
        }
    }

    pub fn row_equality(columns: &[(&str, String)]) -> Self {
        let specs = columns
            .iter()
            .enumerate()
            .map(|(i, (column, value))| {
                (i.to_string(), FilterSpec::compare(column, Operator::Equals, value.clone()))
            })
            .collect();
        DrillDown::Multi {
            source: FilterSource::DataAggregation,
            specs,
        }
    }

    pub fn encode(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        match self {
            DrillDown::Simple { source, spec } => {
                pairs.push((KEY_SOURCE.to_string(), source.as_str().to_string()));
                push_spec(&mut pairs, spec, None);
            }
            DrillDown::Multi { source, specs } => {
                pairs.push((KEY_SOURCE.to_string(), source.as_str().to_string()));
                for (suffix, spec) in specs.iter() {
                    push_spec(&mut pairs, spec, Some(suffix.as_str()));
                }
            }
            DrillDown::Replay { rule_id, family } => {
                pairs.push((
                    KEY_SOURCE.to_string(),
                    FilterSource::for_family(*family).as_str().to_string(),
                ));
                pairs.push((KEY_FILTER_TYPE.to_string(), rule_id.clone()));
                pairs.push((KEY_FAMILY.to_string(), family.as_str().to_string()));
            }
        }
        pairs
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.encode())
            .finish()
    }

    pub fn link(&self, grid_path: &str) -> String {
        format!("{grid_path}?{}", self.to_query_string())
    }
}

fn keyed(key: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{key}_{suffix}"),
        None => key.to_string(),
    }
}

fn push_spec(pairs: &mut Vec<(String, String)>, spec: &FilterSpec, suffix: Option<&str>) {
    pairs.push((keyed(KEY_FILTER, suffix), spec.column.clone()));
    let value = match spec.operator {
        Operator::ReplayRule => spec.rule_id.clone(),
        _ => spec.value.clone(),
    };
    pairs.push((keyed(KEY_VALUE, suffix), value.unwrap_or_default()));
    pairs.push((keyed(KEY_OPERATOR, suffix), spec.operator.as_str().to_string()));
    if spec.operator == Operator::Between {
        if let Some(from) = &spec.value_from {
            pairs.push((keyed(KEY_VALUE_FROM, suffix), from.clone()));
        }
        if let Some(to) = &spec.value_to {
            pairs.push((keyed(KEY_VALUE_TO, suffix), to.clone()));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub source: Option<FilterSource>,
    pub family: Option<RuleFamily>,
    pub specs: Vec<FilterSpec>,
}

#[derive(Default)]
struct Group {
    filter: Option<String>,
    value: Option<String>,
    operator: Option<String>,
    value_from: Option<String>,
    value_to: Option<String>,
}

impl Group {
    fn set(&mut self, key: &str, value: String) -> bool {
        let slot = match key {
            KEY_FILTER => &mut self.filter,
            KEY_VALUE => &mut self.value,
            KEY_OPERATOR => &mut self.operator,
            KEY_VALUE_FROM => &mut self.value_from,
            KEY_VALUE_TO => &mut self.value_to,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    fn into_spec(self) -> Result<Option<FilterSpec>, CodecError> {
        let Some(column) = self.filter.filter(|column| !column.is_empty()) else {
            return Ok(None);
        };
        let operator = match self.operator.as_deref() {
            None | Some("") => Operator::Equals,
            Some(text) => text.parse()?,
        };
        if operator == Operator::ReplayRule {
            let rule_id = self.value.unwrap_or_default();
            return Ok(Some(FilterSpec::replay(&rule_id)));
        }
        let value = match operator {
            Operator::Between => self.value.filter(|value| !value.is_empty()),
            _ => Some(self.value.unwrap_or_default()),
        };
        Ok(Some(FilterSpec {
            column,
            operator,
            value,
            value_from: self.value_from,
            value_to: self.value_to,
            rule_id: None,
        }))
    }
}

fn split_suffixed_key(key: &str) -> Option<(&'static str, &str)> {
    // Longest prefixes first so `valueFrom_x` never reads as `value`.
    [KEY_VALUE_FROM, KEY_VALUE_TO, KEY_OPERATOR, KEY_FILTER, KEY_VALUE]
        .into_iter()
        .find_map(|prefix| {
            key.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|suffix| !suffix.is_empty())
                .map(|suffix| (prefix, suffix))
        })
}

pub fn decode(query: &str) -> Result<Decoded, CodecError> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    decode_pairs(&pairs)
}

pub fn decode_pairs(pairs: &[(String, String)]) -> Result<Decoded, CodecError> {
    let lookup = |key: &str| {
        pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    };

    let source = match lookup(KEY_SOURCE) {
        Some(raw) => Some(FilterSource::parse(raw).ok_or_else(|| CodecError::UnknownSource(raw.to_string()))?),
        None => None,
    };
    let family = lookup(KEY_FAMILY).and_then(RuleFamily::parse);

    match source {
        Some(FilterSource::RcaAnalysis | FilterSource::RcaPortal | FilterSource::RcaAgency) => {
            if let Some(rule_id) = lookup(KEY_FILTER_TYPE) {
                check_family(rule_id, family);
                return Ok(Decoded {
                    source,
                    family,
                    specs: vec![FilterSpec::replay(rule_id)],
                });
            }
        }
        Some(FilterSource::DataAggregation) | None => {}
    }

    let specs = if lookup(KEY_FILTER).is_some() {
        decode_simple(pairs)?
    } else {
        decode_multi(pairs)?
    };
    Ok(Decoded {
        source,
        family,
        specs,
    })
}

fn check_family(rule_id: &str, family: Option<RuleFamily>) {
    match (rules::find(rule_id), family) {
        (None, _) => log::warn!("drill-down names unknown rule `{rule_id}`"),
        (Some(rule), Some(family)) if rule.family != family => log::warn!(
            "drill-down tags `{rule_id}` as {} but the catalog files it under {}",
            family.as_str(),
            rule.family.as_str()
        ),
        _ => {}
    }
}

fn decode_simple(pairs: &[(String, String)]) -> Result<Vec<FilterSpec>, CodecError> {
    let mut group = Group::default();
    for (key, value) in pairs.iter() {
        group.set(key, value.clone());
    }
    Ok(group.into_spec()?.into_iter().collect())
}

fn decode_multi(pairs: &[(String, String)]) -> Result<Vec<FilterSpec>, CodecError> {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    for (key, value) in pairs.iter() {
        if key == KEY_FILTER_TYPE {
            continue;
        }
        if let Some((prefix, suffix)) = split_suffixed_key(key) {
            groups
                .entry(suffix.to_string())
                .or_default()
                .set(prefix, value.clone());
        }
    }

    let mut specs = Vec::with_capacity(groups.len());
    for (suffix, group) in groups {
        match group.into_spec()? {
            Some(spec) => specs.push(spec),
            None => log::debug!("skipping drill-down group `{suffix}` without a column"),
        }
    }
    Ok(specs)
}

/// The grid's view of its own location. Filters are read once; reading
/// clears them so history navigation does not apply them again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLocation {
    pub path: String,
    query: Option<String>,
}

impl QueryLocation {
    pub fn parse(location: &str) -> Self {
        match location.split_once('?') {
            Some((path, query)) if !query.is_empty() => Self {
                path: path.to_string(),
                query: Some(query.to_string()),
            },
            Some((path, _)) => Self {
                path: path.to_string(),
                query: None,
            },
            // A bare query string carries no path.
            None if location.contains('=') && !location.contains('/') => Self {
                path: String::new(),
                query: Some(location.to_string()),
            },
            None => Self {
                path: location.to_string(),
                query: None,
            },
        }
    }

    pub fn take_filters(&mut self) -> Option<Result<Decoded, CodecError>> {
        self.query.take().map(|query| decode(&query))
    }

    pub fn href(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_query_decodes_to_single_rule_spec() {
        let decoded = decode("source=rca_portal&filter_type=portal_underbidding_3").unwrap();
        assert_eq!(decoded.source, Some(FilterSource::RcaPortal));
        assert_eq!(decoded.specs.len(), 1);
        let spec = &decoded.specs[0];
        assert_eq!(spec.operator, Operator::ReplayRule);
        assert_eq!(spec.rule_id.as_deref(), Some("portal_underbidding_3"));
    }

    #[test]
    fn replay_encoding_carries_id_and_family_only() {
        let rule = rules::find("portal_underbidding_4").unwrap();
        let link = DrillDown::replay(rule).link("/bid-simulation");
        assert_eq!(
            link,
            "/bid-simulation?source=rca_portal&filter_type=portal_underbidding_4&family=portal"
        );
        let decoded = decode(link.split_once('?').unwrap().1).unwrap();
        assert_eq!(decoded.family, Some(RuleFamily::Portal));
        assert_eq!(decoded.specs, vec![FilterSpec::replay("portal_underbidding_4")]);
    }

    #[test]
    fn simple_shape_round_trips() {
        let spec = FilterSpec::between("J: Ad Spend", Some("10"), Some("25.5"));
        let drill = DrillDown::Simple {
            source: FilterSource::DataAggregation,
            spec: spec.clone(),
        };
        let decoded = decode(&drill.to_query_string()).unwrap();
        assert_eq!(decoded.source, Some(FilterSource::DataAggregation));
        assert_eq!(decoded.specs, vec![spec]);
    }

    #[test]
    fn legacy_simple_query_without_source() {
        let decoded = decode("?filter=M%3A+TOS%25&value=50&operator=lessEqual").unwrap();
        assert_eq!(decoded.source, None);
        assert_eq!(
            decoded.specs,
            vec![FilterSpec::compare("M: TOS%", Operator::LessEqual, "50")]
        );
    }

    #[test]
    fn multi_shape_ignores_key_order() {
        let ordered = "source=data_aggregation\
            &filter_a=A%3A+Campaign+Name&value_a=Spring&operator_a=contains\
            &filter_b=Clicks&valueFrom_b=10&valueTo_b=&operator_b=between&value_b=";
        let shuffled = "operator_b=between&valueTo_b=&value_a=Spring&filter_b=Clicks\
            &source=data_aggregation&valueFrom_b=10&operator_a=contains\
            &filter_a=A%3A+Campaign+Name&value_b=";

        let first = decode(ordered).unwrap();
        let second = decode(shuffled).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.specs.len(), 2);
        assert_eq!(first.specs[0].column, "A: Campaign Name");
        assert_eq!(first.specs[0].operator, Operator::Contains);
        assert_eq!(first.specs[1].operator, Operator::Between);
        assert_eq!(first.specs[1].value_from.as_deref(), Some("10"));
        assert_eq!(first.specs[1].value_to.as_deref(), Some(""));
    }

    #[test]
    fn decoding_is_idempotent_through_reencoding() {
        let drill = DrillDown::row_equality(&[
            ("A: Campaign Name", "Spring & Summer".to_string()),
            ("B: Ad Group Name", "50% off".to_string()),
        ]);
        let once = decode(&drill.to_query_string()).unwrap();
        let reencoded = DrillDown::Multi {
            source: FilterSource::DataAggregation,
            specs: once
                .specs
                .iter()
                .enumerate()
                .map(|(i, spec)| (i.to_string(), spec.clone()))
                .collect(),
        };
        let twice = decode(&reencoded.to_query_string()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.specs[0].value.as_deref(), Some("Spring & Summer"));
    }

    #[test]
    fn replay_spec_survives_the_multi_shape() {
        let drill = DrillDown::Multi {
            source: FilterSource::DataAggregation,
            specs: vec![
                ("rule".to_string(), FilterSpec::replay("portal_overbidding_2")),
                ("1".to_string(), FilterSpec::compare("K: CVR", Operator::Greater, "0")),
            ],
        };
        let decoded = decode(&drill.to_query_string()).unwrap();
        assert!(decoded.specs.contains(&FilterSpec::replay("portal_overbidding_2")));
        assert_eq!(decoded.specs.len(), 2);
    }

    #[test]
    fn groups_without_column_are_skipped() {
        let decoded = decode("value_x=1&operator_x=equals&filter_y=K%3A+CVR&value_y=2").unwrap();
        assert_eq!(decoded.specs, vec![FilterSpec::compare("K: CVR", Operator::Equals, "2")]);
    }

    #[test]
    fn rejects_unknown_source_and_operator() {
        assert_eq!(
            decode("source=elsewhere&filter_type=x"),
            Err(CodecError::UnknownSource("elsewhere".into()))
        );
        assert!(matches!(
            decode("filter=Clicks&value=1&operator=approximately"),
            Err(CodecError::Operator(_))
        ));
    }

    #[test]
    fn stale_rule_ids_still_decode() {
        let decoded = decode("source=rca_agency&filter_type=agency_overbidding_9").unwrap();
        assert_eq!(decoded.specs, vec![FilterSpec::replay("agency_overbidding_9")]);
    }

    #[test]
    fn location_filters_are_consumed_once() {
        let mut location =
            QueryLocation::parse("/bid-simulation?source=rca_agency&filter_type=agency_overbidding_1");
        let first = location.take_filters().unwrap().unwrap();
        assert_eq!(first.specs.len(), 1);
        assert!(location.take_filters().is_none());
        assert_eq!(location.href(), "/bid-simulation");
    }

    #[test]
    fn bare_query_string_is_read_as_filters() {
        let mut location = QueryLocation::parse("source=rca_portal&filter_type=portal_underbidding_3");
        let decoded = location.take_filters().unwrap().unwrap();
        assert_eq!(decoded.source, Some(FilterSource::RcaPortal));
        assert_eq!(decoded.specs[0].rule_id.as_deref(), Some("portal_underbidding_3"));
        assert_eq!(location.path, "");

        let mut plain = QueryLocation::parse("/bid-simulation");
        assert!(plain.take_filters().is_none());
    }
}
