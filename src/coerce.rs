use crate::models::RawValue;

/// Applied ACOS value meaning "not computable". Compared with `==` and `<`,
/// never treated as a large number.
pub const ACOS_NOT_APPLICABLE: f64 = 9999.0;

const TRUTHY: [&str; 3] = ["true", "1", "yes"];

pub fn to_number(raw: Option<&RawValue>) -> f64 {
    parse_number(raw).unwrap_or(0.0)
}

pub fn parse_number(raw: Option<&RawValue>) -> Option<f64> {
    match raw? {
        RawValue::Null => None,
        RawValue::Number(value) => value.is_finite().then_some(*value),
        RawValue::Bool(_) => None,
        RawValue::Text(text) => parse_numeric_text(text),
    }
}

pub fn parse_numeric_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

pub fn to_bool(raw: Option<&RawValue>) -> bool {
    match raw {
        Some(RawValue::Bool(value)) => *value,
        Some(other) => TRUTHY.contains(&other.to_string().trim().to_lowercase().as_str()),
        None => false,
    }
}

pub fn is_literal_false(raw: Option<&RawValue>) -> bool {
    match raw {
        Some(RawValue::Bool(value)) => !*value,
        Some(other) => other.to_string().trim().eq_ignore_ascii_case("false"),
        None => false,
    }
}

/// Which reading of `Sync Status` a rule requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPolarity {
    Agency,
    Portal,
}

impl SyncPolarity {
    pub fn admits(self, sync_status: Option<&RawValue>) -> bool {
        match self {
            SyncPolarity::Agency => is_literal_false(sync_status),
            SyncPolarity::Portal => !is_literal_false(sync_status),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncPolarity::Agency => "agency",
            SyncPolarity::Portal => "portal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "agency" => Some(SyncPolarity::Agency),
            "portal" => Some(SyncPolarity::Portal),
            _ => None,
        }
    }
}

pub fn format_currency(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", value.abs())
    } else {
        format!("${value:.2}")
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

pub fn currency_or_dash(value: f64) -> String {
    if value <= 0.0 {
        "-".to_string()
    } else {
        format_currency(value)
    }
}

pub fn percent_or_dash(value: f64) -> String {
    if value <= 0.0 {
        "-".to_string()
    } else {
        format_percent(value)
    }
}
