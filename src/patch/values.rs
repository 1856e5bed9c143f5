//! Typed form-control values.
//!
//! Dates and times travel as integer epoch milliseconds. `date` and `datetime-local`
//! controls hold calendar values; `time` controls hold milliseconds since midnight.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};

/// Value carried by element patches and reported by change/bind/read commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Bool(value) => *value,
            FieldValue::Integer(value) => *value != 0,
            FieldValue::Number(value) => *value != 0.0 && !value.is_nan(),
            FieldValue::Text(value) => !value.is_empty(),
        }
    }

    fn as_millis(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            FieldValue::Number(value) if value.is_finite() => Some(value.round() as i64),
            _ => None,
        }
    }

    fn to_raw_string(&self) -> String {
        match self {
            FieldValue::Bool(value) => value.to_string(),
            FieldValue::Integer(value) => value.to_string(),
            FieldValue::Number(value) => format_number(*value),
            FieldValue::Text(value) => value.clone(),
        }
    }
}

/// What assigning a typed value does to a control.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Checked(bool),
    Value(String),
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn decode_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|value| value.naive_utc())
}

pub fn encode_epoch_millis(value: NaiveDateTime) -> i64 {
    value.and_utc().timestamp_millis()
}

/// Apply the locality shift: the wire value is UTC, the control shows local wall time.
pub fn localize(value: NaiveDateTime, offset: FixedOffset) -> NaiveDateTime {
    value + Duration::seconds(i64::from(offset.local_minus_utc()))
}

pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn format_time_of_day(value: NaiveTime) -> String {
    if value.second() == 0 && value.nanosecond() == 0 {
        value.format("%H:%M").to_string()
    } else if value.nanosecond() == 0 {
        value.format("%H:%M:%S").to_string()
    } else {
        value.format("%H:%M:%S%.3f").to_string()
    }
}

fn parse_datetime_local(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// Work out how a typed value lands on a control of `input_type`.
pub fn assignment_for(
    input_type: Option<&str>,
    value: &FieldValue,
    localized: bool,
    offset: FixedOffset,
) -> Assignment {
    let input_type = input_type.unwrap_or("text");
    if matches!(input_type, "checkbox" | "radio") {
        return Assignment::Checked(value.is_truthy());
    }
    if matches!(value, FieldValue::Text(text) if text.is_empty()) {
        return Assignment::Value(String::new());
    }

    let calendar = value.as_millis().and_then(decode_epoch_millis).map(|moment| {
        if localized {
            localize(moment, offset)
        } else {
            moment
        }
    });
    let formatted = match (input_type, calendar) {
        ("date", Some(moment)) => Some(moment.format("%Y-%m-%d").to_string()),
        ("time", Some(moment)) => Some(format_time_of_day(moment.time())),
        ("datetime-local", Some(moment)) => Some(format_time_of_day_with_date(moment)),
        ("number", _) => match value {
            FieldValue::Integer(number) => Some(number.to_string()),
            FieldValue::Number(number) if number.is_finite() => Some(format_number(*number)),
            _ => None,
        },
        _ => None,
    };
    Assignment::Value(formatted.unwrap_or_else(|| value.to_raw_string()))
}

fn format_time_of_day_with_date(moment: NaiveDateTime) -> String {
    format!(
        "{}T{}",
        moment.format("%Y-%m-%d"),
        format_time_of_day(moment.time())
    )
}

/// Read the typed value of a control. `type_hint` overrides the control's own type.
///
/// Returns `None` when the control holds nothing a typed reader would accept, such as an
/// empty or malformed date.
pub fn extract(document: &Document, node: NodeId, type_hint: Option<&str>) -> Option<FieldValue> {
    let control = document.control(node)?;
    if document.tag_name(node) == Some("select") {
        return selected_option_value(document, node).map(FieldValue::Text);
    }

    let input_type = type_hint
        .or(control.input_type.as_deref())
        .unwrap_or("text");
    let raw = control.value.trim();
    match input_type {
        "checkbox" | "radio" => Some(FieldValue::Bool(control.checked)),
        "number" => raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(FieldValue::Number),
        "date" => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|moment| FieldValue::Integer(encode_epoch_millis(moment))),
        "time" => parse_time_of_day(raw).map(|time| {
            let since_midnight = time - NaiveTime::MIN;
            FieldValue::Integer(since_midnight.num_milliseconds())
        }),
        "datetime-local" => {
            parse_datetime_local(raw).map(|moment| FieldValue::Integer(encode_epoch_millis(moment)))
        }
        _ => Some(FieldValue::Text(control.value.clone())),
    }
}

fn selected_option_value(document: &Document, select: NodeId) -> Option<String> {
    let option = selected_options(document, select).into_iter().next()?;
    Some(
        document
            .attribute(option, "value")
            .unwrap_or_else(|| document.text_content(option)),
    )
}

/// `<option>` descendants of a select that are currently selected, in tree order.
pub fn selected_options(document: &Document, select: NodeId) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut stack: Vec<NodeId> = document.children(select).into_iter().rev().collect();
    while let Some(current) = stack.pop() {
        if document.tag_name(current) == Some("option") {
            if document.control(current).is_some_and(|state| state.selected) {
                found.push(current);
            }
            continue;
        }
        stack.extend(document.children(current).into_iter().rev());
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Namespace;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn epoch_millis_round_trip() {
        let moment = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(13, 45, 0)
            .unwrap();
        let millis = encode_epoch_millis(moment);
        assert_eq!(decode_epoch_millis(millis), Some(moment));
    }

    #[test]
    fn date_assignment_honours_locality() {
        // 2024-03-01T23:30:00Z
        let millis = FieldValue::Integer(1_709_335_800_000);
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            assignment_for(Some("date"), &millis, false, plus_two),
            Assignment::Value("2024-03-01".into())
        );
        assert_eq!(
            assignment_for(Some("date"), &millis, true, plus_two),
            Assignment::Value("2024-03-02".into())
        );
        assert_eq!(
            assignment_for(Some("time"), &millis, false, plus_two),
            Assignment::Value("23:30".into())
        );
    }

    #[test]
    fn assignment_rules_by_type() {
        assert_eq!(
            assignment_for(Some("checkbox"), &FieldValue::Integer(1), false, utc()),
            Assignment::Checked(true)
        );
        assert_eq!(
            assignment_for(Some("date"), &FieldValue::Text(String::new()), false, utc()),
            Assignment::Value(String::new())
        );
        assert_eq!(
            assignment_for(Some("number"), &FieldValue::Number(2.5), false, utc()),
            Assignment::Value("2.5".into())
        );
        assert_eq!(
            assignment_for(None, &FieldValue::Text("plain".into()), false, utc()),
            Assignment::Value("plain".into())
        );
    }

    #[test]
    fn extraction_rejects_malformed_values() {
        let mut document = Document::new();
        let input = document.create_element("input", Namespace::Html);
        document.set_input_type(input, "date").unwrap();
        document.control_mut(input).unwrap().value = "not a date".into();
        assert_eq!(extract(&document, input, None), None);

        document.control_mut(input).unwrap().value = "1970-01-02".into();
        assert_eq!(
            extract(&document, input, None),
            Some(FieldValue::Integer(86_400_000))
        );
        document.control_mut(input).unwrap().value = "01:00".into();
        assert_eq!(
            extract(&document, input, Some("time")),
            Some(FieldValue::Integer(3_600_000))
        );
    }

    #[test]
    fn select_reports_first_selected_option() {
        let mut document = Document::new();
        let select = document.create_element("select", Namespace::Html);
        for (value, selected) in [("a", false), ("b", true)] {
            let option = document.create_element("option", Namespace::Html);
            document.set_attribute(option, "value", value).unwrap();
            if selected {
                document.set_attribute(option, "selected", "").unwrap();
            }
            document.append_child(select, option).unwrap();
        }
        assert_eq!(selected_options(&document, select).len(), 1);
        assert_eq!(
            extract(&document, select, None),
            Some(FieldValue::Text("b".into()))
        );
    }
}
