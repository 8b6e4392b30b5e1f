//! Single-valued settings: strings, booleans and numbers.

use serde_json::Value;

use super::{
    StoredValueKind, XmlInputContext, XmlOutputContext, required_missing, text_element,
    validate_range, validate_text, value_elements,
};
use crate::error::ValueError;
use crate::setting::{Setting, SettingSyntax};
use crate::time::TimeDuration;
use crate::util;
use crate::xml::XmlElement;

/// `STRING`, `TEXT_AREA` and `SELECT` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringValue(String);

impl StringValue {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl StoredValueKind for StringValue {
    type Native = String;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        match json {
            Value::Null => Ok(Self::default()),
            Value::String(s) => Ok(Self::new(s.clone())),
            Value::Number(n) => Ok(Self::new(n.to_string())),
            Value::Bool(b) => Ok(Self::new(b.to_string())),
            other => Err(ValueError::malformed(format!("expected a string, found {other}"))),
        }
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        Ok(value_elements(setting)
            .next()
            .map(|el| Self::new(el.text()))
            .unwrap_or_default())
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(vec![text_element(element_name, self.0.clone())])
    }

    fn to_native(&self) -> String {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        Ok(Value::String(self.0.clone()))
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if util::is_blank(&self.0) {
            return if setting.required {
                vec![required_missing(setting)]
            } else {
                Vec::new()
            };
        }
        let mut errors = validate_text(setting, &self.0);
        if setting.syntax == SettingSyntax::Select
            && !setting.options.is_empty()
            && !setting.options.contains(&self.0.as_str())
        {
            errors.push(format!("{} value '{}' is not one of the allowed options", setting.label, self.0));
        }
        errors
    }

    fn to_debug_string(&self) -> String {
        self.0.clone()
    }
}

/// `BOOLEAN` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BooleanValue(bool);

impl BooleanValue {
    #[must_use]
    pub fn new(value: bool) -> Self {
        Self(value)
    }
}

impl StoredValueKind for BooleanValue {
    type Native = bool;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        match json {
            Value::Null => Ok(Self::default()),
            Value::Bool(b) => Ok(Self(*b)),
            Value::String(s) => Ok(Self(s.trim().eq_ignore_ascii_case("true"))),
            other => Err(ValueError::malformed(format!("expected a boolean, found {other}"))),
        }
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        Ok(Self(
            value_elements(setting)
                .next()
                .is_some_and(|el| el.text_trim().eq_ignore_ascii_case("true")),
        ))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(vec![text_element(element_name, self.0.to_string())])
    }

    fn to_native(&self) -> bool {
        self.0
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        Ok(Value::Bool(self.0))
    }

    fn validate(&self, _setting: &Setting) -> Vec<String> {
        Vec::new()
    }

    fn to_debug_string(&self) -> String {
        if self.0 { "True" } else { "False" }.to_owned()
    }

    fn value_hash(&self) -> Result<String, ValueError> {
        Ok(if self.0 { "1" } else { "0" }.to_owned())
    }
}

/// `NUMERIC` and `DURATION` settings. Durations are whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NumericValue {
    value: i64,
    duration: bool,
}

impl NumericValue {
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self {
            value,
            duration: false,
        }
    }

    /// A number of seconds, rendered as a duration in debug output.
    #[must_use]
    pub fn duration(seconds: i64) -> Self {
        Self {
            value: seconds,
            duration: true,
        }
    }

    #[must_use]
    pub(crate) fn as_duration(self) -> Self {
        Self::duration(self.value)
    }
}

pub(super) fn parse_number(text: &str) -> Result<i64, ValueError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse()
        .map_err(|e| ValueError::malformed(format!("'{trimmed}' is not a number: {e}")))
}

pub(super) fn json_number(json: &Value) -> Result<i64, ValueError> {
    match json {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| ValueError::malformed(format!("{n} is not an integer"))),
        Value::String(s) => parse_number(s),
        other => Err(ValueError::malformed(format!("expected a number, found {other}"))),
    }
}

impl StoredValueKind for NumericValue {
    type Native = i64;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        json_number(json).map(Self::new)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        value_elements(setting)
            .next()
            .map_or(Ok(0), |el| parse_number(el.text()))
            .map(Self::new)
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(vec![text_element(element_name, self.value.to_string())])
    }

    fn to_native(&self) -> i64 {
        self.value
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        Ok(Value::from(self.value))
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        validate_range(setting, self.value)
    }

    fn to_debug_string(&self) -> String {
        if self.duration {
            let seconds = u64::try_from(self.value).unwrap_or(0);
            TimeDuration::of_seconds(seconds).as_long_string()
        } else {
            self.value.to_string()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoder::EncodingMode;
    use crate::value::test_support::{parse_setting, xml_roundtrip};

    const SELECT: Setting =
        Setting::new("pick", SettingSyntax::Select).options(&["red", "green"]).required();
    const BOUNDED: Setting =
        Setting::new("n", SettingSyntax::Numeric).range(Some(1), Some(10));

    #[test]
    fn string_roundtrip_preserves_whitespace() {
        let v = StringValue::new("  padded value ");
        assert_eq!(xml_roundtrip(&v, EncodingMode::Plain).to_native(), "  padded value ");
    }

    #[test]
    fn string_select_must_be_an_option() {
        assert!(StringValue::new("red").validate(&SELECT).is_empty());
        assert_eq!(StringValue::new("blue").validate(&SELECT).len(), 1);
        assert_eq!(StringValue::new("").validate(&SELECT), vec!["pick is required"]);
    }

    #[test]
    fn string_from_missing_value_is_empty() {
        let el = parse_setting("<setting key='k'/>");
        let key = crate::value::test_support::key();
        let v = StringValue::from_xml(&el, &XmlInputContext::new(&key)).unwrap();
        assert_eq!(v.to_native(), "");
    }

    #[test]
    fn boolean_parses_case_insensitively() {
        let el = parse_setting("<setting><value> TRUE </value></setting>");
        let key = crate::value::test_support::key();
        assert!(BooleanValue::from_xml(&el, &XmlInputContext::new(&key)).unwrap().to_native());
        assert!(BooleanValue::from_json(&Value::from("true")).unwrap().to_native());
        assert!(!BooleanValue::from_json(&Value::Null).unwrap().to_native());
        assert!(BooleanValue::from_json(&Value::from(1)).is_err());
    }

    #[test]
    fn boolean_roundtrip() {
        for b in [true, false] {
            assert_eq!(xml_roundtrip(&BooleanValue::new(b), EncodingMode::Plain).to_native(), b);
        }
    }

    #[test]
    fn numeric_range_validation() {
        assert!(NumericValue::new(5).validate(&BOUNDED).is_empty());
        assert_eq!(NumericValue::new(0).validate(&BOUNDED).len(), 1);
        assert_eq!(NumericValue::new(11).validate(&BOUNDED).len(), 1);
    }

    #[test]
    fn numeric_parses_json_strings_and_rejects_garbage() {
        assert_eq!(NumericValue::from_json(&Value::from("42")).unwrap().to_native(), 42);
        assert!(NumericValue::from_json(&Value::from(1.5)).is_err());
        let el = parse_setting("<setting><value>abc</value></setting>");
        let key = crate::value::test_support::key();
        assert!(NumericValue::from_xml(&el, &XmlInputContext::new(&key)).is_err());
    }

    #[test]
    fn duration_debug_string() {
        assert_eq!(NumericValue::duration(90).to_debug_string(), "1 minute, 30 seconds");
        assert_eq!(NumericValue::new(90).to_debug_string(), "90");
        assert_eq!(
            xml_roundtrip(&NumericValue::new(-7), EncodingMode::Plain).to_native(),
            -7
        );
    }
}
