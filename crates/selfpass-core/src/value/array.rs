//! Multi-valued settings: string lists, number lists and option sets.

use std::collections::BTreeSet;

use serde_json::Value;

use super::scalar::{json_number, parse_number};
use super::{
    StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default, required_missing,
    text_element, validate_range, validate_text, value_elements,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::xml::XmlElement;

/// `STRING_ARRAY` settings. Order is preserved unless the setting is `Sorted`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringArrayValue(Vec<String>);

impl StringArrayValue {
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// Copy with items in lexical order.
    #[must_use]
    pub fn sorted(&self) -> Self {
        let mut values = self.0.clone();
        values.sort();
        Self(values)
    }
}

impl StoredValueKind for StringArrayValue {
    type Native = Vec<String>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default::<Vec<String>>(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        Ok(Self::new(value_elements(setting).map(XmlElement::text)))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(self.0.iter().map(|v| text_element(element_name, v.clone())).collect())
    }

    fn to_native(&self) -> Vec<String> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        self.0.iter().flat_map(|v| validate_text(setting, v)).collect()
    }

    fn to_debug_string(&self) -> String {
        self.0.join(", ")
    }
}

/// `NUMERIC_ARRAY` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NumericArrayValue(Vec<i64>);

impl NumericArrayValue {
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Self(values.into_iter().collect())
    }
}

impl StoredValueKind for NumericArrayValue {
    type Native = Vec<i64>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        match json {
            Value::Null => Ok(Self::default()),
            Value::Array(items) => items.iter().map(json_number).collect::<Result<_, _>>().map(Self),
            other => Err(ValueError::malformed(format!("expected a number list, found {other}"))),
        }
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        value_elements(setting)
            .map(|el| parse_number(el.text()))
            .collect::<Result<_, _>>()
            .map(Self)
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(self.0.iter().map(|n| text_element(element_name, n.to_string())).collect())
    }

    fn to_native(&self) -> Vec<i64> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        self.0.iter().flat_map(|n| validate_range(setting, *n)).collect()
    }

    fn to_debug_string(&self) -> String {
        self.0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

/// `OPTIONLIST` settings: a set of selected option names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionListValue(BTreeSet<String>);

impl OptionListValue {
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl StoredValueKind for OptionListValue {
    type Native = BTreeSet<String>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default::<BTreeSet<String>>(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        Ok(Self::new(value_elements(setting).map(XmlElement::text_trim)))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(self.0.iter().map(|v| text_element(element_name, v.clone())).collect())
    }

    fn to_native(&self) -> BTreeSet<String> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        if setting.options.is_empty() {
            return Vec::new();
        }
        self.0
            .iter()
            .filter(|v| !setting.options.contains(&v.as_str()))
            .map(|v| format!("{} option '{v}' is not recognized", setting.label))
            .collect()
    }

    fn to_debug_string(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoder::EncodingMode;
    use crate::setting::SettingSyntax;
    use crate::value::test_support::xml_roundtrip;

    #[test]
    fn string_array_roundtrip_keeps_order() {
        let v = StringArrayValue::new(["zeta", "alpha", ""]);
        assert_eq!(
            xml_roundtrip(&v, EncodingMode::Plain).to_native(),
            vec!["zeta", "alpha", ""]
        );
        assert_eq!(v.sorted().to_native(), vec!["", "alpha", "zeta"]);
    }

    #[test]
    fn string_array_validates_each_item() {
        const S: Setting = Setting::new("list", SettingSyntax::StringArray).pattern("[a-z]+").required();
        assert!(StringArrayValue::new(["ok"]).validate(&S).is_empty());
        assert_eq!(StringArrayValue::new(["ok", "NO", "1"]).validate(&S).len(), 2);
        assert_eq!(StringArrayValue::default().validate(&S), vec!["list is required"]);
    }

    #[test]
    fn numeric_array_roundtrip_and_range() {
        const S: Setting = Setting::new("ports", SettingSyntax::NumericArray).range(Some(1), Some(65_535));
        let v = NumericArrayValue::new([443, 8443]);
        assert_eq!(xml_roundtrip(&v, EncodingMode::Plain).to_native(), vec![443, 8443]);
        assert!(v.validate(&S).is_empty());
        assert_eq!(NumericArrayValue::new([0, 70_000]).validate(&S).len(), 2);
        let json = serde_json::json!([1, "2"]);
        assert_eq!(NumericArrayValue::from_json(&json).unwrap().to_native(), vec![1, 2]);
    }

    #[test]
    fn option_list_rejects_unknown_options() {
        const S: Setting = Setting::new("opts", SettingSyntax::OptionList).options(&["A", "B"]);
        let v = OptionListValue::new(["B", "A", "B"]);
        assert_eq!(v.to_native().len(), 2);
        assert!(v.validate(&S).is_empty());
        assert_eq!(OptionListValue::new(["C"]).validate(&S).len(), 1);
        assert_eq!(xml_roundtrip(&v, EncodingMode::Plain), v);
    }
}
