//! Per-locale string settings. The default locale is the empty string.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{
    StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default, locale_of,
    required_missing, text_element, validate_text, value_elements,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::util;
use crate::xml::XmlElement;

fn localized_element(name: &str, locale: &str, text: &str) -> XmlElement {
    let el = text_element(name, text);
    if locale.is_empty() {
        el
    } else {
        el.with_attribute("locale", locale)
    }
}

fn debug_locale(locale: &str) -> &str {
    if locale.is_empty() { "default" } else { locale }
}

/// `LOCALIZED_STRING` and `LOCALIZED_TEXT_AREA` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalizedStringValue(BTreeMap<String, String>);

impl LocalizedStringValue {
    #[must_use]
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    /// A value with only the default locale.
    #[must_use]
    pub fn single(text: impl Into<String>) -> Self {
        Self(BTreeMap::from([(String::new(), text.into())]))
    }
}

impl StoredValueKind for LocalizedStringValue {
    type Native = BTreeMap<String, String>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        Ok(Self(
            value_elements(setting)
                .map(|el| (locale_of(el), el.text().to_owned()))
                .collect(),
        ))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(self
            .0
            .iter()
            .map(|(locale, text)| localized_element(element_name, locale, text))
            .collect())
    }

    fn to_native(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.get("").is_none_or(|t| util::is_blank(t)) {
            return vec![required_missing(setting)];
        }
        self.0.values().flat_map(|t| validate_text(setting, t)).collect()
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|(locale, text)| format!("{}: {text}", debug_locale(locale)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// `LOCALIZED_STRING_ARRAY` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalizedStringArrayValue(BTreeMap<String, Vec<String>>);

impl LocalizedStringArrayValue {
    #[must_use]
    pub fn new(values: BTreeMap<String, Vec<String>>) -> Self {
        Self(values)
    }
}

impl StoredValueKind for LocalizedStringArrayValue {
    type Native = BTreeMap<String, Vec<String>>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for el in value_elements(setting) {
            values.entry(locale_of(el)).or_default().push(el.text().to_owned());
        }
        Ok(Self(values))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(self
            .0
            .iter()
            .flat_map(|(locale, items)| {
                items
                    .iter()
                    .map(move |text| localized_element(element_name, locale, text))
            })
            .collect())
    }

    fn to_native(&self) -> BTreeMap<String, Vec<String>> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.get("").is_none_or(Vec::is_empty) {
            return vec![required_missing(setting)];
        }
        self.0
            .values()
            .flatten()
            .flat_map(|t| validate_text(setting, t))
            .collect()
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|(locale, items)| format!("{}: [{}]", debug_locale(locale), items.join(", ")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
