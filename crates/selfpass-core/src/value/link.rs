//! `CUSTOMLINKS` settings: links shown on the user's landing page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default, json_elements,
    json_values, required_missing, validate_names, validate_url,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::xml::XmlElement;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomLinkConfiguration {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub description: BTreeMap<String, String>,
    pub custom_link_url: String,
    pub custom_link_new_window: bool,
}

/// `CUSTOMLINKS` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomLinkValue(Vec<CustomLinkConfiguration>);

impl CustomLinkValue {
    #[must_use]
    pub fn new(links: Vec<CustomLinkConfiguration>) -> Self {
        Self(links)
    }
}

impl StoredValueKind for CustomLinkValue {
    type Native = Vec<CustomLinkConfiguration>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        json_values(setting).map(Self)
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        json_elements(element_name, &self.0)
    }

    fn to_native(&self) -> Vec<CustomLinkConfiguration> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        let mut errors = validate_names("custom link", self.0.iter().map(|l| l.name.as_str()));
        errors.extend(
            self.0
                .iter()
                .filter_map(|l| validate_url("custom link", &l.name, &l.custom_link_url)),
        );
        errors
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|l| format!("{} -> {}", l.name, l.custom_link_url))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
