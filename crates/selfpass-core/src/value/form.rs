//! `FORM` settings: the field definitions of a user-facing form.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default, json_elements,
    json_values, required_missing, validate_names,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::xml::XmlElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormItemType {
    #[default]
    Text,
    Email,
    Number,
    Password,
    Tel,
    Url,
    Hidden,
    Checkbox,
    Select,
}

/// One form field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: FormItemType,
    /// `0` means no lower bound.
    pub minimum_length: u32,
    /// `0` means no upper bound.
    pub maximum_length: u32,
    pub required: bool,
    pub confirmation_required: bool,
    pub read_only: bool,
    pub unique: bool,
    pub labels: BTreeMap<String, String>,
    pub regex_errors: BTreeMap<String, String>,
    pub description: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub select_options: BTreeMap<String, String>,
}

impl FormConfiguration {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.minimum_length > 0
            && self.maximum_length > 0
            && self.minimum_length > self.maximum_length
        {
            errors.push(format!(
                "form item '{}' minimum length {} is greater than maximum length {}",
                self.name, self.minimum_length, self.maximum_length
            ));
        }
        if let Some(Err(e)) = self.regex.as_deref().filter(|p| !p.is_empty()).map(Regex::new) {
            errors.push(format!("form item '{}' has an invalid regex: {e}", self.name));
        }
        if self.item_type == FormItemType::Select && self.select_options.is_empty() {
            errors.push(format!("form item '{}' is a select without options", self.name));
        }
        errors
    }
}

/// `FORM` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormValue(Vec<FormConfiguration>);

impl FormValue {
    #[must_use]
    pub fn new(items: Vec<FormConfiguration>) -> Self {
        Self(items)
    }
}

impl StoredValueKind for FormValue {
    type Native = Vec<FormConfiguration>;

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

    fn to_native(&self) -> Vec<FormConfiguration> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        let mut errors = validate_names("form item", self.0.iter().map(|i| i.name.as_str()));
        errors.extend(self.0.iter().flat_map(FormConfiguration::validate));
        errors
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|i| {
                let required = if i.required { ", required" } else { "" };
                format!("{} ({:?}{required})", i.name, i.item_type).to_lowercase()
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
