//! `EMAIL` settings: a message template per locale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    MAX_TEXT_LENGTH, StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default,
    locale_of, required_missing, text_element, value_elements,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::util;
use crate::xml::XmlElement;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailItem {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_plain: String,
    pub body_html: String,
}

impl EmailItem {
    fn validate(&self, locale: &str) -> Vec<String> {
        let locale = if locale.is_empty() { "default" } else { locale };
        let mut errors = Vec::new();
        if util::is_blank(&self.subject) {
            errors.push(format!("email ({locale}) subject is required"));
        }
        if util::is_blank(&self.from) {
            errors.push(format!("email ({locale}) from address is required"));
        }
        if util::is_blank(&self.body_plain) && util::is_blank(&self.body_html) {
            errors.push(format!("email ({locale}) needs a plain or html body"));
        }
        for (kind, body) in [("plain", &self.body_plain), ("html", &self.body_html)] {
            if body.chars().count() > MAX_TEXT_LENGTH {
                errors.push(format!(
                    "email ({locale}) {kind} body exceeds {MAX_TEXT_LENGTH} characters"
                ));
            }
        }
        errors
    }
}

/// `EMAIL` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmailValue(BTreeMap<String, EmailItem>);

impl EmailValue {
    #[must_use]
    pub fn new(items: BTreeMap<String, EmailItem>) -> Self {
        Self(items)
    }
}

impl StoredValueKind for EmailValue {
    type Native = BTreeMap<String, EmailItem>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        value_elements(setting)
            .filter(|el| !util::is_blank(el.text()))
            .map(|el| -> Result<(String, EmailItem), ValueError> {
                Ok((locale_of(el), crate::json::from_str(el.text())?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        self.0
            .iter()
            .map(|(locale, item)| {
                let el = text_element(element_name, crate::json::to_compact(item)?);
                Ok(if locale.is_empty() {
                    el
                } else {
                    el.with_attribute("locale", locale.clone())
                })
            })
            .collect()
    }

    fn to_native(&self) -> BTreeMap<String, EmailItem> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        self.0
            .iter()
            .flat_map(|(locale, item)| item.validate(locale))
            .collect()
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|(locale, item)| {
                let locale = if locale.is_empty() { "default" } else { locale };
                format!("{locale}: from={} subject={}", item.from, item.subject)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoder::EncodingMode;
    use crate::setting::SettingSyntax;
    use crate::value::test_support::xml_roundtrip;

    const EMAIL: Setting = Setting::new("email.change", SettingSyntax::Email);

    fn item(subject: &str) -> EmailItem {
        EmailItem {
            from: "noreply@example.com".to_owned(),
            subject: subject.to_owned(),
            body_plain: "Your password was changed.".to_owned(),
            ..EmailItem::default()
        }
    }

    #[test]
    fn roundtrip_per_locale() {
        let v = EmailValue::new(BTreeMap::from([
            (String::new(), item("Changed")),
            ("de".to_owned(), item("Geändert")),
        ]));
        assert_eq!(xml_roundtrip(&v, EncodingMode::Plain), v);
        assert!(v.validate(&EMAIL).is_empty());
    }

    #[test]
    fn structural_checks() {
        let v = EmailValue::new(BTreeMap::from([(String::new(), EmailItem::default())]));
        assert_eq!(v.validate(&EMAIL).len(), 3);
    }

    #[test]
    fn body_size_is_bounded() {
        let mut big = item("x");
        big.body_html = "a".repeat(MAX_TEXT_LENGTH + 1);
        let v = EmailValue::new(BTreeMap::from([(String::new(), big)]));
        let errors = v.validate(&EMAIL);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("html body"));
    }
}
