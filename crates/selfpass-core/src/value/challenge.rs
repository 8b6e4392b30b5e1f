//! `CHALLENGE` settings: security questions per locale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default, locale_of,
    required_missing, text_element, value_elements,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::util;
use crate::xml::XmlElement;

/// Longest answer a challenge may demand.
pub const MAX_ANSWER_LENGTH: u32 = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChallengeItemConfiguration {
    pub text: String,
    pub min_length: u32,
    pub max_length: u32,
    /// Admin-defined questions carry their text; user-defined ones do not.
    pub admin_defined: bool,
    pub enforce_wordlist: bool,
    pub max_question_chars_in_answer: u32,
}

impl Default for ChallengeItemConfiguration {
    fn default() -> Self {
        Self {
            text: String::new(),
            min_length: 2,
            max_length: MAX_ANSWER_LENGTH,
            admin_defined: true,
            enforce_wordlist: false,
            max_question_chars_in_answer: 3,
        }
    }
}

impl ChallengeItemConfiguration {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.min_length > self.max_length {
            errors.push(format!(
                "challenge '{}' minimum length {} is greater than maximum length {}",
                self.text, self.min_length, self.max_length
            ));
        }
        if self.max_length > MAX_ANSWER_LENGTH {
            errors.push(format!(
                "challenge '{}' maximum length {} exceeds {MAX_ANSWER_LENGTH}",
                self.text, self.max_length
            ));
        }
        if self.admin_defined && util::is_blank(&self.text) {
            errors.push("admin-defined challenge has no question text".to_owned());
        }
        errors
    }
}

/// `CHALLENGE` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChallengeValue(BTreeMap<String, Vec<ChallengeItemConfiguration>>);

impl ChallengeValue {
    #[must_use]
    pub fn new(items: BTreeMap<String, Vec<ChallengeItemConfiguration>>) -> Self {
        Self(items)
    }
}

impl StoredValueKind for ChallengeValue {
    type Native = BTreeMap<String, Vec<ChallengeItemConfiguration>>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        let mut items: BTreeMap<String, Vec<ChallengeItemConfiguration>> = BTreeMap::new();
        for el in value_elements(setting).filter(|el| !util::is_blank(el.text())) {
            let item = crate::json::from_str(el.text())?;
            items.entry(locale_of(el)).or_default().push(item);
        }
        Ok(Self(items))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        let mut out = Vec::new();
        for (locale, items) in &self.0 {
            for item in items {
                let el = text_element(element_name, crate::json::to_compact(item)?);
                out.push(if locale.is_empty() {
                    el
                } else {
                    el.with_attribute("locale", locale.clone())
                });
            }
        }
        Ok(out)
    }

    fn to_native(&self) -> BTreeMap<String, Vec<ChallengeItemConfiguration>> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.values().all(Vec::is_empty) {
            return vec![required_missing(setting)];
        }
        self.0
            .values()
            .flatten()
            .flat_map(ChallengeItemConfiguration::validate)
            .collect()
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|(locale, items)| {
                let locale = if locale.is_empty() { "default" } else { locale };
                let rendered: Vec<String> = items
                    .iter()
                    .map(|i| {
                        let text = if i.admin_defined { i.text.as_str() } else { "[user defined]" };
                        format!("{text} ({}-{})", i.min_length, i.max_length)
                    })
                    .collect();
                format!("{locale}: {}", rendered.join(", "))
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

    const CHALLENGES: Setting = Setting::new("challenge.random", SettingSyntax::Challenge);

    fn question(text: &str, min: u32, max: u32) -> ChallengeItemConfiguration {
        ChallengeItemConfiguration {
            text: text.to_owned(),
            min_length: min,
            max_length: max,
            ..ChallengeItemConfiguration::default()
        }
    }

    fn single(items: Vec<ChallengeItemConfiguration>) -> ChallengeValue {
        ChallengeValue::new(BTreeMap::from([(String::new(), items)]))
    }

    #[test]
    fn roundtrip_keeps_locales_and_order() {
        let v = ChallengeValue::new(BTreeMap::from([
            (String::new(), vec![question("First pet?", 2, 40), question("Birth city?", 3, 60)]),
            ("fr".to_owned(), vec![question("Premier animal?", 2, 40)]),
        ]));
        assert_eq!(xml_roundtrip(&v, EncodingMode::Plain), v);
    }

    #[test]
    fn min_greater_than_max_is_rejected() {
        let errors = single(vec![question("q", 10, 5)]).validate(&CHALLENGES);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn max_over_255_is_rejected() {
        let errors = single(vec![question("q", 1, 256)]).validate(&CHALLENGES);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("255"));
    }

    #[test]
    fn user_defined_questions_need_no_text() {
        let item = ChallengeItemConfiguration {
            admin_defined: false,
            ..ChallengeItemConfiguration::default()
        };
        assert!(single(vec![item.clone()]).validate(&CHALLENGES).is_empty());
        let admin = ChallengeItemConfiguration::default();
        assert_eq!(single(vec![admin]).validate(&CHALLENGES).len(), 1);
        assert_eq!(single(vec![item]).to_debug_string(), "default: [user defined] (2-255)");
    }
}
