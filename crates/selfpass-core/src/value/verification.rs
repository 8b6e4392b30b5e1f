//! `VERIFICATION_METHOD` settings: which identity checks a forgotten-password
//! flow uses, and how many of the optional ones a user must pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default, text_element, value_elements};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::util;
use crate::xml::XmlElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    PreviousAuth,
    Attributes,
    ChallengeResponses,
    TokenEmail,
    TokenSms,
    Otp,
    RemoteResponses,
    Oauth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethodEnforcement {
    #[default]
    Disabled,
    Optional,
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationMethodSettings {
    pub methods: BTreeMap<VerificationMethod, VerificationMethodEnforcement>,
    pub min_optional_required: u32,
}

impl VerificationMethodSettings {
    fn count(&self, enforcement: VerificationMethodEnforcement) -> usize {
        self.methods.values().filter(|e| **e == enforcement).count()
    }
}

/// `VERIFICATION_METHOD` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerificationMethodValue(VerificationMethodSettings);

impl VerificationMethodValue {
    #[must_use]
    pub fn new(settings: VerificationMethodSettings) -> Self {
        Self(settings)
    }
}

impl StoredValueKind for VerificationMethodValue {
    type Native = VerificationMethodSettings;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        match value_elements(setting).next() {
            Some(el) if !util::is_blank(el.text()) => crate::json::from_str(el.text()).map(Self),
            _ => Ok(Self::default()),
        }
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(vec![text_element(element_name, crate::json::to_compact(&self.0)?)])
    }

    fn to_native(&self) -> VerificationMethodSettings {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        let optional = self.0.count(VerificationMethodEnforcement::Optional);
        let required = self.0.count(VerificationMethodEnforcement::Required);
        let mut errors = Vec::new();
        if usize::try_from(self.0.min_optional_required).unwrap_or(usize::MAX) > optional {
            errors.push(format!(
                "{} requires {} optional methods but only {optional} are enabled",
                setting.label, self.0.min_optional_required
            ));
        }
        if setting.required && optional == 0 && required == 0 {
            errors.push(format!("{} needs at least one enabled method", setting.label));
        }
        errors
    }

    fn to_debug_string(&self) -> String {
        let methods: Vec<String> = self
            .0
            .methods
            .iter()
            .filter(|(_, e)| **e != VerificationMethodEnforcement::Disabled)
            .map(|(m, e)| format!("{m:?}={e:?}"))
            .collect();
        format!(
            "{} (min optional {})",
            methods.join(", "),
            self.0.min_optional_required
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoder::EncodingMode;
    use crate::setting::SettingSyntax;
    use crate::value::test_support::xml_roundtrip;

    const METHODS: Setting = Setting::new("recovery.verificationMethods", SettingSyntax::VerificationMethod);

    fn settings(min: u32) -> VerificationMethodSettings {
        VerificationMethodSettings {
            methods: BTreeMap::from([
                (VerificationMethod::ChallengeResponses, VerificationMethodEnforcement::Required),
                (VerificationMethod::TokenEmail, VerificationMethodEnforcement::Optional),
                (VerificationMethod::Otp, VerificationMethodEnforcement::Optional),
                (VerificationMethod::Oauth, VerificationMethodEnforcement::Disabled),
            ]),
            min_optional_required: min,
        }
    }

    #[test]
    fn roundtrip() {
        let v = VerificationMethodValue::new(settings(1));
        assert_eq!(xml_roundtrip(&v, EncodingMode::Plain), v);
    }

    #[test]
    fn min_optional_cannot_exceed_optional_count() {
        assert!(VerificationMethodValue::new(settings(2)).validate(&METHODS).is_empty());
        assert_eq!(VerificationMethodValue::new(settings(3)).validate(&METHODS).len(), 1);
    }

    #[test]
    fn json_form() {
        let json = serde_json::json!({
            "methods": {"TOKEN_EMAIL": "OPTIONAL"},
            "minOptionalRequired": 1
        });
        let v = VerificationMethodValue::from_json(&json).unwrap();
        assert_eq!(v.to_json().unwrap(), json);
        assert_eq!(v.to_debug_string(), "TokenEmail=Optional (min optional 1)");
    }
}
