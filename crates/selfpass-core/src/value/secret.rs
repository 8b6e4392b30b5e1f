//! Password and named-secret settings.
//!
//! Secrets are held as [`SecretString`], which zeroizes on drop, compares in
//! constant time and never prints its contents. In the document they are
//! written through the output context's encoding mode.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{
    REDACTED, StoredValueKind, XmlInputContext, XmlOutputContext, required_missing, text_element,
    validate_names, value_elements,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::xml::XmlElement;

/// A plaintext secret.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for SecretString {}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<String>::deserialize(deserializer).map(|s| Self(s.unwrap_or_default()))
    }
}

/// `PASSWORD` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PasswordValue(SecretString);

impl PasswordValue {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::new(secret))
    }
}

impl StoredValueKind for PasswordValue {
    type Native = SecretString;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        match json {
            Value::Null => Ok(Self::default()),
            Value::String(s) => Ok(Self::new(s.clone())),
            other => Err(ValueError::malformed(format!(
                "expected a password string, found {}",
                json_kind(other)
            ))),
        }
    }

    fn from_xml(setting: &XmlElement, ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        match value_elements(setting).next() {
            Some(el) => Ok(Self::new(ctx.decode_secret(el.text_trim())?)),
            None => Ok(Self::default()),
        }
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        if self.0.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![text_element(element_name, ctx.encode_secret(self.0.expose_secret())?)])
    }

    fn to_native(&self) -> SecretString {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        Ok(Value::String(self.0.expose_secret().to_owned()))
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            vec![required_missing(setting)]
        } else {
            Vec::new()
        }
    }

    fn to_debug_string(&self) -> String {
        if self.0.is_empty() { String::new() } else { REDACTED.to_owned() }
    }

    fn to_debug_json(&self) -> Result<Value, ValueError> {
        Ok(Value::String(self.to_debug_string()))
    }
}

/// Describes JSON values in errors without echoing possible secrets.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One entry of a `NAMED_SECRET` setting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamedSecretData {
    pub password: SecretString,
    #[serde(default)]
    pub usage: Vec<String>,
}

/// `NAMED_SECRET` settings: secrets keyed by name, each with usage tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamedSecretValue(BTreeMap<String, NamedSecretData>);

impl NamedSecretValue {
    #[must_use]
    pub fn new(values: BTreeMap<String, NamedSecretData>) -> Self {
        Self(values)
    }
}

impl StoredValueKind for NamedSecretValue {
    type Native = BTreeMap<String, NamedSecretData>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        super::from_json_or_default(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        let mut values = BTreeMap::new();
        for el in value_elements(setting) {
            let name = el
                .child("name")
                .map(|n| n.text_trim().to_owned())
                .ok_or_else(|| ValueError::malformed("named secret is missing <name>"))?;
            let stored = el.child("password").map(XmlElement::text_trim).unwrap_or_default();
            let usage = el
                .children_named("usage")
                .map(|u| u.text_trim().to_owned())
                .collect();
            let data = NamedSecretData {
                password: SecretString::new(ctx.decode_secret(stored)?),
                usage,
            };
            values.insert(name, data);
        }
        Ok(Self(values))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        self.0
            .iter()
            .map(|(name, data)| {
                let mut el = XmlElement::new(element_name)
                    .with_child(text_element("name", name.clone()))
                    .with_child(text_element(
                        "password",
                        ctx.encode_secret(data.password.expose_secret())?,
                    ));
                el.attach_all(data.usage.iter().map(|u| text_element("usage", u.clone())));
                Ok(el)
            })
            .collect()
    }

    fn to_native(&self) -> BTreeMap<String, NamedSecretData> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        let mut errors = validate_names("named secret", self.0.keys().map(String::as_str));
        errors.extend(
            self.0
                .iter()
                .filter(|(_, data)| data.password.is_empty())
                .map(|(name, _)| format!("named secret '{name}' has no password")),
        );
        errors
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|(name, data)| format!("{name}: {REDACTED} (usage: {})", data.usage.join(", ")))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn to_debug_json(&self) -> Result<Value, ValueError> {
        let redacted: serde_json::Map<String, Value> = self
            .0
            .iter()
            .map(|(name, data)| {
                (name.clone(), json!({ "password": REDACTED, "usage": data.usage }))
            })
            .collect();
        Ok(Value::Object(redacted))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoder::EncodingMode;
    use crate::setting::SettingSyntax;
    use crate::value::test_support::{key, xml_roundtrip};

    fn named(entries: &[(&str, &str, &[&str])]) -> NamedSecretValue {
        NamedSecretValue::new(
            entries
                .iter()
                .map(|(name, pw, usage)| {
                    let data = NamedSecretData {
                        password: SecretString::new(*pw),
                        usage: usage.iter().map(|u| (*u).to_owned()).collect(),
                    };
                    ((*name).to_owned(), data)
                })
                .collect(),
        )
    }

    #[test]
    fn password_roundtrips_through_encrypted_modes() {
        let v = PasswordValue::new("correct horse");
        for mode in [EncodingMode::Plain, EncodingMode::ConfigPw, EncodingMode::Encoded] {
            assert_eq!(
                xml_roundtrip(&v, mode).to_native().expose_secret(),
                "correct horse",
                "{mode}"
            );
        }
    }

    #[test]
    fn password_is_encrypted_in_xml() {
        let k = key();
        let els = PasswordValue::new("hunter2")
            .to_xml_values("value", &XmlOutputContext::new(&k, EncodingMode::Encoded))
            .unwrap();
        assert!(els[0].text().starts_with("ENC-PW:"));
        assert!(!els[0].text().contains("hunter2"));
    }

    #[test]
    fn password_debug_is_redacted() {
        let v = PasswordValue::new("hunter2");
        assert_eq!(v.to_debug_string(), REDACTED);
        assert_eq!(v.to_debug_json().unwrap(), Value::from(REDACTED));
        assert_eq!(format!("{:?}", v.to_native()), REDACTED);
        assert_eq!(PasswordValue::default().to_debug_string(), "");
    }

    #[test]
    fn stripped_password_reads_back_as_marker() {
        let v = PasswordValue::new("hunter2");
        assert_eq!(xml_roundtrip(&v, EncodingMode::Stripped).to_native().expose_secret(), REDACTED);
    }

    #[test]
    fn named_secret_roundtrip() {
        let v = named(&[("smtp", "pw1", &["email"]), ("ldap", "pw2", &["ldap", "bind"])]);
        assert_eq!(xml_roundtrip(&v, EncodingMode::Encoded), v);
        assert_eq!(xml_roundtrip(&v, EncodingMode::ConfigPw), v);
    }

    #[test]
    fn named_secret_validation() {
        const S: Setting = Setting::new("secrets", SettingSyntax::NamedSecret);
        let v = named(&[("SMTP", "a", &[]), ("smtp", "", &[])]);
        let errors = v.validate(&S);
        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn named_secret_debug_json_redacts() {
        let v = named(&[("smtp", "pw1", &["email"])]);
        let debug = v.to_debug_json().unwrap();
        assert_eq!(debug["smtp"]["password"], REDACTED);
        assert!(!v.to_debug_string().contains("pw1"));
    }
}
