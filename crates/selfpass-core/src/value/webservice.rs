//! `REMOTE_WEB_SERVICE` settings: named HTTP endpoints with credentials.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::WebMethod;
use super::secret::SecretString;
use super::{
    REDACTED, StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default,
    json_elements, json_values, required_missing, validate_names, validate_url,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::xml::XmlElement;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteWebServiceConfiguration {
    pub name: String,
    pub method: WebMethod,
    pub url: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    pub username: String,
    pub password: SecretString,
}

impl RemoteWebServiceConfiguration {
    fn with_password(&self, password: String) -> Self {
        Self {
            password: SecretString::new(password),
            ..self.clone()
        }
    }
}

/// `REMOTE_WEB_SERVICE` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteWebServiceValue(Vec<RemoteWebServiceConfiguration>);

impl RemoteWebServiceValue {
    #[must_use]
    pub fn new(services: Vec<RemoteWebServiceConfiguration>) -> Self {
        Self(services)
    }
}

impl StoredValueKind for RemoteWebServiceValue {
    type Native = Vec<RemoteWebServiceConfiguration>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self)
    }

    fn from_xml(setting: &XmlElement, ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        let stored: Vec<RemoteWebServiceConfiguration> = json_values(setting)?;
        stored
            .iter()
            .map(|s| {
                if s.password.is_empty() {
                    Ok(s.clone())
                } else {
                    Ok(s.with_password(ctx.decode_secret(s.password.expose_secret())?))
                }
            })
            .collect::<Result<_, ValueError>>()
            .map(Self)
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        let encoded = self
            .0
            .iter()
            .map(|s| {
                if s.password.is_empty() {
                    Ok(s.clone())
                } else {
                    Ok(s.with_password(ctx.encode_secret(s.password.expose_secret())?))
                }
            })
            .collect::<Result<Vec<_>, ValueError>>()?;
        json_elements(element_name, &encoded)
    }

    fn to_native(&self) -> Vec<RemoteWebServiceConfiguration> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.0)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        let mut errors = validate_names("web service", self.0.iter().map(|s| s.name.as_str()));
        errors.extend(
            self.0
                .iter()
                .filter_map(|s| validate_url("web service", &s.name, &s.url)),
        );
        errors
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|s| {
                let method = format!("{:?}", s.method).to_uppercase();
                let credential = if s.password.is_empty() { "" } else { " (password set)" };
                format!("{}: {method} {}{credential}", s.name, s.url)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn to_debug_json(&self) -> Result<Value, ValueError> {
        let redacted: Vec<RemoteWebServiceConfiguration> = self
            .0
            .iter()
            .map(|s| {
                if s.password.is_empty() {
                    s.clone()
                } else {
                    s.with_password(REDACTED.to_owned())
                }
            })
            .collect();
        crate::json::to_value(&redacted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoder::EncodingMode;
    use crate::setting::SettingSyntax;
    use crate::value::test_support::xml_roundtrip;

    const SERVICES: Setting = Setting::new("external.remoteResponses", SettingSyntax::RemoteWebService);

    fn service(name: &str, url: &str, password: &str) -> RemoteWebServiceConfiguration {
        RemoteWebServiceConfiguration {
            name: name.to_owned(),
            method: WebMethod::Post,
            url: url.to_owned(),
            username: "svc".to_owned(),
            password: SecretString::new(password),
            ..RemoteWebServiceConfiguration::default()
        }
    }

    #[test]
    fn roundtrip_with_and_without_password() {
        let v = RemoteWebServiceValue::new(vec![
            service("verify", "https://api.test/verify", "t0ken"),
            service("open", "https://api.test/open", ""),
        ]);
        assert_eq!(xml_roundtrip(&v, EncodingMode::Encoded), v);
        assert_eq!(xml_roundtrip(&v, EncodingMode::ConfigPw), v);
    }

    #[test]
    fn duplicate_names_rejected() {
        let v = RemoteWebServiceValue::new(vec![
            service("Verify", "https://a.test", ""),
            service("VERIFY", "https://b.test", ""),
        ]);
        assert_eq!(v.validate(&SERVICES).len(), 1);
    }

    #[test]
    fn invalid_url_rejected_and_password_redacted() {
        let v = RemoteWebServiceValue::new(vec![service("x", "::nope", "secret")]);
        assert_eq!(v.validate(&SERVICES).len(), 1);
        assert_eq!(v.to_debug_json().unwrap()[0]["password"], REDACTED);
        assert_eq!(v.to_debug_string(), "x: POST ::nope (password set)");
    }
}
