//! `ACTION` settings: named actions run on user events.
//!
//! Syntax version 2 stores one JSON [`ActionConfiguration`] per `<value>`,
//! each holding any number of web-service and LDAP actions, with web-service
//! passwords encoded by the output mode. Older documents (no
//! `syntaxVersion`, `0` or `1`) store one flat JSON object per value
//! describing a single action; those are upgraded in memory and flagged with
//! [`StoredValueKind::needs_xml_update`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::secret::SecretString;
use super::{
    REDACTED, StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default,
    json_elements, json_values, required_missing, syntax_version_attr, validate_names,
    validate_url,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::util;
use crate::xml::XmlElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LdapMethod {
    #[default]
    Replace,
    Add,
    Remove,
}

/// An HTTP call made by an action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebAction {
    pub method: WebMethod,
    pub url: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    pub username: String,
    pub password: SecretString,
    pub success_status: Vec<u16>,
}

/// An attribute write made by an action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LdapAction {
    pub attribute_name: String,
    pub attribute_value: String,
    pub ldap_method: LdapMethod,
}

/// One named action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionConfiguration {
    pub name: String,
    pub description: String,
    pub web_actions: Vec<WebAction>,
    pub ldap_actions: Vec<LdapAction>,
}

impl ActionConfiguration {
    /// Copy with every web-action password passed through `f`.
    fn map_passwords(
        &self,
        mut f: impl FnMut(&str) -> Result<String, ValueError>,
    ) -> Result<Self, ValueError> {
        let mut copy = self.clone();
        for web in &mut copy.web_actions {
            if !web.password.is_empty() {
                web.password = SecretString::new(f(web.password.expose_secret())?);
            }
        }
        Ok(copy)
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.web_actions.is_empty() && self.ldap_actions.is_empty() {
            errors.push(format!("action '{}' has no web or ldap actions", self.name));
        }
        errors.extend(
            self.web_actions
                .iter()
                .filter_map(|web| validate_url("action", &self.name, &web.url)),
        );
        if self.ldap_actions.iter().any(|l| util::is_blank(&l.attribute_name)) {
            errors.push(format!("action '{}' has an ldap action without an attribute name", self.name));
        }
        errors
    }
}

/// The flat single-action record written before syntax version 2.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyAction {
    name: String,
    description: String,
    #[serde(rename = "type")]
    kind: String,
    method: String,
    url: String,
    body: String,
    headers: BTreeMap<String, String>,
    attribute_name: String,
    attribute_value: String,
    ldap_method: String,
}

impl LegacyAction {
    fn upgrade(self) -> Result<ActionConfiguration, ValueError> {
        let mut action = ActionConfiguration {
            name: self.name,
            description: self.description,
            ..ActionConfiguration::default()
        };
        match self.kind.to_ascii_lowercase().as_str() {
            "webservice" => action.web_actions.push(WebAction {
                method: parse_lowercase(&self.method)?.unwrap_or_default(),
                url: self.url,
                body: self.body,
                headers: self.headers,
                ..WebAction::default()
            }),
            "ldap" => action.ldap_actions.push(LdapAction {
                attribute_name: self.attribute_name,
                attribute_value: self.attribute_value,
                ldap_method: parse_lowercase(&self.ldap_method)?.unwrap_or_default(),
            }),
            other => {
                return Err(ValueError::malformed(format!(
                    "legacy action '{}' has unknown type '{other}'",
                    action.name
                )));
            }
        }
        Ok(action)
    }
}

/// Parse an enum from its case-insensitive name; blank means unset.
fn parse_lowercase<T: serde::de::DeserializeOwned>(raw: &str) -> Result<Option<T>, ValueError> {
    if util::is_blank(raw) {
        return Ok(None);
    }
    crate::json::from_value(&Value::String(raw.trim().to_ascii_lowercase())).map(Some)
}

/// `ACTION` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionValue {
    actions: Vec<ActionConfiguration>,
    needs_update: bool,
}

impl ActionValue {
    #[must_use]
    pub fn new(actions: Vec<ActionConfiguration>) -> Self {
        Self {
            actions,
            needs_update: false,
        }
    }
}

impl StoredValueKind for ActionValue {
    type Native = Vec<ActionConfiguration>;

    const SYNTAX_VERSION: u32 = 2;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self::new)
    }

    fn from_xml(setting: &XmlElement, ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        if syntax_version_attr(setting) < Self::SYNTAX_VERSION {
            let legacy: Vec<LegacyAction> = json_values(setting)?;
            let actions = legacy
                .into_iter()
                .map(LegacyAction::upgrade)
                .collect::<Result<_, _>>()?;
            return Ok(Self {
                actions,
                needs_update: true,
            });
        }

        let stored: Vec<ActionConfiguration> = json_values(setting)?;
        let actions = stored
            .iter()
            .map(|a| a.map_passwords(|s| ctx.decode_secret(s)))
            .collect::<Result<_, _>>()?;
        Ok(Self::new(actions))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        let encoded = self
            .actions
            .iter()
            .map(|a| a.map_passwords(|s| ctx.encode_secret(s)))
            .collect::<Result<Vec<_>, _>>()?;
        json_elements(element_name, &encoded)
    }

    fn to_native(&self) -> Vec<ActionConfiguration> {
        self.actions.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.actions)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.actions.is_empty() {
            return vec![required_missing(setting)];
        }
        let mut errors = validate_names("action", self.actions.iter().map(|a| a.name.as_str()));
        errors.extend(self.actions.iter().flat_map(ActionConfiguration::validate));
        errors
    }

    fn to_debug_string(&self) -> String {
        self.actions
            .iter()
            .map(|a| {
                let webs: Vec<String> = a
                    .web_actions
                    .iter()
                    .map(|w| {
                        let method = format!("{:?}", w.method).to_uppercase();
                        format!("{method} {}", w.url)
                    })
                    .collect();
                let ldaps: Vec<String> = a
                    .ldap_actions
                    .iter()
                    .map(|l| format!("{:?} {}={}", l.ldap_method, l.attribute_name, l.attribute_value))
                    .collect();
                format!("{}: [{}]", a.name, [webs, ldaps].concat().join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn to_debug_json(&self) -> Result<Value, ValueError> {
        let redacted = self
            .actions
            .iter()
            .map(|a| a.map_passwords(|_| Ok(REDACTED.to_owned())))
            .collect::<Result<Vec<_>, _>>()?;
        crate::json::to_value(&redacted)
    }

    fn needs_xml_update(&self) -> bool {
        self.needs_update
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::encoder::EncodingMode;
    use crate::setting::SettingSyntax;
    use crate::value::test_support::{key, parse_setting, xml_roundtrip};

    const ACTIONS: Setting = Setting::new("actions", SettingSyntax::Action);

    fn web(name: &str, url: &str) -> ActionConfiguration {
        ActionConfiguration {
            name: name.to_owned(),
            web_actions: vec![WebAction {
                method: WebMethod::Post,
                url: url.to_owned(),
                password: SecretString::new("api-secret"),
                ..WebAction::default()
            }],
            ..ActionConfiguration::default()
        }
    }

    #[test]
    fn v1_xml_matches_v2_json() {
        let xml = parse_setting(
            r#"<setting key="events.user.actions" syntax="ACTION" syntaxVersion="1">
                 <value>{"name":"notify","description":"tell hr","type":"webservice","method":"post","url":"https://hr.example.com/hook","body":"changed","headers":{"X-Src":"selfpass"}}</value>
                 <value>{"name":"flag","type":"ldap","attributeName":"pwdChanged","attributeValue":"true","ldapMethod":"add"}</value>
               </setting>"#,
        );
        let k = key();
        let from_xml = ActionValue::from_xml(&xml, &XmlInputContext::new(&k)).unwrap();

        let v2 = json!([
            {
                "name": "notify",
                "description": "tell hr",
                "webActions": [{
                    "method": "post",
                    "url": "https://hr.example.com/hook",
                    "body": "changed",
                    "headers": {"X-Src": "selfpass"}
                }]
            },
            {
                "name": "flag",
                "ldapActions": [{
                    "attributeName": "pwdChanged",
                    "attributeValue": "true",
                    "ldapMethod": "add"
                }]
            }
        ]);
        let from_json = ActionValue::from_json(&v2).unwrap();

        assert_eq!(from_xml.to_native(), from_json.to_native());
        assert!(from_xml.needs_xml_update());
        assert!(!from_json.needs_xml_update());
    }

    #[test]
    fn missing_syntax_version_is_legacy() {
        let xml = parse_setting(
            r#"<setting><value>{"name":"a","type":"WEBSERVICE","method":"GET","url":"https://x.test"}</value></setting>"#,
        );
        let k = key();
        let v = ActionValue::from_xml(&xml, &XmlInputContext::new(&k)).unwrap();
        assert!(v.needs_xml_update());
        assert_eq!(v.to_native()[0].web_actions[0].method, WebMethod::Get);
    }

    #[test]
    fn legacy_unknown_type_is_an_error() {
        let xml = parse_setting(r#"<setting syntaxVersion="1"><value>{"name":"a","type":"smtp"}</value></setting>"#);
        let k = key();
        assert!(ActionValue::from_xml(&xml, &XmlInputContext::new(&k)).is_err());
    }

    #[test]
    fn v2_roundtrip_encrypts_passwords() {
        let v = ActionValue::new(vec![web("hook", "https://example.com/a")]);
        let back = xml_roundtrip(&v, EncodingMode::Encoded);
        assert_eq!(back.to_native(), v.to_native());
        assert!(!back.needs_xml_update());

        let k = key();
        let els = v
            .to_xml_values("value", &XmlOutputContext::new(&k, EncodingMode::Encoded))
            .unwrap();
        assert!(!els[0].text().contains("api-secret"));
        assert!(els[0].text().contains("ENC-PW:"));
    }

    #[test]
    fn duplicate_names_and_bad_urls_are_rejected() {
        let v = ActionValue::new(vec![web("Hook", "https://ok.test"), web("hook", "not a url")]);
        let errors = v.validate(&ACTIONS);
        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn empty_action_is_rejected() {
        let v = ActionValue::new(vec![ActionConfiguration {
            name: "nothing".to_owned(),
            ..ActionConfiguration::default()
        }]);
        assert_eq!(v.validate(&ACTIONS).len(), 1);
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let v = ActionValue::new(vec![web("hook", "https://example.com/a")]);
        let debug = v.to_debug_json().unwrap();
        assert_eq!(debug[0]["webActions"][0]["password"], REDACTED);
        assert_eq!(v.to_debug_string(), "hook: [POST https://example.com/a]");
    }
}
