//! `USER_PERMISSION` settings: which directory users a feature applies to.
//!
//! Syntax version 2 stores one [`UserPermission`] JSON object per value.
//! Older documents used a two-type record (`ldapQuery`/`ldapGroup`) with an
//! optional profile; a query with no base that matches everything is the
//! same as "all users" and is upgraded to [`UserPermissionType::LdapAll`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    StoredValueKind, XmlInputContext, XmlOutputContext, from_json_or_default, json_elements,
    json_values, required_missing, syntax_version_attr,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::util;
use crate::xml::XmlElement;

/// Profile id meaning "every directory profile".
pub const ALL_PROFILES: &str = "all";

const MATCH_ALL_FILTER: &str = "(objectClass=*)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserPermissionType {
    #[default]
    LdapQuery,
    LdapGroup,
    LdapUser,
    LdapAll,
}

fn all_profiles() -> String {
    ALL_PROFILES.to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermission {
    #[serde(rename = "type", default)]
    pub permission_type: UserPermissionType,
    #[serde(rename = "ldapProfileID", default = "all_profiles")]
    pub ldap_profile_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_query: Option<String>,
}

impl UserPermission {
    /// Every user in every profile.
    #[must_use]
    pub fn all() -> Self {
        Self {
            permission_type: UserPermissionType::LdapAll,
            ldap_profile_id: all_profiles(),
            ldap_base: None,
            ldap_query: None,
        }
    }

    fn validate(&self) -> Vec<String> {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(util::is_blank);
        match self.permission_type {
            UserPermissionType::LdapQuery if blank(&self.ldap_query) => {
                vec!["ldap query permission requires a query".to_owned()]
            }
            UserPermissionType::LdapGroup if blank(&self.ldap_base) => {
                vec!["ldap group permission requires a group dn".to_owned()]
            }
            UserPermissionType::LdapUser if blank(&self.ldap_base) => {
                vec!["ldap user permission requires a user dn".to_owned()]
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyPermission {
    #[serde(rename = "ldapProfileID")]
    ldap_profile_id: Option<String>,
    ldap_query: Option<String>,
    ldap_base: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl LegacyPermission {
    fn upgrade(self) -> Result<UserPermission, ValueError> {
        let non_blank = |v: Option<String>| v.filter(|s| !util::is_blank(s));
        let profile = non_blank(self.ldap_profile_id).unwrap_or_else(all_profiles);
        let base = non_blank(self.ldap_base);
        let query = non_blank(self.ldap_query);

        let is_group = match self.kind.as_deref().map(str::trim) {
            None | Some("" | "ldapQuery") => false,
            Some("ldapGroup") => true,
            Some(other) => {
                return Err(ValueError::malformed(format!(
                    "legacy user permission has unknown type '{other}'"
                )));
            }
        };

        if is_group {
            return Ok(UserPermission {
                permission_type: UserPermissionType::LdapGroup,
                ldap_profile_id: profile,
                ldap_base: base,
                ldap_query: None,
            });
        }
        let matches_all = query.as_deref().is_none_or(|q| q == MATCH_ALL_FILTER);
        if base.is_none() && matches_all {
            return Ok(UserPermission {
                ldap_profile_id: profile,
                ..UserPermission::all()
            });
        }
        Ok(UserPermission {
            permission_type: UserPermissionType::LdapQuery,
            ldap_profile_id: profile,
            ldap_base: base,
            ldap_query: query,
        })
    }
}

/// `USER_PERMISSION` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserPermissionValue {
    permissions: Vec<UserPermission>,
    needs_update: bool,
}

impl UserPermissionValue {
    #[must_use]
    pub fn new(permissions: Vec<UserPermission>) -> Self {
        Self {
            permissions,
            needs_update: false,
        }
    }
}

impl StoredValueKind for UserPermissionValue {
    type Native = Vec<UserPermission>;

    const SYNTAX_VERSION: u32 = 2;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        from_json_or_default(json).map(Self::new)
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        if syntax_version_attr(setting) < Self::SYNTAX_VERSION {
            let legacy: Vec<LegacyPermission> = json_values(setting)?;
            let permissions = legacy
                .into_iter()
                .map(LegacyPermission::upgrade)
                .collect::<Result<_, _>>()?;
            return Ok(Self {
                permissions,
                needs_update: true,
            });
        }
        json_values(setting).map(Self::new)
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        json_elements(element_name, &self.permissions)
    }

    fn to_native(&self) -> Vec<UserPermission> {
        self.permissions.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        crate::json::to_value(&self.permissions)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.permissions.is_empty() {
            return vec![required_missing(setting)];
        }
        self.permissions.iter().flat_map(UserPermission::validate).collect()
    }

    fn to_debug_string(&self) -> String {
        self.permissions
            .iter()
            .map(|p| {
                let mut parts = vec![format!("{:?}", p.permission_type), format!("profile={}", p.ldap_profile_id)];
                if let Some(base) = &p.ldap_base {
                    parts.push(format!("base={base}"));
                }
                if let Some(query) = &p.ldap_query {
                    parts.push(format!("query={query}"));
                }
                parts.join(" ")
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn needs_xml_update(&self) -> bool {
        self.needs_update
    }
}
