//! Builds [`StoredValue`]s for a [`Setting`] from JSON, XML, or its default.
//!
//! The setting's syntax selects the value type. Failures are reported as
//! [`ValueError::ConfigFormat`] naming the setting key.

use serde_json::Value;

use crate::error::ValueError;
use crate::setting::{Setting, SettingFlag, SettingSyntax};
use crate::value::{
    ActionValue, BooleanValue, ChallengeValue, CustomLinkValue, EmailValue, FileValue, FormValue,
    LocalizedStringArrayValue, LocalizedStringValue, NamedSecretValue, NumericArrayValue,
    NumericValue, OptionListValue, PasswordValue, PrivateKeyValue, RemoteWebServiceValue,
    StoredValue, StoredValueKind, StringArrayValue, StringValue, UserPermissionValue,
    VerificationMethodValue, X509CertificateValue, XmlInputContext,
};
use crate::xml::XmlElement;

/// Build a value of the setting's syntax from its JSON form.
///
/// # Errors
///
/// Returns [`ValueError::ConfigFormat`] if the JSON does not fit the syntax.
pub fn from_json(setting: &Setting, json: &Value) -> Result<StoredValue, ValueError> {
    json_value(setting.syntax, json)
        .map(|v| normalize(setting, v))
        .map_err(|e| config_format(setting.key, &e))
}

/// Build a value from a `<setting>` element.
///
/// # Errors
///
/// Returns [`ValueError::ConfigFormat`] if a child cannot be parsed or a
/// secret cannot be decoded.
pub fn from_xml(
    setting: &Setting,
    element: &XmlElement,
    ctx: &XmlInputContext<'_>,
) -> Result<StoredValue, ValueError> {
    xml_value(setting.syntax, element, ctx)
        .map(|v| normalize(setting, v))
        .map_err(|e| config_format(setting.key, &e))
}

/// Build a value for a key outside the catalog, knowing only its syntax.
///
/// # Errors
///
/// Returns [`ValueError::ConfigFormat`] if a child cannot be parsed or a
/// secret cannot be decoded.
pub fn from_xml_with_syntax(
    key: &str,
    syntax: SettingSyntax,
    element: &XmlElement,
    ctx: &XmlInputContext<'_>,
) -> Result<StoredValue, ValueError> {
    xml_value(syntax, element, ctx)
        .map(|v| normalized(syntax, &[], v))
        .map_err(|e| config_format(key, &e))
}

/// The setting's default: its default JSON, or the empty value for the syntax.
///
/// # Errors
///
/// Returns [`ValueError::ConfigFormat`] if the declared default is invalid.
pub fn default_value(setting: &Setting) -> Result<StoredValue, ValueError> {
    let json = match setting.default_json {
        Some(text) => crate::json::from_str(text).map_err(|e| config_format(setting.key, &e))?,
        None => Value::Null,
    };
    from_json(setting, &json)
}

/// `true` when `value` is the variant the syntax produces.
#[must_use]
pub fn matches_syntax(syntax: SettingSyntax, value: &StoredValue) -> bool {
    matches!(
        (syntax, value),
        (
            SettingSyntax::String | SettingSyntax::TextArea | SettingSyntax::Select,
            StoredValue::String(_)
        ) | (SettingSyntax::StringArray, StoredValue::StringArray(_))
            | (
                SettingSyntax::LocalizedString | SettingSyntax::LocalizedTextArea,
                StoredValue::LocalizedString(_)
            )
            | (SettingSyntax::LocalizedStringArray, StoredValue::LocalizedStringArray(_))
            | (SettingSyntax::Password, StoredValue::Password(_))
            | (SettingSyntax::NamedSecret, StoredValue::NamedSecret(_))
            | (SettingSyntax::Numeric | SettingSyntax::Duration, StoredValue::Numeric(_))
            | (SettingSyntax::NumericArray, StoredValue::NumericArray(_))
            | (SettingSyntax::Boolean, StoredValue::Boolean(_))
            | (SettingSyntax::OptionList, StoredValue::OptionList(_))
            | (SettingSyntax::Form, StoredValue::Form(_))
            | (SettingSyntax::Action, StoredValue::Action(_))
            | (SettingSyntax::Email, StoredValue::Email(_))
            | (SettingSyntax::Challenge, StoredValue::Challenge(_))
            | (SettingSyntax::X509Cert, StoredValue::X509Certificate(_))
            | (SettingSyntax::PrivateKey, StoredValue::PrivateKey(_))
            | (SettingSyntax::File, StoredValue::File(_))
            | (SettingSyntax::UserPermission, StoredValue::UserPermission(_))
            | (SettingSyntax::CustomLinks, StoredValue::CustomLink(_))
            | (SettingSyntax::RemoteWebService, StoredValue::RemoteWebService(_))
            | (SettingSyntax::VerificationMethod, StoredValue::VerificationMethod(_))
    )
}

/// Apply the setting's normalization: durations are marked, `Sorted`
/// string arrays are sorted.
#[must_use]
pub fn normalize(setting: &Setting, value: StoredValue) -> StoredValue {
    normalized(setting.syntax, setting.flags, value)
}

fn normalized(syntax: SettingSyntax, flags: &[SettingFlag], value: StoredValue) -> StoredValue {
    match value {
        StoredValue::Numeric(n) if syntax == SettingSyntax::Duration => {
            StoredValue::Numeric(n.as_duration())
        }
        StoredValue::StringArray(a) if flags.contains(&SettingFlag::Sorted) => {
            StoredValue::StringArray(a.sorted())
        }
        other => other,
    }
}

fn config_format(key: &str, cause: &ValueError) -> ValueError {
    tracing::warn!(setting = key, error = %cause, "unable to read setting value");
    ValueError::ConfigFormat {
        setting: key.to_owned(),
        reason: cause.to_string(),
    }
}

macro_rules! by_syntax {
    ($syntax:expr, $ty:ident => $body:expr) => {
        match $syntax {
            SettingSyntax::String | SettingSyntax::TextArea | SettingSyntax::Select => {
                type $ty = StringValue;
                $body.map(StoredValue::String)
            }
            SettingSyntax::StringArray => {
                type $ty = StringArrayValue;
                $body.map(StoredValue::StringArray)
            }
            SettingSyntax::LocalizedString | SettingSyntax::LocalizedTextArea => {
                type $ty = LocalizedStringValue;
                $body.map(StoredValue::LocalizedString)
            }
            SettingSyntax::LocalizedStringArray => {
                type $ty = LocalizedStringArrayValue;
                $body.map(StoredValue::LocalizedStringArray)
            }
            SettingSyntax::Password => {
                type $ty = PasswordValue;
                $body.map(StoredValue::Password)
            }
            SettingSyntax::NamedSecret => {
                type $ty = NamedSecretValue;
                $body.map(StoredValue::NamedSecret)
            }
            SettingSyntax::Numeric | SettingSyntax::Duration => {
                type $ty = NumericValue;
                $body.map(StoredValue::Numeric)
            }
            SettingSyntax::NumericArray => {
                type $ty = NumericArrayValue;
                $body.map(StoredValue::NumericArray)
            }
            SettingSyntax::Boolean => {
                type $ty = BooleanValue;
                $body.map(StoredValue::Boolean)
            }
            SettingSyntax::OptionList => {
                type $ty = OptionListValue;
                $body.map(StoredValue::OptionList)
            }
            SettingSyntax::Form => {
                type $ty = FormValue;
                $body.map(StoredValue::Form)
            }
            SettingSyntax::Action => {
                type $ty = ActionValue;
                $body.map(StoredValue::Action)
            }
            SettingSyntax::Email => {
                type $ty = EmailValue;
                $body.map(StoredValue::Email)
            }
            SettingSyntax::Challenge => {
                type $ty = ChallengeValue;
                $body.map(StoredValue::Challenge)
            }
            SettingSyntax::X509Cert => {
                type $ty = X509CertificateValue;
                $body.map(StoredValue::X509Certificate)
            }
            SettingSyntax::PrivateKey => {
                type $ty = PrivateKeyValue;
                $body.map(StoredValue::PrivateKey)
            }
            SettingSyntax::File => {
                type $ty = FileValue;
                $body.map(StoredValue::File)
            }
            SettingSyntax::UserPermission => {
                type $ty = UserPermissionValue;
                $body.map(StoredValue::UserPermission)
            }
            SettingSyntax::CustomLinks => {
                type $ty = CustomLinkValue;
                $body.map(StoredValue::CustomLink)
            }
            SettingSyntax::RemoteWebService => {
                type $ty = RemoteWebServiceValue;
                $body.map(StoredValue::RemoteWebService)
            }
            SettingSyntax::VerificationMethod => {
                type $ty = VerificationMethodValue;
                $body.map(StoredValue::VerificationMethod)
            }
        }
    };
}

fn json_value(syntax: SettingSyntax, json: &Value) -> Result<StoredValue, ValueError> {
    by_syntax!(syntax, T => T::from_json(json))
}

fn xml_value(
    syntax: SettingSyntax,
    element: &XmlElement,
    ctx: &XmlInputContext<'_>,
) -> Result<StoredValue, ValueError> {
    by_syntax!(syntax, T => T::from_xml(element, ctx))
}
