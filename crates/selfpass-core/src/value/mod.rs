//! Typed configuration values.
//!
//! Each setting syntax has a value type implementing [`StoredValueKind`]:
//! conversion to and from the `<setting>` XML element and the JSON form, a
//! native representation for application code, validation against the
//! [`Setting`] definition, and redacted debug output. [`StoredValue`] is the
//! sum type over all of them.
//!
//! Values are immutable. Collections are copied in on construction and a
//! setting is changed by replacing its whole value.

mod action;
mod array;
mod certificate;
mod challenge;
mod email;
mod file;
mod form;
mod link;
mod localized;
mod permission;
mod scalar;
mod secret;
mod verification;
mod webservice;

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto::{self, SecurityKey};
use crate::encoder::{self, EncodingMode};
use crate::error::ValueError;
use crate::setting::{Setting, SettingFlag};
use crate::util;
use crate::xml::XmlElement;

pub use action::{ActionConfiguration, ActionValue, LdapAction, LdapMethod, WebAction, WebMethod};
pub use array::{NumericArrayValue, OptionListValue, StringArrayValue};
pub use certificate::{PrivateKeyCertificate, PrivateKeyValue, X509CertificateValue};
pub use challenge::{ChallengeItemConfiguration, ChallengeValue};
pub use email::{EmailItem, EmailValue};
pub use file::{FileContent, FileInformation, FileValue};
pub use form::{FormConfiguration, FormItemType, FormValue};
pub use link::{CustomLinkConfiguration, CustomLinkValue};
pub use localized::{LocalizedStringArrayValue, LocalizedStringValue};
pub use permission::{UserPermission, UserPermissionType, UserPermissionValue};
pub use scalar::{BooleanValue, NumericValue, StringValue};
pub use secret::{NamedSecretData, NamedSecretValue, PasswordValue, SecretString};
pub use verification::{
    VerificationMethod, VerificationMethodEnforcement, VerificationMethodSettings,
    VerificationMethodValue,
};
pub use webservice::{RemoteWebServiceConfiguration, RemoteWebServiceValue};

pub use crate::encoder::REDACTED;

/// Longest text accepted in a single string value or email body.
pub const MAX_TEXT_LENGTH: usize = 500_000;

/// Key used only to build the canonical form hashed by [`StoredValueKind::value_hash`].
/// Secrets are written in `Plain` mode there, so it never encrypts anything.
const HASHING_KEY: [u8; 32] = *b"selfpass-value-hash-context-0001";

static EMAIL_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Inputs needed to read values out of the document.
#[derive(Debug, Clone, Copy)]
pub struct XmlInputContext<'a> {
    pub key: &'a SecurityKey,
    /// Mode assumed for secrets written without a prefix.
    pub legacy_mode: EncodingMode,
}

impl<'a> XmlInputContext<'a> {
    #[must_use]
    pub fn new(key: &'a SecurityKey) -> Self {
        Self {
            key,
            legacy_mode: EncodingMode::ConfigPw,
        }
    }

    /// # Errors
    ///
    /// Returns [`ValueError::Encoder`] if the stored secret cannot be decoded.
    pub fn decode_secret(&self, stored: &str) -> Result<String, ValueError> {
        Ok(encoder::decode(stored, self.legacy_mode, self.key)?)
    }
}

/// Inputs needed to write values into the document.
#[derive(Debug, Clone, Copy)]
pub struct XmlOutputContext<'a> {
    pub key: &'a SecurityKey,
    /// Mode applied to every secret written.
    pub mode: EncodingMode,
}

impl<'a> XmlOutputContext<'a> {
    #[must_use]
    pub fn new(key: &'a SecurityKey, mode: EncodingMode) -> Self {
        Self { key, mode }
    }

    /// # Errors
    ///
    /// Returns [`ValueError::Encoder`] if encryption fails.
    pub fn encode_secret(&self, plain: &str) -> Result<String, ValueError> {
        Ok(encoder::encode(plain, self.mode, self.key)?)
    }
}

/// Behavior shared by every value type.
pub trait StoredValueKind: Sized {
    /// Plain-data form handed to application code.
    type Native;

    /// Version of the on-disk encoding written by this type.
    const SYNTAX_VERSION: u32 = 0;

    /// Build from the JSON form. `null` yields the empty value.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] if the JSON does not have the expected shape.
    fn from_json(json: &serde_json::Value) -> Result<Self, ValueError>;

    /// Build from a `<setting>` element holding `<value>` children.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] if a child cannot be parsed or a secret cannot
    /// be decoded.
    fn from_xml(setting: &XmlElement, ctx: &XmlInputContext<'_>) -> Result<Self, ValueError>;

    /// Serialize into elements named `element_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] if a secret cannot be encoded.
    fn to_xml_values(
        &self,
        element_name: &str,
        ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError>;

    fn to_native(&self) -> Self::Native;

    /// The JSON form accepted by [`StoredValueKind::from_json`]. Secrets are
    /// in plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Malformed`] if serialization fails.
    fn to_json(&self) -> Result<serde_json::Value, ValueError>;

    /// Human-readable problems with this value; empty when valid.
    fn validate(&self, setting: &Setting) -> Vec<String>;

    /// One-line rendering for logs with secrets replaced by [`REDACTED`].
    fn to_debug_string(&self) -> String;

    /// JSON rendering with secrets replaced by [`REDACTED`].
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Malformed`] if serialization fails.
    fn to_debug_json(&self) -> Result<serde_json::Value, ValueError> {
        self.to_json()
    }

    /// `true` when the value was read from an older syntax version and the
    /// document should rewrite it on next save.
    fn needs_xml_update(&self) -> bool {
        false
    }

    /// Lowercase hex SHA-512 of the value's canonical XML.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] if the value cannot be serialized.
    fn value_hash(&self) -> Result<String, ValueError> {
        let key = SecurityKey::from_bytes(HASHING_KEY);
        let ctx = XmlOutputContext::new(&key, EncodingMode::Plain);
        let mut holder = XmlElement::new("value-hash");
        holder.attach_all(self.to_xml_values("value", &ctx)?);
        Ok(crypto::sha512_hex(holder.to_canonical_string()?.as_bytes()))
    }
}

/// A value of any syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    String(StringValue),
    StringArray(StringArrayValue),
    Boolean(BooleanValue),
    Numeric(NumericValue),
    NumericArray(NumericArrayValue),
    OptionList(OptionListValue),
    LocalizedString(LocalizedStringValue),
    LocalizedStringArray(LocalizedStringArrayValue),
    Password(PasswordValue),
    NamedSecret(NamedSecretValue),
    Form(FormValue),
    Action(ActionValue),
    Email(EmailValue),
    Challenge(ChallengeValue),
    X509Certificate(X509CertificateValue),
    PrivateKey(PrivateKeyValue),
    File(FileValue),
    UserPermission(UserPermissionValue),
    RemoteWebService(RemoteWebServiceValue),
    CustomLink(CustomLinkValue),
    VerificationMethod(VerificationMethodValue),
}

macro_rules! dispatch {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            StoredValue::String($v) => $body,
            StoredValue::StringArray($v) => $body,
            StoredValue::Boolean($v) => $body,
            StoredValue::Numeric($v) => $body,
            StoredValue::NumericArray($v) => $body,
            StoredValue::OptionList($v) => $body,
            StoredValue::LocalizedString($v) => $body,
            StoredValue::LocalizedStringArray($v) => $body,
            StoredValue::Password($v) => $body,
            StoredValue::NamedSecret($v) => $body,
            StoredValue::Form($v) => $body,
            StoredValue::Action($v) => $body,
            StoredValue::Email($v) => $body,
            StoredValue::Challenge($v) => $body,
            StoredValue::X509Certificate($v) => $body,
            StoredValue::PrivateKey($v) => $body,
            StoredValue::File($v) => $body,
            StoredValue::UserPermission($v) => $body,
            StoredValue::RemoteWebService($v) => $body,
            StoredValue::CustomLink($v) => $body,
            StoredValue::VerificationMethod($v) => $body,
        }
    };
}

macro_rules! syntax_version_of {
    ($self:expr, $($variant:ident => $ty:ty),+ $(,)?) => {
        match $self {
            $(StoredValue::$variant(_) => <$ty as StoredValueKind>::SYNTAX_VERSION,)+
        }
    };
}

impl StoredValue {
    /// Name of the variant, used in type-mismatch errors.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::String(_) => "StringValue",
            Self::StringArray(_) => "StringArrayValue",
            Self::Boolean(_) => "BooleanValue",
            Self::Numeric(_) => "NumericValue",
            Self::NumericArray(_) => "NumericArrayValue",
            Self::OptionList(_) => "OptionListValue",
            Self::LocalizedString(_) => "LocalizedStringValue",
            Self::LocalizedStringArray(_) => "LocalizedStringArrayValue",
            Self::Password(_) => "PasswordValue",
            Self::NamedSecret(_) => "NamedSecretValue",
            Self::Form(_) => "FormValue",
            Self::Action(_) => "ActionValue",
            Self::Email(_) => "EmailValue",
            Self::Challenge(_) => "ChallengeValue",
            Self::X509Certificate(_) => "X509CertificateValue",
            Self::PrivateKey(_) => "PrivateKeyValue",
            Self::File(_) => "FileValue",
            Self::UserPermission(_) => "UserPermissionValue",
            Self::RemoteWebService(_) => "RemoteWebServiceValue",
            Self::CustomLink(_) => "CustomLinkValue",
            Self::VerificationMethod(_) => "VerificationMethodValue",
        }
    }

    #[must_use]
    pub fn syntax_version(&self) -> u32 {
        syntax_version_of!(self,
            String => StringValue,
            StringArray => StringArrayValue,
            Boolean => BooleanValue,
            Numeric => NumericValue,
            NumericArray => NumericArrayValue,
            OptionList => OptionListValue,
            LocalizedString => LocalizedStringValue,
            LocalizedStringArray => LocalizedStringArrayValue,
            Password => PasswordValue,
            NamedSecret => NamedSecretValue,
            Form => FormValue,
            Action => ActionValue,
            Email => EmailValue,
            Challenge => ChallengeValue,
            X509Certificate => X509CertificateValue,
            PrivateKey => PrivateKeyValue,
            File => FileValue,
            UserPermission => UserPermissionValue,
            RemoteWebService => RemoteWebServiceValue,
            CustomLink => CustomLinkValue,
            VerificationMethod => VerificationMethodValue,
        )
    }

    /// # Errors
    ///
    /// Returns [`ValueError`] if a secret cannot be encoded.
    pub fn to_xml_values(
        &self,
        element_name: &str,
        ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        dispatch!(self, v => v.to_xml_values(element_name, ctx))
    }

    /// # Errors
    ///
    /// Returns [`ValueError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        dispatch!(self, v => v.to_json())
    }

    #[must_use]
    pub fn validate(&self, setting: &Setting) -> Vec<String> {
        dispatch!(self, v => v.validate(setting))
    }

    #[must_use]
    pub fn to_debug_string(&self) -> String {
        dispatch!(self, v => v.to_debug_string())
    }

    /// # Errors
    ///
    /// Returns [`ValueError::Malformed`] if serialization fails.
    pub fn to_debug_json(&self) -> Result<serde_json::Value, ValueError> {
        dispatch!(self, v => v.to_debug_json())
    }

    #[must_use]
    pub fn needs_xml_update(&self) -> bool {
        dispatch!(self, v => v.needs_xml_update())
    }

    /// # Errors
    ///
    /// Returns [`ValueError`] if the value cannot be serialized.
    pub fn value_hash(&self) -> Result<String, ValueError> {
        dispatch!(self, v => v.value_hash())
    }
}

// ---------------------------------------------------------------------------
// Shared helpers for the variant modules
// ---------------------------------------------------------------------------

/// The `<value>` children of a setting element.
fn value_elements(setting: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    setting.children_named("value")
}

/// The `locale` attribute of a value element; absent means the default locale `""`.
fn locale_of(element: &XmlElement) -> String {
    element.attribute("locale").unwrap_or_default().to_owned()
}

/// The `syntaxVersion` attribute of a setting element; absent or unparseable means 0.
fn syntax_version_attr(setting: &XmlElement) -> u32 {
    setting
        .attribute("syntaxVersion")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn text_element(name: &str, text: impl Into<String>) -> XmlElement {
    XmlElement::new(name).with_text(text)
}

/// Parse the JSON text of every `<value>` child.
fn json_values<T: DeserializeOwned>(setting: &XmlElement) -> Result<Vec<T>, ValueError> {
    value_elements(setting)
        .filter(|el| !util::is_blank(el.text()))
        .map(|el| crate::json::from_str(el.text()))
        .collect()
}

/// One element per item with the item's compact JSON as text.
fn json_elements<T: Serialize>(name: &str, items: &[T]) -> Result<Vec<XmlElement>, ValueError> {
    items
        .iter()
        .map(|item| Ok(text_element(name, crate::json::to_compact(item)?)))
        .collect()
}

/// Deserialize `json`, treating `null` as the type's default.
fn from_json_or_default<T: DeserializeOwned + Default>(
    json: &serde_json::Value,
) -> Result<T, ValueError> {
    if json.is_null() {
        Ok(T::default())
    } else {
        crate::json::from_value(json)
    }
}

fn required_missing(setting: &Setting) -> String {
    format!("{} is required", setting.label)
}

/// Pattern, email-shape and length checks for a single string.
fn validate_text(setting: &Setting, text: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if text.chars().count() > MAX_TEXT_LENGTH {
        errors.push(format!(
            "{} exceeds the maximum length of {MAX_TEXT_LENGTH} characters",
            setting.label
        ));
    }
    if text.is_empty() {
        return errors;
    }
    if let Some(pattern) = setting.pattern {
        match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(re) if !re.is_match(text) => {
                errors.push(format!("{} value '{text}' does not match the required format", setting.label));
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("{} has an invalid pattern: {e}", setting.label)),
        }
    }
    if setting.has_flag(SettingFlag::EmailSyntax)
        && !EMAIL_SHAPE.as_ref().is_some_and(|re| re.is_match(text))
    {
        errors.push(format!("{} value '{text}' is not a valid email address", setting.label));
    }
    errors
}

/// Blank names and case-insensitive duplicates among named items.
fn validate_names<'a>(kind: &str, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut errors: Vec<String> = names
        .iter()
        .filter(|n| util::is_blank(n))
        .map(|_| format!("{kind} name must not be blank"))
        .take(1)
        .collect();
    errors.extend(
        util::case_insensitive_duplicates(names.iter().copied())
            .into_iter()
            .map(|dup| format!("{kind} name '{dup}' is used more than once")),
    );
    errors
}

fn validate_url(kind: &str, name: &str, raw: &str) -> Option<String> {
    url::Url::parse(raw)
        .err()
        .map(|e| format!("{kind} '{name}' has an invalid url '{raw}': {e}"))
}

fn validate_range(setting: &Setting, n: i64) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(min) = setting.minimum.filter(|min| n < *min) {
        errors.push(format!("{} value {n} is below the minimum of {min}", setting.label));
    }
    if let Some(max) = setting.maximum.filter(|max| n > *max) {
        errors.push(format!("{} value {n} is above the maximum of {max}", setting.label));
    }
    errors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use super::*;

    pub fn key() -> SecurityKey {
        SecurityKey::from_passphrase("value-tests").unwrap()
    }

    /// Serialize into a `<setting>` element with `mode` and read it back.
    pub fn xml_roundtrip<T: StoredValueKind>(value: &T, mode: EncodingMode) -> T {
        let key = key();
        let out = XmlOutputContext::new(&key, mode);
        let mut setting = XmlElement::new("setting")
            .with_attribute("syntaxVersion", T::SYNTAX_VERSION.to_string());
        setting.attach_all(value.to_xml_values("value", &out).unwrap());
        // through text, as the document would be
        let text = crate::xml::XmlDocument::from_root(setting).to_pretty_string().unwrap();
        let parsed = crate::xml::XmlDocument::parse(&text).unwrap();
        T::from_xml(parsed.root(), &XmlInputContext::new(&key)).unwrap()
    }

    pub fn parse_setting(xml: &str) -> XmlElement {
        crate::xml::XmlDocument::parse(xml).unwrap().into_root()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::setting::SettingSyntax;

    #[test]
    fn boolean_hash_is_digit() {
        let t = StoredValue::Boolean(BooleanValue::new(true));
        let f = StoredValue::Boolean(BooleanValue::new(false));
        assert_eq!(t.value_hash().unwrap(), "1");
        assert_eq!(f.value_hash().unwrap(), "0");
    }

    #[test]
    fn value_hash_is_stable_hex_sha512() {
        let a = StoredValue::String(StringValue::new("hello"));
        let b = StoredValue::String(StringValue::new("hello"));
        let c = StoredValue::String(StringValue::new("world"));
        let hash = a.value_hash().unwrap();
        assert_eq!(hash.len(), 128);
        assert_eq!(hash, b.value_hash().unwrap());
        assert_ne!(hash, c.value_hash().unwrap());
    }

    #[test]
    fn password_hash_is_deterministic() {
        let a = StoredValue::Password(PasswordValue::new("s3cret"));
        assert_eq!(a.value_hash().unwrap(), a.value_hash().unwrap());
    }

    #[test]
    fn validate_text_checks_pattern_and_email() {
        const S: Setting = Setting::new("mail", SettingSyntax::String)
            .flags(&[SettingFlag::EmailSyntax])
            .pattern("[a-z@.]+");
        assert!(validate_text(&S, "a@b.io").is_empty());
        assert_eq!(validate_text(&S, "nope").len(), 1);
        assert_eq!(validate_text(&S, "UPPER").len(), 2);
        assert!(validate_text(&S, "").is_empty());
    }

    #[test]
    fn validate_names_reports_blank_and_duplicates() {
        let errors = validate_names("action", ["Notify", "", "notify"]);
        assert_eq!(errors.len(), 2);
        assert!(errors[1].contains("notify"));
    }

    #[test]
    fn variant_metadata() {
        let v = StoredValue::Action(ActionValue::default());
        assert_eq!(v.variant_name(), "ActionValue");
        assert_eq!(v.syntax_version(), 2);
        assert_eq!(StoredValue::Numeric(NumericValue::new(1)).syntax_version(), 0);
    }
}
