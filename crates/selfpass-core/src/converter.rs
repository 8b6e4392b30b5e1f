//! Typed accessors over [`StoredValue`].
//!
//! Each function expects one variant and returns its native form. Asking
//! for the wrong type is a caller bug and is reported as
//! [`ValueError::TypeMismatch`].

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ValueError;
use crate::value::{
    ActionConfiguration, ChallengeItemConfiguration, CustomLinkConfiguration, EmailItem,
    FileContent, FileInformation, FormConfiguration, NamedSecretData, PrivateKeyCertificate,
    RemoteWebServiceConfiguration, SecretString, StoredValue, StoredValueKind, UserPermission,
    VerificationMethodSettings,
};

fn mismatch(expected: &'static str, value: &StoredValue) -> ValueError {
    ValueError::TypeMismatch {
        expected,
        actual: value.variant_name(),
    }
}

macro_rules! accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $expected:literal, $native:ty) => {
        $(#[$doc])*
        ///
        /// # Errors
        ///
        #[doc = concat!("Returns [`ValueError::TypeMismatch`] unless the value is a `", $expected, "`.")]
        pub fn $name(value: &StoredValue) -> Result<$native, ValueError> {
            match value {
                StoredValue::$variant(v) => Ok(v.to_native()),
                other => Err(mismatch($expected, other)),
            }
        }
    };
}

accessor!(value_to_string, String, "StringValue", String);
accessor!(value_to_bool, Boolean, "BooleanValue", bool);
accessor!(
    /// Numbers and durations (whole seconds).
    value_to_long,
    Numeric,
    "NumericValue",
    i64
);
accessor!(value_to_long_array, NumericArray, "NumericArrayValue", Vec<i64>);
accessor!(value_to_string_array, StringArray, "StringArrayValue", Vec<String>);
accessor!(value_to_option_list, OptionList, "OptionListValue", BTreeSet<String>);
accessor!(value_to_password, Password, "PasswordValue", SecretString);
accessor!(
    value_to_named_secrets,
    NamedSecret,
    "NamedSecretValue",
    BTreeMap<String, NamedSecretData>
);
accessor!(value_to_form, Form, "FormValue", Vec<FormConfiguration>);
accessor!(value_to_action, Action, "ActionValue", Vec<ActionConfiguration>);
accessor!(value_to_email, Email, "EmailValue", BTreeMap<String, EmailItem>);
accessor!(
    value_to_challenges,
    Challenge,
    "ChallengeValue",
    BTreeMap<String, Vec<ChallengeItemConfiguration>>
);
accessor!(
    /// DER bytes of each certificate.
    value_to_certificates,
    X509Certificate,
    "X509CertificateValue",
    Vec<Vec<u8>>
);
accessor!(
    value_to_private_key,
    PrivateKey,
    "PrivateKeyValue",
    Option<PrivateKeyCertificate>
);
accessor!(
    value_to_files,
    File,
    "FileValue",
    BTreeMap<FileInformation, FileContent>
);
accessor!(value_to_permissions, UserPermission, "UserPermissionValue", Vec<UserPermission>);
accessor!(
    value_to_web_services,
    RemoteWebService,
    "RemoteWebServiceValue",
    Vec<RemoteWebServiceConfiguration>
);
accessor!(
    value_to_custom_links,
    CustomLink,
    "CustomLinkValue",
    Vec<CustomLinkConfiguration>
);
accessor!(
    value_to_verification_methods,
    VerificationMethod,
    "VerificationMethodValue",
    VerificationMethodSettings
);

/// The text of a localized string for `locale`.
///
/// # Errors
///
/// Returns [`ValueError::TypeMismatch`] unless the value is a `LocalizedStringValue`.
pub fn value_to_localized_string(value: &StoredValue, locale: &str) -> Result<String, ValueError> {
    match value {
        StoredValue::LocalizedString(v) => {
            Ok(localized(&v.to_native(), locale).cloned().unwrap_or_default())
        }
        other => Err(mismatch("LocalizedStringValue", other)),
    }
}

/// The entries of a localized string array for `locale`.
///
/// # Errors
///
/// Returns [`ValueError::TypeMismatch`] unless the value is a `LocalizedStringArrayValue`.
pub fn value_to_localized_string_array(
    value: &StoredValue,
    locale: &str,
) -> Result<Vec<String>, ValueError> {
    match value {
        StoredValue::LocalizedStringArray(v) => {
            Ok(localized(&v.to_native(), locale).cloned().unwrap_or_default())
        }
        other => Err(mismatch("LocalizedStringArrayValue", other)),
    }
}

/// Pick the entry for `locale`: exact match, then its language
/// (`fr_CA` and `fr-CA` fall back to `fr`), then the default locale `""`.
pub fn localized<'a, T>(map: &'a BTreeMap<String, T>, locale: &str) -> Option<&'a T> {
    if let Some(hit) = map.get(locale) {
        return Some(hit);
    }
    let language = locale.split(['_', '-']).next().unwrap_or_default();
    map.iter()
        .find(|(k, _)| !language.is_empty() && k.eq_ignore_ascii_case(language))
        .map(|(_, v)| v)
        .or_else(|| map.get(""))
}
