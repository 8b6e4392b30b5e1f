//! Setting definitions and the catalog of settings the server consumes.
//!
//! A [`Setting`] describes one configuration key: its [`SettingSyntax`]
//! (which selects the stored-value type), flags that alter validation and
//! normalization, and the default value as JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The declared type of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingSyntax {
    String,
    TextArea,
    StringArray,
    LocalizedString,
    LocalizedTextArea,
    LocalizedStringArray,
    Password,
    NamedSecret,
    Numeric,
    Duration,
    NumericArray,
    Boolean,
    Select,
    #[serde(rename = "OPTIONLIST")]
    OptionList,
    Form,
    Action,
    Email,
    Challenge,
    #[serde(rename = "X509CERT")]
    X509Cert,
    PrivateKey,
    File,
    UserPermission,
    #[serde(rename = "CUSTOMLINKS")]
    CustomLinks,
    RemoteWebService,
    VerificationMethod,
}

impl SettingSyntax {
    pub const ALL: [Self; 25] = [
        Self::String,
        Self::TextArea,
        Self::StringArray,
        Self::LocalizedString,
        Self::LocalizedTextArea,
        Self::LocalizedStringArray,
        Self::Password,
        Self::NamedSecret,
        Self::Numeric,
        Self::Duration,
        Self::NumericArray,
        Self::Boolean,
        Self::Select,
        Self::OptionList,
        Self::Form,
        Self::Action,
        Self::Email,
        Self::Challenge,
        Self::X509Cert,
        Self::PrivateKey,
        Self::File,
        Self::UserPermission,
        Self::CustomLinks,
        Self::RemoteWebService,
        Self::VerificationMethod,
    ];

    /// The name written in the `syntax` attribute of a `<setting>` element.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::TextArea => "TEXT_AREA",
            Self::StringArray => "STRING_ARRAY",
            Self::LocalizedString => "LOCALIZED_STRING",
            Self::LocalizedTextArea => "LOCALIZED_TEXT_AREA",
            Self::LocalizedStringArray => "LOCALIZED_STRING_ARRAY",
            Self::Password => "PASSWORD",
            Self::NamedSecret => "NAMED_SECRET",
            Self::Numeric => "NUMERIC",
            Self::Duration => "DURATION",
            Self::NumericArray => "NUMERIC_ARRAY",
            Self::Boolean => "BOOLEAN",
            Self::Select => "SELECT",
            Self::OptionList => "OPTIONLIST",
            Self::Form => "FORM",
            Self::Action => "ACTION",
            Self::Email => "EMAIL",
            Self::Challenge => "CHALLENGE",
            Self::X509Cert => "X509CERT",
            Self::PrivateKey => "PRIVATE_KEY",
            Self::File => "FILE",
            Self::UserPermission => "USER_PERMISSION",
            Self::CustomLinks => "CUSTOMLINKS",
            Self::RemoteWebService => "REMOTE_WEB_SERVICE",
            Self::VerificationMethod => "VERIFICATION_METHOD",
        }
    }
}

impl fmt::Display for SettingSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingSyntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|syntax| syntax.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown setting syntax '{s}'"))
    }
}

/// Flags altering validation or normalization of a setting's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingFlag {
    /// String arrays are stored sorted.
    Sorted,
    /// String values must look like an email address.
    EmailSyntax,
    /// The setting has no meaningful default; an unset value is reported as missing.
    NoDefault,
    /// The value is a credential and is never shown in debug output.
    Sensitive,
}

/// Definition of one configuration setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    pub key: &'static str,
    pub label: &'static str,
    pub syntax: SettingSyntax,
    pub flags: &'static [SettingFlag],
    pub required: bool,
    /// Regex that every string value must match in full.
    pub pattern: Option<&'static str>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    /// Allowed values for `SELECT` and `OPTIONLIST` settings.
    pub options: &'static [&'static str],
    /// Default value in the JSON form of the syntax's stored value.
    pub default_json: Option<&'static str>,
}

impl Setting {
    #[must_use]
    pub const fn new(key: &'static str, syntax: SettingSyntax) -> Self {
        Self {
            key,
            label: key,
            syntax,
            flags: &[],
            required: false,
            pattern: None,
            minimum: None,
            maximum: None,
            options: &[],
            default_json: None,
        }
    }

    #[must_use]
    pub const fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    #[must_use]
    pub const fn flags(mut self, flags: &'static [SettingFlag]) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    #[must_use]
    pub const fn range(mut self, minimum: Option<i64>, maximum: Option<i64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    #[must_use]
    pub const fn options(mut self, options: &'static [&'static str]) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn default_json(mut self, json: &'static str) -> Self {
        self.default_json = Some(json);
        self
    }

    #[must_use]
    pub fn has_flag(&self, flag: SettingFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Settings read by the server, keyed by their document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    ApplicationTitle,
    SecurityCspHeader,
    SecurityPreventFraming,
    BasicAuthEnable,
    SsoAuthHeaderName,
    CasLoginUrl,
    OAuthLoginUrl,
    AuthenticationMethods,
    SessionVerificationEnable,
    IdleTimeoutSeconds,
    ConfigPersistentLoginSeconds,
    IntruderConfigMaxAttempts,
    IntruderConfigResetTime,
    ChallengeForceSetup,
    OtpForceSetup,
    UpdateProfileForceSetup,
    ExpiredPasswordEnable,
    CustomLinks,
}

/// Authentication strategies, in the order accepted by
/// [`SettingKey::AuthenticationMethods`].
pub const AUTHENTICATION_METHODS: &[&str] = &["BASIC_AUTH", "SSO_HEADER", "CAS", "OAUTH"];

const APPLICATION_TITLE: Setting = Setting::new("display.applicationTitle", SettingSyntax::LocalizedString)
    .label("Application Title")
    .required()
    .default_json(r#"{"": "Password Self Service"}"#);

const SECURITY_CSP_HEADER: Setting = Setting::new("security.cspHeader", SettingSyntax::String)
    .label("Content Security Policy Header")
    .default_json(
        r#""default-src 'self'; script-src 'self' 'nonce-%NONCE%'; object-src 'none'; frame-ancestors 'none'""#,
    );

const SECURITY_PREVENT_FRAMING: Setting = Setting::new("security.preventFraming", SettingSyntax::Boolean)
    .label("Prevent Framing")
    .default_json("true");

const BASIC_AUTH_ENABLE: Setting = Setting::new("security.basicAuth.enable", SettingSyntax::Boolean)
    .label("Enable Basic Authentication")
    .default_json("true");

const SSO_AUTH_HEADER_NAME: Setting = Setting::new("security.sso.authHeaderName", SettingSyntax::String)
    .label("SSO Authentication Header Name")
    .pattern("[A-Za-z0-9-]*")
    .default_json(r#""""#);

const CAS_LOGIN_URL: Setting = Setting::new("cas.loginURL", SettingSyntax::String)
    .label("CAS Login URL")
    .pattern("(https?://.+)?")
    .default_json(r#""""#);

const OAUTH_LOGIN_URL: Setting = Setting::new("oauth.loginURL", SettingSyntax::String)
    .label("OAuth Login URL")
    .pattern("(https?://.+)?")
    .default_json(r#""""#);

const AUTHENTICATION_METHODS_SETTING: Setting =
    Setting::new("security.authenticationMethods", SettingSyntax::StringArray)
        .label("Authentication Methods")
        .pattern("BASIC_AUTH|SSO_HEADER|CAS|OAUTH")
        .default_json(r#"["BASIC_AUTH", "SSO_HEADER", "CAS", "OAUTH"]"#);

const SESSION_VERIFICATION_ENABLE: Setting =
    Setting::new("session.verification.enable", SettingSyntax::Boolean)
        .label("Enable Session Verification")
        .default_json("true");

const IDLE_TIMEOUT_SECONDS: Setting = Setting::new("idleTimeoutSeconds", SettingSyntax::Duration)
    .label("Idle Timeout Seconds")
    .required()
    .range(Some(60), Some(86_400))
    .default_json("900");

const CONFIG_PERSISTENT_LOGIN_SECONDS: Setting =
    Setting::new("configManager.persistentLogin.seconds", SettingSyntax::Duration)
        .label("Persistent Configuration Login Seconds")
        .range(Some(0), Some(2_592_000))
        .default_json("3600");

const INTRUDER_CONFIG_MAX_ATTEMPTS: Setting =
    Setting::new("intruder.config.maxAttempts", SettingSyntax::Numeric)
        .label("Configuration Login Maximum Attempts")
        .required()
        .range(Some(1), Some(1000))
        .default_json("5");

const INTRUDER_CONFIG_RESET_TIME: Setting =
    Setting::new("intruder.config.resetTime", SettingSyntax::Duration)
        .label("Configuration Login Lockout Seconds")
        .range(Some(1), Some(86_400))
        .default_json("300");

const CHALLENGE_FORCE_SETUP: Setting = Setting::new("challenge.forceSetup", SettingSyntax::Boolean)
    .label("Force Response Setup")
    .default_json("false");

const OTP_FORCE_SETUP: Setting = Setting::new("otp.forceSetup", SettingSyntax::Boolean)
    .label("Force OTP Setup")
    .default_json("false");

const UPDATE_PROFILE_FORCE_SETUP: Setting =
    Setting::new("updateAttributes.forceSetup", SettingSyntax::Boolean)
        .label("Force Profile Update")
        .default_json("false");

const EXPIRED_PASSWORD_ENABLE: Setting =
    Setting::new("expiredPassword.enable", SettingSyntax::Boolean)
        .label("Require Change of Expired Passwords")
        .default_json("true");

const CUSTOM_LINKS: Setting = Setting::new("display.customLinks", SettingSyntax::CustomLinks)
    .label("Custom Links");

impl SettingKey {
    pub const ALL: [Self; 18] = [
        Self::ApplicationTitle,
        Self::SecurityCspHeader,
        Self::SecurityPreventFraming,
        Self::BasicAuthEnable,
        Self::SsoAuthHeaderName,
        Self::CasLoginUrl,
        Self::OAuthLoginUrl,
        Self::AuthenticationMethods,
        Self::SessionVerificationEnable,
        Self::IdleTimeoutSeconds,
        Self::ConfigPersistentLoginSeconds,
        Self::IntruderConfigMaxAttempts,
        Self::IntruderConfigResetTime,
        Self::ChallengeForceSetup,
        Self::OtpForceSetup,
        Self::UpdateProfileForceSetup,
        Self::ExpiredPasswordEnable,
        Self::CustomLinks,
    ];

    #[must_use]
    pub fn setting(self) -> &'static Setting {
        match self {
            Self::ApplicationTitle => &APPLICATION_TITLE,
            Self::SecurityCspHeader => &SECURITY_CSP_HEADER,
            Self::SecurityPreventFraming => &SECURITY_PREVENT_FRAMING,
            Self::BasicAuthEnable => &BASIC_AUTH_ENABLE,
            Self::SsoAuthHeaderName => &SSO_AUTH_HEADER_NAME,
            Self::CasLoginUrl => &CAS_LOGIN_URL,
            Self::OAuthLoginUrl => &OAUTH_LOGIN_URL,
            Self::AuthenticationMethods => &AUTHENTICATION_METHODS_SETTING,
            Self::SessionVerificationEnable => &SESSION_VERIFICATION_ENABLE,
            Self::IdleTimeoutSeconds => &IDLE_TIMEOUT_SECONDS,
            Self::ConfigPersistentLoginSeconds => &CONFIG_PERSISTENT_LOGIN_SECONDS,
            Self::IntruderConfigMaxAttempts => &INTRUDER_CONFIG_MAX_ATTEMPTS,
            Self::IntruderConfigResetTime => &INTRUDER_CONFIG_RESET_TIME,
            Self::ChallengeForceSetup => &CHALLENGE_FORCE_SETUP,
            Self::OtpForceSetup => &OTP_FORCE_SETUP,
            Self::UpdateProfileForceSetup => &UPDATE_PROFILE_FORCE_SETUP,
            Self::ExpiredPasswordEnable => &EXPIRED_PASSWORD_ENABLE,
            Self::CustomLinks => &CUSTOM_LINKS,
        }
    }

    /// The document key, e.g. `session.verification.enable`.
    #[must_use]
    pub fn key(self) -> &'static str {
        self.setting().key
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn syntax_names_roundtrip() {
        for syntax in SettingSyntax::ALL {
            assert_eq!(syntax.as_str().parse::<SettingSyntax>().unwrap(), syntax);
            let json = serde_json::to_string(&syntax).unwrap();
            assert_eq!(json, format!("\"{}\"", syntax.as_str()));
        }
        assert!("NOPE".parse::<SettingSyntax>().is_err());
    }

    #[test]
    fn catalog_keys_are_unique_and_resolvable() {
        let mut keys: Vec<&str> = SettingKey::ALL.iter().map(|k| k.key()).collect();
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::from_key(key.key()), Some(key));
        }
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), SettingKey::ALL.len());
        assert_eq!(SettingKey::from_key("no.such.setting"), None);
    }

    #[test]
    fn catalog_defaults_are_valid_json() {
        for key in SettingKey::ALL {
            if let Some(json) = key.setting().default_json {
                serde_json::from_str::<serde_json::Value>(json).unwrap();
            }
        }
    }

    #[test]
    fn builder_sets_fields() {
        const S: Setting = Setting::new("x", SettingSyntax::StringArray)
            .flags(&[SettingFlag::Sorted])
            .required()
            .range(Some(1), None);
        assert!(S.has_flag(SettingFlag::Sorted));
        assert!(!S.has_flag(SettingFlag::Sensitive));
        assert!(S.required);
        assert_eq!(S.minimum, Some(1));
        assert_eq!(S.label, "x");
    }
}
