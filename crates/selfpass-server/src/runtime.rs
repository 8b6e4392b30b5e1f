//! Settings snapshot read by the filter chain.
//!
//! Rebuilt from the stored configuration at startup and after every save,
//! so filters never touch the XML document on the request path.

use std::str::FromStr;

use serde::Serialize;

use selfpass_core::converter;
use selfpass_core::error::ConfigError;
use selfpass_core::setting::SettingKey;
use selfpass_core::time::TimeDuration;
use selfpass_core::value::CustomLinkConfiguration;
use selfpass_core::{StoredConfiguration, StoredValue};

/// Lifecycle state of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationMode {
    /// No configuration password has been set yet.
    New,
    /// The configuration is editable.
    Configuration,
    /// The configuration is locked.
    Running,
    /// The configuration could not be loaded.
    Error,
}

/// Authentication strategies tried for unauthenticated private requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMethod {
    BasicAuth,
    SsoHeader,
    Cas,
    #[serde(rename = "OAUTH")]
    OAuth,
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BASIC_AUTH" => Ok(Self::BasicAuth),
            "SSO_HEADER" => Ok(Self::SsoHeader),
            "CAS" => Ok(Self::Cas),
            "OAUTH" => Ok(Self::OAuth),
            other => Err(format!("unknown authentication method '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub mode: ApplicationMode,
    title: StoredValue,
    /// CSP header template; `%NONCE%` is replaced per request.
    pub csp_header: String,
    pub prevent_framing: bool,
    pub basic_auth_enabled: bool,
    pub sso_header: Option<String>,
    pub cas_login_url: Option<String>,
    pub oauth_login_url: Option<String>,
    pub auth_methods: Vec<AuthMethod>,
    pub session_verification: bool,
    pub idle_timeout: TimeDuration,
    pub persistent_login: TimeDuration,
    pub intruder_max_attempts: u32,
    pub intruder_reset: TimeDuration,
    pub force_responses: bool,
    pub force_otp: bool,
    pub force_profile_update: bool,
    pub expired_password_enabled: bool,
    pub custom_links: Vec<CustomLinkConfiguration>,
    /// Hash of the configuration the snapshot was built from.
    pub config_hash: String,
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn seconds(value: i64) -> TimeDuration {
    TimeDuration::of_seconds(u64::try_from(value).unwrap_or(0))
}

impl RuntimeSettings {
    /// Build the snapshot. `failed` forces [`ApplicationMode::Error`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a setting cannot be read as its declared type.
    pub fn from_config(config: &StoredConfiguration, failed: bool) -> Result<Self, ConfigError> {
        let read = |key: SettingKey| config.read_setting(key);
        let boolean = |key: SettingKey| -> Result<bool, ConfigError> {
            Ok(converter::value_to_bool(&read(key)?)?)
        };
        let long = |key: SettingKey| -> Result<i64, ConfigError> {
            Ok(converter::value_to_long(&read(key)?)?)
        };
        let string = |key: SettingKey| -> Result<String, ConfigError> {
            Ok(converter::value_to_string(&read(key)?)?)
        };

        let mode = if failed {
            ApplicationMode::Error
        } else if !config.has_config_password() {
            ApplicationMode::New
        } else if config.is_locked() {
            ApplicationMode::Running
        } else {
            ApplicationMode::Configuration
        };

        let mut auth_methods = Vec::new();
        for name in converter::value_to_string_array(&read(SettingKey::AuthenticationMethods)?)? {
            match name.parse::<AuthMethod>() {
                Ok(method) if !auth_methods.contains(&method) => auth_methods.push(method),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "ignoring authentication method"),
            }
        }

        Ok(Self {
            mode,
            title: read(SettingKey::ApplicationTitle)?,
            csp_header: string(SettingKey::SecurityCspHeader)?,
            prevent_framing: boolean(SettingKey::SecurityPreventFraming)?,
            basic_auth_enabled: boolean(SettingKey::BasicAuthEnable)?,
            sso_header: non_blank(string(SettingKey::SsoAuthHeaderName)?),
            cas_login_url: non_blank(string(SettingKey::CasLoginUrl)?),
            oauth_login_url: non_blank(string(SettingKey::OAuthLoginUrl)?),
            auth_methods,
            session_verification: boolean(SettingKey::SessionVerificationEnable)?,
            idle_timeout: seconds(long(SettingKey::IdleTimeoutSeconds)?),
            persistent_login: seconds(long(SettingKey::ConfigPersistentLoginSeconds)?),
            intruder_max_attempts: u32::try_from(long(SettingKey::IntruderConfigMaxAttempts)?)
                .unwrap_or(u32::MAX),
            intruder_reset: seconds(long(SettingKey::IntruderConfigResetTime)?),
            force_responses: boolean(SettingKey::ChallengeForceSetup)?,
            force_otp: boolean(SettingKey::OtpForceSetup)?,
            force_profile_update: boolean(SettingKey::UpdateProfileForceSetup)?,
            expired_password_enabled: boolean(SettingKey::ExpiredPasswordEnable)?,
            custom_links: converter::value_to_custom_links(&read(SettingKey::CustomLinks)?)?,
            config_hash: config.config_hash()?,
        })
    }

    /// The application title for `locale`.
    #[must_use]
    pub fn title(&self, locale: &str) -> String {
        converter::value_to_localized_string(&self.title, locale).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use selfpass_core::SecurityKey;
    use selfpass_core::value::{LocalizedStringValue, StringArrayValue, StringValue};

    fn config() -> StoredConfiguration {
        StoredConfiguration::new_empty(SecurityKey::from_passphrase("runtime-tests").unwrap())
    }

    #[test]
    fn defaults_snapshot() {
        let runtime = RuntimeSettings::from_config(&config(), false).unwrap();
        assert_eq!(runtime.mode, ApplicationMode::New);
        assert_eq!(
            runtime.auth_methods,
            vec![AuthMethod::BasicAuth, AuthMethod::SsoHeader, AuthMethod::Cas, AuthMethod::OAuth]
        );
        assert_eq!(runtime.idle_timeout, TimeDuration::of_seconds(900));
        assert_eq!(runtime.intruder_max_attempts, 5);
        assert!(runtime.sso_header.is_none());
        assert!(runtime.csp_header.contains("%NONCE%"));
        assert_eq!(runtime.title("fr"), "Password Self Service");
    }

    #[test]
    fn mode_follows_password_and_lock() {
        let mut config = config();
        config.set_config_password("pw");
        assert_eq!(
            RuntimeSettings::from_config(&config, false).unwrap().mode,
            ApplicationMode::Configuration
        );
        config.write_property(selfpass_core::stored_config::PROPERTY_CONFIG_IS_EDITABLE, "false");
        assert_eq!(
            RuntimeSettings::from_config(&config, false).unwrap().mode,
            ApplicationMode::Running
        );
        assert_eq!(
            RuntimeSettings::from_config(&config, true).unwrap().mode,
            ApplicationMode::Error
        );
    }

    #[test]
    fn configured_values_flow_through() {
        let mut config = config();
        config
            .write_setting(
                SettingKey::AuthenticationMethods,
                StoredValue::StringArray(StringArrayValue::new(vec![
                    "SSO_HEADER".to_owned(),
                    "BASIC_AUTH".to_owned(),
                ])),
            )
            .unwrap();
        config
            .write_setting(
                SettingKey::SsoAuthHeaderName,
                StoredValue::String(StringValue::new("X-Remote-User")),
            )
            .unwrap();
        config
            .write_setting(
                SettingKey::ApplicationTitle,
                StoredValue::LocalizedString(LocalizedStringValue::new(
                    [
                        (String::new(), "Reset".to_owned()),
                        ("fr".to_owned(), "Réinitialiser".to_owned()),
                    ]
                    .into(),
                )),
            )
            .unwrap();

        let runtime = RuntimeSettings::from_config(&config, false).unwrap();
        assert_eq!(runtime.auth_methods, vec![AuthMethod::SsoHeader, AuthMethod::BasicAuth]);
        assert_eq!(runtime.sso_header.as_deref(), Some("X-Remote-User"));
        assert_eq!(runtime.title("fr_CA"), "Réinitialiser");
        assert_eq!(runtime.title("de"), "Reset");
    }
}
