//! The stored configuration document.
//!
//! ```text
//! <PwmConfiguration createTime=".." modifyTime=".." xmlVersion="5">
//!   <properties type="config">
//!     <property key="configIsEditable">true</property>
//!   </properties>
//!   <settings>
//!     <setting key=".." syntax=".." syntaxVersion=".." modifyTime="..">
//!       <value>..</value>
//!     </setting>
//!   </settings>
//! </PwmConfiguration>
//! ```
//!
//! Only settings that were explicitly written appear in `<settings>`; every
//! other setting reads as its default. Settings outside the catalog are kept
//! and written back unchanged in meaning.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::crypto::{self, SecurityKey};
use crate::encoder::EncodingMode;
use crate::error::{ConfigError, CryptoError, ValueError};
use crate::factory;
use crate::setting::{SettingKey, SettingSyntax};
use crate::value::{StoredValue, XmlInputContext, XmlOutputContext};
use crate::xml::{XmlDocument, XmlElement};

const ROOT_ELEMENT: &str = "PwmConfiguration";
const XML_VERSION: &str = "5";

/// Property holding `"false"` when the configuration is locked against edits.
pub const PROPERTY_CONFIG_IS_EDITABLE: &str = "configIsEditable";
/// Property holding the salted hash of the configuration password.
pub const PROPERTY_PASSWORD_HASH: &str = "configPasswordHash";

#[derive(Debug, Clone)]
enum SettingRecord {
    Typed {
        syntax: SettingSyntax,
        value: StoredValue,
        modify_time: Option<DateTime<Utc>>,
    },
    /// A setting whose syntax is not recognized, kept verbatim.
    Raw(XmlElement),
}

/// The parsed configuration document.
#[derive(Debug, Clone)]
pub struct StoredConfiguration {
    key: SecurityKey,
    create_time: DateTime<Utc>,
    modify_time: DateTime<Utc>,
    properties: BTreeMap<String, String>,
    settings: BTreeMap<String, SettingRecord>,
}

fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|t| DateTime::parse_from_rfc3339(t.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// The key used when no passphrase is configured, derived from a document's
/// `createTime` as it is written.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if derivation fails.
pub fn creation_time_key(create_time: DateTime<Utc>) -> Result<SecurityKey, CryptoError> {
    SecurityKey::from_passphrase(&timestamp(create_time))
}

impl StoredConfiguration {
    /// An editable configuration with no settings written.
    #[must_use]
    pub fn new_empty(key: SecurityKey) -> Self {
        Self::new_empty_at(key, Utc::now())
    }

    /// An empty configuration with a fixed `createTime`, truncated to whole
    /// seconds as it is written to the document.
    #[must_use]
    pub fn new_empty_at(key: SecurityKey, create_time: DateTime<Utc>) -> Self {
        let create_time = parse_timestamp(Some(&timestamp(create_time))).unwrap_or(create_time);
        Self {
            key,
            create_time,
            modify_time: create_time,
            properties: BTreeMap::from([(PROPERTY_CONFIG_IS_EDITABLE.to_owned(), "true".to_owned())]),
            settings: BTreeMap::new(),
        }
    }

    /// The `createTime` of a document, without decoding any secrets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Xml`] if the document does not parse.
    pub fn read_create_time(xml: &str) -> Result<Option<DateTime<Utc>>, ConfigError> {
        let document = XmlDocument::parse(xml)?;
        Ok(parse_timestamp(document.root().attribute("createTime")))
    }

    /// Parse a document, decoding secrets with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDocument`] if the root element is wrong,
    /// [`ConfigError::Xml`] if the text is not XML, and [`ConfigError::Value`]
    /// if a setting cannot be read.
    pub fn from_xml(xml: &str, key: SecurityKey) -> Result<Self, ConfigError> {
        let document = XmlDocument::parse(xml)?;
        let root = document.root();
        if root.name() != ROOT_ELEMENT {
            return Err(ConfigError::InvalidDocument {
                reason: format!("root element is '{}', expected '{ROOT_ELEMENT}'", root.name()),
            });
        }
        let now = Utc::now();
        let create_time = parse_timestamp(root.attribute("createTime")).unwrap_or(now);
        let modify_time = parse_timestamp(root.attribute("modifyTime")).unwrap_or(create_time);

        let properties = document
            .evaluate_xpath("/PwmConfiguration/properties[@type='config']/property[@key]")?
            .into_iter()
            .filter_map(|p| Some((p.attribute("key")?.to_owned(), p.text().to_owned())))
            .collect();

        let ctx = XmlInputContext::new(&key);
        let mut settings = BTreeMap::new();
        for element in document.evaluate_xpath("/PwmConfiguration/settings/setting[@key]")? {
            let setting_key = element.attribute("key").unwrap_or_default().to_owned();
            let record = read_record(&setting_key, element, &ctx).inspect_err(|e| {
                tracing::error!(setting = %setting_key, error = %e, "failed to load configuration setting");
            })?;
            settings.insert(setting_key, record);
        }

        tracing::debug!(settings = settings.len(), "configuration document loaded");
        Ok(Self {
            key,
            create_time,
            modify_time,
            properties,
            settings,
        })
    }

    /// Serialize the document, writing secrets with `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value cannot be encoded or the XML cannot be written.
    pub fn to_xml(&self, mode: EncodingMode) -> Result<String, ConfigError> {
        Ok(self.to_document(mode)?.to_pretty_string()?)
    }

    fn to_document(&self, mode: EncodingMode) -> Result<XmlDocument, ConfigError> {
        let ctx = XmlOutputContext::new(&self.key, mode);

        let mut properties = XmlElement::new("properties").with_attribute("type", "config");
        for (key, value) in &self.properties {
            properties.attach(
                XmlElement::new("property")
                    .with_attribute("key", key.as_str())
                    .with_text(value.as_str()),
            );
        }

        let mut settings = XmlElement::new("settings");
        for (key, record) in &self.settings {
            settings.attach(match record {
                SettingRecord::Typed {
                    syntax,
                    value,
                    modify_time,
                } => {
                    let mut element = XmlElement::new("setting")
                        .with_attribute("key", key.as_str())
                        .with_attribute("syntax", syntax.as_str())
                        .with_attribute("syntaxVersion", value.syntax_version().to_string());
                    if let Some(time) = modify_time {
                        element.set_attribute("modifyTime", timestamp(*time));
                    }
                    element.attach_all(value.to_xml_values("value", &ctx)?);
                    element
                }
                SettingRecord::Raw(element) => element.clone(),
            });
        }

        let root = XmlElement::new(ROOT_ELEMENT)
            .with_attribute("createTime", timestamp(self.create_time))
            .with_attribute("modifyTime", timestamp(self.modify_time))
            .with_attribute("xmlVersion", XML_VERSION)
            .with_child(properties)
            .with_child(settings);
        Ok(XmlDocument::from_root(root))
    }

    /// The stored value of a setting, or its default when never written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Value`] if the default cannot be built.
    pub fn read_setting(&self, key: SettingKey) -> Result<StoredValue, ConfigError> {
        match self.settings.get(key.key()) {
            Some(SettingRecord::Typed { value, .. }) => Ok(value.clone()),
            _ => Ok(factory::default_value(key.setting())?),
        }
    }

    /// Validate and store a setting's value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Locked`] when the configuration is locked,
    /// [`ConfigError::Value`] when the value has the wrong type for the
    /// setting, and [`ConfigError::InvalidValue`] when validation fails.
    pub fn write_setting(&mut self, key: SettingKey, value: StoredValue) -> Result<(), ConfigError> {
        if self.is_locked() {
            return Err(ConfigError::Locked);
        }
        let setting = key.setting();
        if !factory::matches_syntax(setting.syntax, &value) {
            return Err(ValueError::TypeMismatch {
                expected: setting.syntax.as_str(),
                actual: value.variant_name(),
            }
            .into());
        }
        let errors = value.validate(setting);
        if !errors.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: setting.key.to_owned(),
                errors,
            });
        }
        let value = factory::normalize(setting, value);
        tracing::info!(setting = setting.key, value = %value.to_debug_string(), "setting written");

        let now = Utc::now();
        self.settings.insert(
            setting.key.to_owned(),
            SettingRecord::Typed {
                syntax: setting.syntax,
                value,
                modify_time: Some(now),
            },
        );
        self.modify_time = now;
        Ok(())
    }

    /// Remove a stored value so the setting reads as its default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Locked`] when the configuration is locked.
    pub fn reset_setting(&mut self, key: SettingKey) -> Result<(), ConfigError> {
        if self.is_locked() {
            return Err(ConfigError::Locked);
        }
        if self.settings.remove(key.key()).is_some() {
            tracing::info!(setting = key.key(), "setting reset to default");
            self.modify_time = Utc::now();
        }
        Ok(())
    }

    /// `true` when the setting is unset or its value hashes the same as the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Value`] if either value cannot be hashed.
    pub fn is_default(&self, key: SettingKey) -> Result<bool, ConfigError> {
        match self.settings.get(key.key()) {
            Some(SettingRecord::Typed { value, .. }) => {
                let default = factory::default_value(key.setting())?;
                Ok(value.value_hash()? == default.value_hash()?)
            }
            _ => Ok(true),
        }
    }

    /// Catalog settings whose value differs from the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Value`] if a value cannot be hashed.
    pub fn modified_settings(&self) -> Result<Vec<SettingKey>, ConfigError> {
        let mut modified = Vec::new();
        for key in SettingKey::ALL {
            if !self.is_default(key)? {
                modified.push(key);
            }
        }
        Ok(modified)
    }

    /// Keys of settings read from an older syntax version.
    #[must_use]
    pub fn settings_needing_update(&self) -> Vec<String> {
        self.settings
            .iter()
            .filter(|(_, record)| {
                matches!(record, SettingRecord::Typed { value, .. } if value.needs_xml_update())
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Validation errors for every catalog setting, keyed by setting key.
    /// Settings without problems are omitted.
    #[must_use]
    pub fn validate_all(&self) -> BTreeMap<String, Vec<String>> {
        let mut report = BTreeMap::new();
        for key in SettingKey::ALL {
            let errors = match self.read_setting(key) {
                Ok(value) => value.validate(key.setting()),
                Err(e) => vec![e.to_string()],
            };
            if !errors.is_empty() {
                report.insert(key.key().to_owned(), errors);
            }
        }
        report
    }

    #[must_use]
    pub fn read_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn write_property(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(key.to_owned(), value.into());
        self.modify_time = Utc::now();
    }

    /// Store a salted hash of the configuration password.
    pub fn set_config_password(&mut self, password: &str) {
        self.write_property(PROPERTY_PASSWORD_HASH, crypto::hash_password(password));
        tracing::info!("configuration password updated");
    }

    #[must_use]
    pub fn verify_config_password(&self, password: &str) -> bool {
        self.read_property(PROPERTY_PASSWORD_HASH)
            .is_some_and(|stored| crypto::verify_password(password, stored))
    }

    #[must_use]
    pub fn has_config_password(&self) -> bool {
        self.read_property(PROPERTY_PASSWORD_HASH)
            .is_some_and(|stored| !stored.trim().is_empty())
    }

    /// `true` when the `configIsEditable` property is `false`.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.read_property(PROPERTY_CONFIG_IS_EDITABLE)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
    }

    /// Lowercase hex SHA-512 of the canonical document. Changes whenever a
    /// setting or property is written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document cannot be serialized.
    pub fn config_hash(&self) -> Result<String, ConfigError> {
        let canonical = self.to_document(EncodingMode::Plain)?.to_canonical_string()?;
        Ok(crypto::sha512_hex(canonical.as_bytes()))
    }

    #[must_use]
    pub fn security_key(&self) -> &SecurityKey {
        &self.key
    }

    #[must_use]
    pub fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }

    #[must_use]
    pub fn modify_time(&self) -> DateTime<Utc> {
        self.modify_time
    }
}

fn read_record(
    key: &str,
    element: &XmlElement,
    ctx: &XmlInputContext<'_>,
) -> Result<SettingRecord, ConfigError> {
    let modify_time = parse_timestamp(element.attribute("modifyTime"));
    if let Some(known) = SettingKey::from_key(key) {
        let setting = known.setting();
        return Ok(SettingRecord::Typed {
            syntax: setting.syntax,
            value: factory::from_xml(setting, element, ctx)?,
            modify_time,
        });
    }
    match element.attribute("syntax").map(str::parse::<SettingSyntax>) {
        Some(Ok(syntax)) => Ok(SettingRecord::Typed {
            syntax,
            value: factory::from_xml_with_syntax(key, syntax, element, ctx)?,
            modify_time,
        }),
        _ => {
            tracing::warn!(setting = key, "setting has no recognized syntax, keeping it verbatim");
            Ok(SettingRecord::Raw(element.clone()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::{BooleanValue, LocalizedStringValue, NumericValue, StringValue};

    fn key() -> SecurityKey {
        SecurityKey::from_passphrase("stored-config-tests").unwrap()
    }

    #[test]
    fn empty_config_reads_defaults() {
        let config = StoredConfiguration::new_empty(key());
        assert_eq!(
            config.read_setting(SettingKey::IdleTimeoutSeconds).unwrap(),
            StoredValue::Numeric(NumericValue::duration(900))
        );
        assert!(config.is_default(SettingKey::BasicAuthEnable).unwrap());
        assert!(config.modified_settings().unwrap().is_empty());
        assert!(config.validate_all().is_empty());
        assert!(!config.is_locked());
        assert!(!config.has_config_password());
    }

    #[test]
    fn creation_time_key_survives_reload() {
        let created = DateTime::parse_from_rfc3339("2024-03-01T12:30:45.789Z")
            .unwrap()
            .with_timezone(&Utc);
        let key = creation_time_key(created).unwrap();
        let config = StoredConfiguration::new_empty_at(key, created);
        let xml = config.to_xml(EncodingMode::Encoded).unwrap();

        let read_back = StoredConfiguration::read_create_time(&xml).unwrap().unwrap();
        assert_eq!(read_back, config.create_time());
        assert_eq!(
            creation_time_key(read_back).unwrap().as_bytes(),
            config.security_key().as_bytes()
        );
    }

    #[test]
    fn written_settings_survive_xml_roundtrip() {
        let mut config = StoredConfiguration::new_empty(key());
        config
            .write_setting(SettingKey::BasicAuthEnable, StoredValue::Boolean(BooleanValue::new(false)))
            .unwrap();
        config
            .write_setting(
                SettingKey::ApplicationTitle,
                StoredValue::LocalizedString(LocalizedStringValue::single("Reset Portal")),
            )
            .unwrap();
        config.set_config_password("admin-pw");

        let xml = config.to_xml(EncodingMode::Encoded).unwrap();
        assert!(xml.contains(r#"key="security.basicAuth.enable""#));
        assert!(!xml.contains("admin-pw"));

        let back = StoredConfiguration::from_xml(&xml, key()).unwrap();
        assert_eq!(
            back.read_setting(SettingKey::BasicAuthEnable).unwrap(),
            StoredValue::Boolean(BooleanValue::new(false))
        );
        assert_eq!(
            back.modified_settings().unwrap(),
            vec![SettingKey::ApplicationTitle, SettingKey::BasicAuthEnable]
        );
        assert!(back.verify_config_password("admin-pw"));
        assert!(!back.verify_config_password("wrong"));
        assert_eq!(back.config_hash().unwrap(), config.config_hash().unwrap());
    }

    #[test]
    fn writing_the_default_is_not_a_modification() {
        let mut config = StoredConfiguration::new_empty(key());
        config
            .write_setting(SettingKey::IdleTimeoutSeconds, StoredValue::Numeric(NumericValue::new(900)))
            .unwrap();
        assert!(config.is_default(SettingKey::IdleTimeoutSeconds).unwrap());
        config.reset_setting(SettingKey::IdleTimeoutSeconds).unwrap();
        assert!(config.to_xml(EncodingMode::Plain).unwrap().contains("<settings/>"));
    }

    #[test]
    fn invalid_and_mistyped_values_are_rejected() {
        let mut config = StoredConfiguration::new_empty(key());
        let err = config
            .write_setting(SettingKey::IdleTimeoutSeconds, StoredValue::Numeric(NumericValue::new(5)))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "idleTimeoutSeconds"));

        let err = config
            .write_setting(SettingKey::IdleTimeoutSeconds, StoredValue::String(StringValue::new("5")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Value(ValueError::TypeMismatch { .. })));
        assert!(config.is_default(SettingKey::IdleTimeoutSeconds).unwrap());
    }

    #[test]
    fn locked_config_rejects_writes() {
        let mut config = StoredConfiguration::new_empty(key());
        config.write_property(PROPERTY_CONFIG_IS_EDITABLE, "false");
        assert!(config.is_locked());
        let err = config
            .write_setting(SettingKey::OtpForceSetup, StoredValue::Boolean(BooleanValue::new(true)))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Locked));
        assert!(matches!(config.reset_setting(SettingKey::OtpForceSetup), Err(ConfigError::Locked)));
    }

    #[test]
    fn config_hash_tracks_changes() {
        let mut config = StoredConfiguration::new_empty(key());
        let before = config.config_hash().unwrap();
        assert_eq!(before.len(), 128);
        config
            .write_setting(SettingKey::OtpForceSetup, StoredValue::Boolean(BooleanValue::new(true)))
            .unwrap();
        assert_ne!(config.config_hash().unwrap(), before);
    }

    #[test]
    fn unknown_settings_are_kept_and_secrets_stripped() {
        let k = key();
        let secret = crate::encoder::encode("ldap-bind-pw", EncodingMode::ConfigPw, &k).unwrap();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<PwmConfiguration createTime="2024-01-02T03:04:05Z" modifyTime="2024-01-02T03:04:05Z" xmlVersion="5">
  <properties type="config"><property key="configIsEditable">true</property></properties>
  <settings>
    <setting key="ldap.proxy.password" syntax="PASSWORD"><value>{secret}</value></setting>
    <setting key="queryMatch" syntax="USER_PERMISSION" syntaxVersion="1"><value>{{"ldapQuery":"(objectClass=*)"}}</value></setting>
    <setting key="future.thing" syntax="HOLOGRAM"><value>x</value></setting>
  </settings>
</PwmConfiguration>"#
        );
        let config = StoredConfiguration::from_xml(&xml, key()).unwrap();
        assert_eq!(
            StoredConfiguration::read_create_time(&xml).unwrap().map(timestamp).as_deref(),
            Some("2024-01-02T03:04:05Z")
        );
        assert_eq!(config.settings_needing_update(), vec!["queryMatch".to_owned()]);

        let stripped = config.to_xml(EncodingMode::Stripped).unwrap();
        assert!(stripped.contains("STRIPPED:************"));
        assert!(!stripped.contains(&secret));
        assert!(stripped.contains("HOLOGRAM"));
        assert!(stripped.contains(r#"syntaxVersion="2""#));
    }

    #[test]
    fn wrong_root_is_rejected() {
        let err = StoredConfiguration::from_xml("<other/>", key()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDocument { .. }));
    }

    #[test]
    fn bad_setting_value_fails_load() {
        let xml = r#"<PwmConfiguration><settings>
            <setting key="idleTimeoutSeconds" syntax="DURATION"><value>soon</value></setting>
        </settings></PwmConfiguration>"#;
        let err = StoredConfiguration::from_xml(xml, key()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Value(ValueError::ConfigFormat { ref setting, .. }) if setting == "idleTimeoutSeconds"
        ));
    }
}
