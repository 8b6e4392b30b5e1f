//! `X509CERT` and `PRIVATE_KEY` settings.
//!
//! Certificates are held as DER. The XML form stores base64 DER; the JSON
//! form uses PEM. A private key is written through the output context's
//! encoding mode like any other secret.

use std::fmt;

use serde_json::{Value, json};
use x509_parser::parse_x509_certificate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{
    REDACTED, StoredValueKind, XmlInputContext, XmlOutputContext, required_missing, text_element,
    value_elements,
};
use crate::error::ValueError;
use crate::setting::Setting;
use crate::util;
use crate::xml::XmlElement;

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";

fn to_pem(tag: &str, der: &[u8]) -> String {
    pem::encode(&pem::Pem::new(tag, der.to_vec()))
}

/// Accept PEM (any number of blocks) or bare base64 DER.
fn parse_pem_or_base64(text: &str) -> Result<Vec<Vec<u8>>, ValueError> {
    if text.contains("-----BEGIN") {
        let blocks = pem::parse_many(text)
            .map_err(|e| ValueError::malformed(format!("invalid pem: {e}")))?;
        return Ok(blocks.into_iter().map(pem::Pem::into_contents).collect());
    }
    util::base64_decode(text)
        .map(|der| vec![der])
        .map_err(|e| ValueError::malformed(format!("invalid base64 certificate: {e}")))
}

fn json_strings(json: &Value) -> Result<Vec<String>, ValueError> {
    match json {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.clone()]),
        other => crate::json::from_value(other),
    }
}

/// One line describing a certificate, or why it could not be parsed.
fn describe_certificate(der: &[u8]) -> String {
    match parse_x509_certificate(der) {
        Ok((_, cert)) => {
            let expires = chrono::DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
                .map_or_else(|| "unknown".to_owned(), |t| t.to_rfc3339());
            format!(
                "subject={} issuer={} serial={} expires={expires}",
                cert.subject(),
                cert.issuer(),
                cert.raw_serial_as_string()
            )
        }
        Err(e) => format!("unparseable certificate: {e}"),
    }
}

fn validate_certificates(certificates: &[Vec<u8>]) -> Vec<String> {
    certificates
        .iter()
        .enumerate()
        .filter_map(|(i, der)| {
            parse_x509_certificate(der)
                .err()
                .map(|e| format!("certificate {} cannot be parsed: {e}", i.saturating_add(1)))
        })
        .collect()
}

/// `X509CERT` settings: an ordered certificate chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct X509CertificateValue(Vec<Vec<u8>>);

impl X509CertificateValue {
    #[must_use]
    pub fn new(certificates: Vec<Vec<u8>>) -> Self {
        Self(certificates)
    }
}

impl StoredValueKind for X509CertificateValue {
    type Native = Vec<Vec<u8>>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        let mut certificates = Vec::new();
        for text in json_strings(json)? {
            certificates.extend(parse_pem_or_base64(&text)?);
        }
        Ok(Self(certificates))
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        value_elements(setting)
            .filter(|el| !util::is_blank(el.text()))
            .map(|el| {
                util::base64_decode(el.text())
                    .map_err(|e| ValueError::malformed(format!("invalid base64 certificate: {e}")))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        Ok(self
            .0
            .iter()
            .map(|der| text_element(element_name, util::base64_encode(der)))
            .collect())
    }

    fn to_native(&self) -> Vec<Vec<u8>> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        let pems: Vec<String> = self.0.iter().map(|der| to_pem(CERTIFICATE_TAG, der)).collect();
        crate::json::to_value(&pems)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            return vec![required_missing(setting)];
        }
        validate_certificates(&self.0)
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|der| describe_certificate(der))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn to_debug_json(&self) -> Result<Value, ValueError> {
        let described: Vec<String> = self.0.iter().map(|der| describe_certificate(der)).collect();
        crate::json::to_value(&described)
    }
}

/// A certificate chain with its PKCS#8 private key (DER).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKeyCertificate {
    pub certificates: Vec<Vec<u8>>,
    pub key: Vec<u8>,
}

impl fmt::Debug for PrivateKeyCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyCertificate")
            .field("certificates", &self.certificates.len())
            .field("key", &REDACTED)
            .finish()
    }
}

/// `PRIVATE_KEY` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrivateKeyValue(Option<PrivateKeyCertificate>);

impl PrivateKeyValue {
    #[must_use]
    pub fn new(certificate: PrivateKeyCertificate) -> Self {
        Self(Some(certificate))
    }
}

impl StoredValueKind for PrivateKeyValue {
    type Native = Option<PrivateKeyCertificate>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        if json.is_null() {
            return Ok(Self::default());
        }
        let mut certificates = Vec::new();
        for text in json_strings(&json["certificates"])? {
            certificates.extend(parse_pem_or_base64(&text)?);
        }
        let key_text = json["key"]
            .as_str()
            .ok_or_else(|| ValueError::malformed("private key value has no 'key'"))?;
        let key = parse_pem_or_base64(key_text)?
            .into_iter()
            .next()
            .ok_or_else(|| ValueError::malformed("private key pem has no blocks"))?;
        Ok(Self::new(PrivateKeyCertificate { certificates, key }))
    }

    fn from_xml(setting: &XmlElement, ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        let Some(el) = value_elements(setting).next() else {
            return Ok(Self::default());
        };
        let certificates = el
            .children_named("certificate")
            .map(|c| {
                util::base64_decode(c.text())
                    .map_err(|e| ValueError::malformed(format!("invalid base64 certificate: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let stored_key = el
            .child("key")
            .map(XmlElement::text_trim)
            .ok_or_else(|| ValueError::malformed("private key value has no <key>"))?;
        let key = util::base64_decode(&ctx.decode_secret(stored_key)?)
            .map_err(|e| ValueError::malformed(format!("invalid base64 private key: {e}")))?;
        Ok(Self::new(PrivateKeyCertificate { certificates, key }))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        let Some(pkc) = &self.0 else {
            return Ok(Vec::new());
        };
        let mut el = XmlElement::new(element_name);
        el.attach_all(
            pkc.certificates
                .iter()
                .map(|der| text_element("certificate", util::base64_encode(der))),
        );
        el.attach(text_element("key", ctx.encode_secret(&util::base64_encode(&pkc.key))?));
        Ok(vec![el])
    }

    fn to_native(&self) -> Option<PrivateKeyCertificate> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        Ok(match &self.0 {
            None => Value::Null,
            Some(pkc) => json!({
                "certificates": pkc.certificates.iter().map(|d| to_pem(CERTIFICATE_TAG, d)).collect::<Vec<_>>(),
                "key": to_pem(PRIVATE_KEY_TAG, &pkc.key),
            }),
        })
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        match &self.0 {
            None if setting.required => vec![required_missing(setting)],
            None => Vec::new(),
            Some(pkc) => {
                let mut errors = validate_certificates(&pkc.certificates);
                if pkc.key.is_empty() {
                    errors.push("private key is empty".to_owned());
                }
                if pkc.certificates.is_empty() {
                    errors.push("private key has no certificate".to_owned());
                }
                errors
            }
        }
    }

    fn to_debug_string(&self) -> String {
        match &self.0 {
            None => String::new(),
            Some(pkc) => {
                let certs: Vec<String> =
                    pkc.certificates.iter().map(|d| describe_certificate(d)).collect();
                format!("key: {REDACTED}; {}", certs.join("; "))
            }
        }
    }

    fn to_debug_json(&self) -> Result<Value, ValueError> {
        Ok(match &self.0 {
            None => Value::Null,
            Some(pkc) => json!({
                "certificates": pkc.certificates.iter().map(|d| describe_certificate(d)).collect::<Vec<_>>(),
                "key": REDACTED,
            }),
        })
    }
}
