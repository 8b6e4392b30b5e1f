//! `FILE` settings: uploaded files embedded in the document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{
    StoredValueKind, XmlInputContext, XmlOutputContext, required_missing, text_element,
    value_elements,
};
use crate::crypto;
use crate::error::ValueError;
use crate::setting::Setting;
use crate::util;
use crate::xml::XmlElement;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInformation {
    pub filename: String,
    #[serde(default)]
    pub file_type: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct FileContent(Vec<u8>);

impl FileContent {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn sha512(&self) -> String {
        crypto::sha512_hex(&self.0)
    }
}

impl std::fmt::Debug for FileContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileContent({} bytes)", self.0.len())
    }
}

/// Shape of one file in the JSON form.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRecord {
    #[serde(flatten)]
    info: FileInformation,
    #[serde(with = "crate::json::base64_bytes")]
    content: Vec<u8>,
}

/// `FILE` settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileValue(BTreeMap<FileInformation, FileContent>);

impl FileValue {
    #[must_use]
    pub fn new(files: BTreeMap<FileInformation, FileContent>) -> Self {
        Self(files)
    }
}

impl StoredValueKind for FileValue {
    type Native = BTreeMap<FileInformation, FileContent>;

    fn from_json(json: &Value) -> Result<Self, ValueError> {
        let records: Vec<FileRecord> = super::from_json_or_default(json)?;
        Ok(Self(
            records
                .into_iter()
                .map(|r| (r.info, FileContent(r.content)))
                .collect(),
        ))
    }

    fn from_xml(setting: &XmlElement, _ctx: &XmlInputContext<'_>) -> Result<Self, ValueError> {
        let mut files = BTreeMap::new();
        for el in value_elements(setting) {
            let info_el = el
                .child("FileInformation")
                .ok_or_else(|| ValueError::malformed("file value is missing <FileInformation>"))?;
            let content_el = el
                .child("FileContent")
                .ok_or_else(|| ValueError::malformed("file value is missing <FileContent>"))?;
            let info: FileInformation = crate::json::from_str(info_el.text())?;
            let bytes = util::base64_decode(content_el.text())
                .map_err(|e| ValueError::malformed(format!("invalid file content: {e}")))?;
            files.insert(info, FileContent(bytes));
        }
        Ok(Self(files))
    }

    fn to_xml_values(
        &self,
        element_name: &str,
        _ctx: &XmlOutputContext<'_>,
    ) -> Result<Vec<XmlElement>, ValueError> {
        self.0
            .iter()
            .map(|(info, content)| {
                Ok(XmlElement::new(element_name)
                    .with_child(text_element("FileInformation", crate::json::to_compact(info)?))
                    .with_child(text_element("FileContent", util::base64_encode(&content.0))))
            })
            .collect()
    }

    fn to_native(&self) -> BTreeMap<FileInformation, FileContent> {
        self.0.clone()
    }

    fn to_json(&self) -> Result<Value, ValueError> {
        let records: Vec<FileRecord> = self
            .0
            .iter()
            .map(|(info, content)| FileRecord {
                info: info.clone(),
                content: content.0.clone(),
            })
            .collect();
        crate::json::to_value(&records)
    }

    fn validate(&self, setting: &Setting) -> Vec<String> {
        if setting.required && self.0.is_empty() {
            vec![required_missing(setting)]
        } else {
            Vec::new()
        }
    }

    fn to_debug_string(&self) -> String {
        self.0
            .iter()
            .map(|(info, content)| {
                format!(
                    "{} ({}, {} bytes, sha512 {})",
                    info.filename,
                    info.file_type,
                    content.size(),
                    util::truncate_chars(&content.sha512(), 16)
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn to_debug_json(&self) -> Result<Value, ValueError> {
        Ok(Value::Array(
            self.0
                .iter()
                .map(|(info, content)| {
                    json!({
                        "filename": info.filename,
                        "fileType": info.file_type,
                        "size": content.size(),
                        "sha512": content.sha512(),
                    })
                })
                .collect(),
        ))
    }
}
