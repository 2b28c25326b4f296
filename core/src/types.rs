//! Inputs to the Precog API.
//!
//! # Design
//! Server records (accounts, API keys, grants, plans, query results) are
//! returned as `serde_json::Value` and not validated client-side. The types
//! here are what callers hand in, with the required fields checked before a
//! request is sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Email and password identifying an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountCredentials {
    pub email: String,
    pub password: String,
}

impl AccountCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require("email", &self.email)?;
        require("password", &self.password)
    }
}

/// Kinds of access a grant can confer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GrantType {
    Append,
    Replace,
    Execute,
    Mount,
    Create,
    Explore,
}

/// Upload formats accepted by the ingest service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileType {
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "application/x-json-stream")]
    JsonStream,
    #[serde(rename = "text/csv")]
    Csv,
    #[serde(rename = "application/zip")]
    Zip,
    #[serde(rename = "application/x-gzip")]
    Gzip,
}

impl FileType {
    pub fn mime(self) -> &'static str {
        match self {
            FileType::Json => "application/json",
            FileType::JsonStream => "application/x-json-stream",
            FileType::Csv => "text/csv",
            FileType::Zip => "application/zip",
            FileType::Gzip => "application/x-gzip",
        }
    }
}

/// A file upload. Only `path`, `file_type` and `contents` are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: String,
    pub file_type: FileType,
    pub contents: String,
    pub owner_account_id: Option<String>,
    /// CSV options.
    pub delimiter: Option<String>,
    pub quote: Option<String>,
    pub escape: Option<String>,
    /// Ingest through the async endpoint instead of waiting for the write.
    pub asynchronous: bool,
}

impl UploadFile {
    pub fn new(path: impl Into<String>, file_type: FileType, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_type,
            contents: contents.into(),
            owner_account_id: None,
            delimiter: None,
            quote: None,
            escape: None,
            asynchronous: false,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require("path", &self.path)
    }
}

/// JSON values appended to a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Append {
    pub path: String,
    pub values: Vec<Value>,
    pub owner_account_id: Option<String>,
    pub asynchronous: bool,
}

impl Append {
    pub fn new(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            values,
            owner_account_id: None,
            asynchronous: false,
        }
    }
}

/// The stored contents of a file, as returned by `retrieve_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub contents: String,
    pub file_type: FileType,
}

/// A synchronous Quirrel query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub query: String,
    /// Base path the query runs against.
    pub path: Option<String>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub sort_on: Option<String>,
}

impl Query {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// A query submitted as a background job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncQuery {
    pub query: String,
    pub path: Option<String>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub order: Option<String>,
    pub sort_on: Option<String>,
    pub sort_order: Option<String>,
    pub timeout: Option<u64>,
    pub prefix_path: Option<String>,
    pub format: Option<String>,
}

impl AsyncQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

pub(crate) fn require(name: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        Err(Error::MissingField(name))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_serializes_as_mime() {
        for ft in [
            FileType::Json,
            FileType::JsonStream,
            FileType::Csv,
            FileType::Zip,
            FileType::Gzip,
        ] {
            let json = serde_json::to_value(ft).unwrap();
            assert_eq!(json, ft.mime());
        }
    }

    #[test]
    fn grant_type_is_lowercase() {
        assert_eq!(serde_json::to_value(GrantType::Explore).unwrap(), "explore");
    }

    #[test]
    fn credentials_require_both_fields() {
        assert!(AccountCredentials::new("a@b.c", "pw").validate().is_ok());
        let err = AccountCredentials::new("", "pw").validate().unwrap_err();
        assert!(matches!(err, Error::MissingField("email")));
        let err = AccountCredentials::new("a@b.c", "").validate().unwrap_err();
        assert!(matches!(err, Error::MissingField("password")));
    }

    #[test]
    fn upload_requires_path() {
        let err = UploadFile::new("", FileType::Csv, "a,b").validate().unwrap_err();
        assert!(matches!(err, Error::MissingField("path")));
    }
}
