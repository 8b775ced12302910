//! Traits describing the listing and baseline backends, plus the shared error type.

use std::io::Error as IoError;

use async_trait::async_trait;
use quick_xml::Error as XmlError;
use quick_xml::events::attributes::AttrError;
use reqwest::Error as ReqwestError;

use crate::model::{AccessToken, ScheduleDay};

#[derive(thiserror::Error, Debug)]
/// Errors that abort an epgpatch run.
pub enum PortError {
    /// Network layer failed, the server answered with an error status, or the body did not decode.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// The listing site refused to hand out an access token.
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// The baseline guide is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),
    /// An attribute in the baseline guide could not be read.
    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] AttrError),
    /// The baseline guide is structurally broken (truncated, empty, not UTF-8).
    #[error("Malformed XML: {0}")]
    MalformedXml(String),
    /// A CSS selector used by the listing parser did not compile.
    #[error("Invalid selector: {0}")]
    Selector(String),
    /// Reading configuration or writing the guide failed.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
    /// A configuration value is outside its allowed range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
/// Backend serving the programme listings of the injected channel.
pub trait ListingsPort: Send + Sync {
    /// Perform the token handshake required by the AJAX listing endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Authentication`] when the token is rejected or malformed,
    /// or [`PortError::Network`] when the request fails.
    async fn access_token(&self) -> Result<AccessToken, PortError>;

    /// Fetch the server-rendered schedule page for a day.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails.
    async fn day_page(&self, day: &ScheduleDay) -> Result<String, PortError>;

    /// Fetch the AJAX-delivered HTML fragments for a day. Non-textual elements are dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the request fails or the body is not a JSON list.
    async fn day_fragments(
        &self,
        day: &ScheduleDay,
        token: &AccessToken,
    ) -> Result<Vec<String>, PortError>;
}

#[async_trait]
/// Backend serving the baseline XMLTV document.
pub trait BaselinePort: Send + Sync {
    /// Download the raw baseline document.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the source is unreachable.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PortError>;
}
