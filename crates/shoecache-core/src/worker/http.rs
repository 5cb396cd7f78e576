//! Request and response types seen by the interception layer.
//!
//! These model the subset of the Fetch API the routing decisions depend on:
//! the request mode and destination, and whether a response is a plain
//! same-origin success that may be cached.

use std::collections::BTreeMap;

pub use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Request mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page load
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// What the requested resource will be used as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Empty,
}

impl Destination {
    /// Best guess from a file extension, for callers that only have a URL
    pub fn from_extension(extension: Option<&str>) -> Self {
        match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("html") | Some("htm") => Destination::Document,
            Some("js") | Some("mjs") => Destination::Script,
            Some("css") => Destination::Style,
            Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("svg") | Some("webp")
            | Some("ico") | Some("avif") => Destination::Image,
            Some("woff") | Some("woff2") | Some("ttf") | Some("otf") | Some("eot") => {
                Destination::Font
            }
            Some("webmanifest") => Destination::Manifest,
            _ => Destination::Empty,
        }
    }

    /// Destinations that get a last-resort cache lookup when the network fails
    pub fn has_cache_fallback(&self) -> bool {
        matches!(self, Destination::Image | Destination::Font | Destination::Style)
    }
}

/// An outgoing request as seen by the worker
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        let destination = Destination::from_extension(extension_of(url.path()));
        Self {
            method,
            url,
            mode: RequestMode::default(),
            destination,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn parse(method: Method, url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self::new(method, url))
    }

    pub fn get(url: &str) -> Result<Self, FetchError> {
        Self::parse(Method::GET, url)
    }

    /// A full-page load
    pub fn navigate(url: &str) -> Result<Self, FetchError> {
        let mut request = Self::get(url)?;
        request.mode = RequestMode::Navigate;
        request.destination = Destination::Document;
        Ok(request)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Origin as `scheme://host[:port]`
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn extension(&self) -> Option<&str> {
        extension_of(self.url.path())
    }

    /// Key under which the request's response is cached: the URL without fragment
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }
}

/// Lowercase-insensitive extension of the last path segment, if any
pub fn extension_of(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Response type, as the Fetch API reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response with full access
    #[default]
    Basic,
    Cors,
    Opaque,
    Error,
}

/// Where a response handed back to the page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseSource {
    Network,
    #[default]
    Cache,
    Synthesized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub kind: ResponseKind,
    pub redirected: bool,
    pub source: ResponseSource,
}

impl Response {
    /// A response built locally rather than fetched
    pub fn synthesized(status: u16, status_text: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            status_text: status_text.to_string(),
            headers: BTreeMap::new(),
            body,
            kind: ResponseKind::Basic,
            redirected: false,
            source: ResponseSource::Synthesized,
        }
    }

    pub fn json(status: u16, status_text: &str, value: &serde_json::Value) -> Self {
        let mut response = Self::synthesized(status, status_text, value.to_string().into_bytes());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only complete, same-origin, non-redirected 200s are stored
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic && !self.redirected
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
