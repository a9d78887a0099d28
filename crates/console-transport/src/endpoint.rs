//! Transport endpoint construction.
//!
//! The tunnelling proxy is served from the console page's own origin, never
//! from the VM's address. The WebSocket URL is
//! `scheme://authority/proxy-path?host=<target host>&port=<target port>` with
//! `wss` for pages served over `https` and `ws` otherwise.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use console_core::prelude::*;

/// Default path of the WebSocket-to-TCP proxy on the page origin
pub const DEFAULT_PROXY_PATH: &str = "websockify";

/// Characters left unescaped by JavaScript's `encodeURIComponent`
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Origin of the page hosting the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    secure: bool,
    authority: String,
}

impl PageOrigin {
    /// `authority` is `host[:port]` exactly as it should appear in the URL.
    pub fn new(secure: bool, authority: impl Into<String>) -> Self {
        Self {
            secure,
            authority: authority.into(),
        }
    }

    /// Derive the origin from the console page URL.
    ///
    /// Only `http` and `https` pages are accepted. Default ports are omitted
    /// from the authority.
    pub fn from_page_url(page_url: &Url) -> Result<Self> {
        let secure = match page_url.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(Error::config(format!(
                    "console page must be served over http or https, got '{other}'"
                )))
            }
        };

        let host = page_url
            .host_str()
            .ok_or_else(|| Error::config("console page URL has no host"))?;

        let authority = match page_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self { secure, authority })
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// `wss` on a secure origin, `ws` otherwise
    pub fn ws_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }
}

impl fmt::Display for PageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "https" } else { "http" };
        write!(f, "{scheme}://{}", self.authority)
    }
}

/// Build the proxy WebSocket URL for a target VM console.
pub fn build_transport_url(
    origin: &PageOrigin,
    proxy_path: &str,
    target_host: &str,
    target_port: u16,
) -> Result<Url> {
    let path = proxy_path.trim_matches('/');
    let raw = format!(
        "{}://{}/{}?host={}&port={}",
        origin.ws_scheme(),
        origin.authority(),
        path,
        utf8_percent_encode(target_host, COMPONENT),
        target_port,
    );
    Ok(Url::parse(&raw)?)
}
