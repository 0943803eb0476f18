//! Classification of page URLs into rule-matchable origins

use url::{Host, Url};

use super::hostname::canonical_hostname;

/// Where a page was loaded from, as far as rule matching is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOrigin {
    /// A web page with a valid hostname
    Web(String),
    /// A `file:` URL
    LocalFile,
    /// Anything else: no hostname, an IP address, an unsupported scheme
    General,
}

impl PageOrigin {
    /// Classify a URL or a bare hostname
    ///
    /// URLs are parsed the way a browser does (WHATWG), so internationalized
    /// hosts arrive here in their punycode form. Input without a scheme is
    /// read as `http://<input>`.
    pub fn from_url(url: &str) -> Self {
        let input = url.trim();

        // A dotted "scheme" is a bare host with a port, e.g. `example.com:8080`
        let parsed = match Url::parse(input) {
            Ok(parsed) if !parsed.scheme().contains('.') => parsed,
            _ => match Url::parse(&format!("http://{input}")) {
                Ok(parsed) => parsed,
                Err(_) => return PageOrigin::General,
            },
        };

        match parsed.scheme() {
            "file" => PageOrigin::LocalFile,
            "http" | "https" => match parsed.host() {
                Some(Host::Domain(domain)) => canonical_hostname(domain)
                    .map(PageOrigin::Web)
                    .unwrap_or(PageOrigin::General),
                _ => PageOrigin::General,
            },
            _ => PageOrigin::General,
        }
    }

    /// Hostname of a web origin
    pub fn host(&self) -> Option<&str> {
        match self {
            PageOrigin::Web(host) => Some(host),
            _ => None,
        }
    }
}
