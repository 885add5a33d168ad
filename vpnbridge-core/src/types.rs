//! Shared value types
//!
//! Proxy endpoints, the VPN server list and exit locations. These are plain
//! immutable values passed between the client link, the state machines, the
//! override store and the resolver.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Default port of a SOCKS relay when none is given
pub const DEFAULT_SOCKS_PORT: u16 = 1080;

/// Protocol spoken by a proxy endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Socks,
    Http,
    Https,
}

impl ProxyType {
    /// Port used when a proxy URL does not carry one
    pub fn default_port(self) -> u16 {
        match self {
            ProxyType::Socks => DEFAULT_SOCKS_PORT,
            ProxyType::Http => 80,
            ProxyType::Https => 443,
        }
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "socks" | "socks5" => Some(ProxyType::Socks),
            "http" => Some(ProxyType::Http),
            "https" => Some(ProxyType::Https),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Socks => write!(f, "socks"),
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
        }
    }
}

/// A single proxy the browser can send a request through
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    #[serde(rename = "type")]
    pub kind: ProxyType,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyEndpoint {
    /// Create an endpoint without credentials
    pub fn new(kind: ProxyType, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// SOCKS endpoint of an exit relay
    pub fn relay(host: impl Into<String>, port: u16) -> Self {
        Self::new(ProxyType::Socks, host, port)
    }
}

/// Credentials are never printed.
impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.kind, self.host, self.port)
    }
}

/// Outcome of [`parse_proxy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedProxy {
    Endpoint(ProxyEndpoint),
    Unparseable,
}

impl ParsedProxy {
    pub fn endpoint(self) -> Option<ProxyEndpoint> {
        match self {
            ParsedProxy::Endpoint(endpoint) => Some(endpoint),
            ParsedProxy::Unparseable => None,
        }
    }
}

/// Parse a proxy URL such as `socks://user:pw@host.example:1080`
///
/// Never fails: anything that is not a `socks`, `socks5`, `http` or `https`
/// URL with a host comes back as [`ParsedProxy::Unparseable`].
pub fn parse_proxy(input: &str) -> ParsedProxy {
    let Ok(url) = Url::parse(input.trim()) else {
        return ParsedProxy::Unparseable;
    };
    let Some(kind) = ProxyType::from_scheme(url.scheme()) else {
        return ParsedProxy::Unparseable;
    };
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return ParsedProxy::Unparseable,
    };

    let username = Some(url.username())
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    ParsedProxy::Endpoint(ProxyEndpoint {
        kind,
        host,
        port: url.port().unwrap_or_else(|| kind.default_port()),
        username,
        password: url.password().map(str::to_string),
    })
}

/// A country/city code pair identifying an exit location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub country_code: String,
    pub city_code: String,
}

impl Location {
    pub fn new(country_code: impl Into<String>, city_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            city_code: city_code.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.country_code, self.city_code)
    }
}

/// A single VPN server as listed by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub hostname: String,
    #[serde(default)]
    pub weight: u32,
    /// Relay identifier; only servers carrying one can be used as exit relays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socks_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCity {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCountry {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub cities: Vec<ServerCity>,
}

/// Look up a city by its location codes; country codes compare case-insensitively
pub fn find_city<'a>(servers: &'a [ServerCountry], location: &Location) -> Option<&'a ServerCity> {
    servers
        .iter()
        .find(|country| country.code.eq_ignore_ascii_case(&location.country_code))
        .and_then(|country| {
            country
                .cities
                .iter()
                .find(|city| city.code.eq_ignore_ascii_case(&location.city_code))
        })
}

/// Relay endpoints of a city, heaviest server first
pub fn relay_endpoints(city: &ServerCity, relay_port: u16) -> Vec<ProxyEndpoint> {
    let mut relays: Vec<&Server> = city
        .servers
        .iter()
        .filter(|server| server.socks_name.is_some())
        .collect();
    relays.sort_by(|a, b| b.weight.cmp(&a.weight));
    relays
        .into_iter()
        .filter_map(|server| server.socks_name.as_deref())
        .map(|name| ProxyEndpoint::relay(name, relay_port))
        .collect()
}
