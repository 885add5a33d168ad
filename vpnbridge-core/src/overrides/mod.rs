//! Per-origin routing overrides
//!
//! A [`SiteContext`] either excludes an origin from the tunnel or pins it
//! to the relays of one exit location.

use crate::error::OverrideError;
use crate::types::{find_city, relay_endpoints, Location, ProxyEndpoint, ServerCountry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

pub mod store;

pub use store::OverrideStore;

/// Routing override for one origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContext {
    pub origin: String,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_code: Option<String>,
    #[serde(default)]
    pub proxy_info: Vec<ProxyEndpoint>,
}

impl SiteContext {
    /// Route the origin through the relays of a location
    pub fn pinned(origin: String, location: &Location, proxy_info: Vec<ProxyEndpoint>) -> Self {
        Self {
            origin,
            excluded: false,
            country_code: Some(location.country_code.clone()),
            city_code: Some(location.city_code.clone()),
            proxy_info,
        }
    }

    /// Keep the origin out of the tunnel
    pub fn excluded(origin: String, bypass: Option<ProxyEndpoint>) -> Self {
        Self {
            origin,
            excluded: true,
            country_code: None,
            city_code: None,
            proxy_info: bypass.into_iter().collect(),
        }
    }
}

/// All overrides, keyed by normalised origin
pub type SiteMap = BTreeMap<String, SiteContext>;

/// Relay endpoints for a location, heaviest server first
///
/// Fails when the location is not in the server list or has no relays.
pub fn get_proxies(
    country_code: &str,
    city_code: &str,
    servers: &[ServerCountry],
    relay_port: u16,
) -> Result<Vec<ProxyEndpoint>, OverrideError> {
    let location = Location::new(country_code, city_code);
    let city = find_city(servers, &location).ok_or_else(|| OverrideError::UnknownLocation {
        country_code: country_code.to_string(),
        city_code: city_code.to_string(),
    })?;

    let relays = relay_endpoints(city, relay_port);
    if relays.is_empty() {
        return Err(OverrideError::NoRelays {
            country_code: country_code.to_string(),
            city_code: city_code.to_string(),
        });
    }
    Ok(relays)
}

/// Reduce a URL or origin to `scheme://host[:port]`
///
/// Default ports are dropped and the host is lowercased.
pub fn normalize_origin(input: &str) -> Result<String, OverrideError> {
    let invalid = || OverrideError::InvalidOrigin {
        origin: input.to_string(),
    };

    let url = Url::parse(input.trim()).map_err(|_| invalid())?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(invalid());
    }
    Ok(origin.ascii_serialization())
}
