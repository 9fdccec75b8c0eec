use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// The application environment, derived from the `env` setting.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Env {
    #[default]
    Development,
    Production,
    Other(String),
}

/// How the client address is derived when the application sits behind one
/// or more reverse proxies. See [`Settings::trust_proxy`].
///
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TrustProxy {
    /// `X-Forwarded-For` is ignored; the transport peer is the client.
    #[default]
    Disabled,

    /// Every hop is trusted; the leftmost `X-Forwarded-For` entry wins.
    All,

    /// Trust at most this many hops counted from the transport peer.
    Hops(usize),

    /// Trust hops whose address falls in one of the listed subnets.
    Subnets(Vec<Cidr>),
}

/// How response ETags are generated for buffered payloads.
///
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum EtagMode {
    #[default]
    Weak,
    Strong,
    Disabled,
}

/// Which query-string grammar `Request::query` uses.
///
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum QueryParserMode {
    /// Flat `name=value` pairs; repeated names collect into an array.
    Simple,

    /// Additionally parses bracketed paths such as `a[b][c]=1` into
    /// nested objects and `a[]=1` into arrays.
    #[default]
    Extended,

    /// The query string is never parsed.
    Disabled,
}

/// A value stored for a setting key the framework does not recognize.
/// Unrecognized settings are stored verbatim and have no effect.
///
#[derive(Clone, Debug, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// An IPv4 or IPv6 subnet in CIDR notation.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Cidr {
    address: IpAddr,
    prefix: u8,
}

/// The application settings store.
///
/// Recognized settings are typed fields with documented effects.
/// Unrecognized keys are kept in a side table so they remain returnable.
/// The store lives behind a read-write lock on the application so writes
/// made after the server starts are published to readers on other threads.
///
#[derive(Clone, Debug)]
pub struct Settings {
    pub case_sensitive_routing: bool,
    pub strict_routing: bool,
    pub env: Env,
    pub trust_proxy: TrustProxy,
    pub json_spaces: usize,
    pub json_escape: bool,
    pub query_parser: QueryParserMode,
    pub etag: EtagMode,
    pub x_powered_by: bool,
    pub jsonp_callback_name: String,
    pub view_engine: Option<String>,
    pub views: PathBuf,
    pub view_cache: bool,
    pub subdomain_offset: usize,
    extra: HashMap<String, SettingValue>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            case_sensitive_routing: false,
            strict_routing: false,
            env: Env::from_env(),
            trust_proxy: TrustProxy::Disabled,
            json_spaces: 0,
            json_escape: false,
            query_parser: QueryParserMode::Extended,
            etag: EtagMode::Weak,
            x_powered_by: true,
            jsonp_callback_name: "callback".to_owned(),
            view_engine: None,
            views: PathBuf::from("views"),
            view_cache: false,
            subdomain_offset: 2,
            extra: HashMap::new(),
        }
    }
}

impl Env {
    /// Reads the environment from the `NODE_ENV`-equivalent `APP_ENV`
    /// variable, defaulting to development.
    ///
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV") {
            Ok(value) => Self::from(value.as_str()),
            Err(_) => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl From<&str> for Env {
    fn from(value: &str) -> Self {
        match value {
            "development" => Self::Development,
            "production" => Self::Production,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value for a key the framework does not recognize. The value
    /// is returnable via [`Settings::get_raw`] but has no other effect.
    ///
    pub fn set_raw(&mut self, key: impl Into<String>, value: SettingValue) {
        self.extra.insert(key.into(), value);
    }

    pub fn get_raw(&self, key: &str) -> Option<&SettingValue> {
        self.extra.get(key)
    }
}

impl TrustProxy {
    /// Returns the client address for the provided transport peer and
    /// `X-Forwarded-For` entries (leftmost entry first).
    ///
    /// With a hop count, at most that many forwarded entries are trusted,
    /// counted from the peer. With a subnet list, entries are walked from
    /// the peer towards the client and the first address outside the
    /// trusted subnets wins.
    ///
    pub fn resolve(&self, peer: IpAddr, forwarded: &[IpAddr]) -> IpAddr {
        match self {
            Self::Disabled => peer,

            Self::All => forwarded.first().copied().unwrap_or(peer),

            Self::Hops(count) => {
                if *count == 0 || forwarded.is_empty() {
                    peer
                } else {
                    // The rightmost entry is one hop away from the peer.
                    let index = forwarded.len().saturating_sub(*count);
                    forwarded[index]
                }
            }

            Self::Subnets(subnets) => {
                let mut client = peer;

                for address in forwarded.iter().rev() {
                    if subnets.iter().any(|subnet| subnet.contains(&client)) {
                        client = *address;
                    } else {
                        break;
                    }
                }

                client
            }
        }
    }
}

impl Cidr {
    /// Parses `"10.0.0.0/8"`-style notation. A bare address is treated as
    /// a host subnet.
    ///
    pub fn parse(input: &str) -> Option<Self> {
        let (address, prefix) = match input.split_once('/') {
            Some((address, prefix)) => (address.parse().ok()?, prefix.parse().ok()?),
            None => {
                let address: IpAddr = input.parse().ok()?;
                let prefix = if address.is_ipv4() { 32 } else { 128 };
                (address, prefix)
            }
        };

        let max = if matches!(address, IpAddr::V4(_)) {
            32
        } else {
            128
        };

        if prefix > max {
            return None;
        }

        Some(Self { address, prefix })
    }

    /// Returns true if the provided address falls inside the subnet.
    ///
    pub fn contains(&self, address: &IpAddr) -> bool {
        match (&self.address, address) {
            (IpAddr::V4(network), IpAddr::V4(address)) => {
                let bits = 32 - u32::from(self.prefix);
                let network = u32::from_be_bytes(network.octets());
                let address = u32::from_be_bytes(address.octets());

                bits >= 32 || (network >> bits) == (address >> bits)
            }
            (IpAddr::V6(network), IpAddr::V6(address)) => {
                let bits = 128 - u32::from(self.prefix);
                let network = u128::from_be_bytes(network.octets());
                let address = u128::from_be_bytes(address.octets());

                bits >= 128 || (network >> bits) == (address >> bits)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cidr, Settings, SettingValue, TrustProxy};
    use std::net::IpAddr;

    fn ip(input: &str) -> IpAddr {
        input.parse().unwrap()
    }

    #[test]
    fn unrecognized_keys_are_stored_and_returnable() {
        let mut settings = Settings::new();

        settings.set_raw("custom flag", SettingValue::Bool(true));

        assert_eq!(
            settings.get_raw("custom flag"),
            Some(&SettingValue::Bool(true))
        );
        assert_eq!(settings.get_raw("missing"), None);
    }

    #[test]
    fn cidr_membership() {
        let subnet = Cidr::parse("10.0.0.0/8").unwrap();

        assert!(subnet.contains(&ip("10.1.2.3")));
        assert!(!subnet.contains(&ip("11.0.0.1")));

        let host = Cidr::parse("127.0.0.1").unwrap();
        assert!(host.contains(&ip("127.0.0.1")));
        assert!(!host.contains(&ip("127.0.0.2")));
    }

    #[test]
    fn trust_proxy_disabled_ignores_forwarded_entries() {
        let trust = TrustProxy::Disabled;
        let client = trust.resolve(ip("10.0.0.1"), &[ip("203.0.113.9")]);

        assert_eq!(client, ip("10.0.0.1"));
    }

    #[test]
    fn trust_proxy_hops_is_bounded() {
        let forwarded = [ip("203.0.113.9"), ip("10.0.0.2"), ip("10.0.0.3")];

        // One hop: only the rightmost forwarded entry is trusted.
        let trust = TrustProxy::Hops(1);
        assert_eq!(trust.resolve(ip("10.0.0.4"), &forwarded), ip("10.0.0.3"));

        // Enough hops to reach the leftmost entry.
        let trust = TrustProxy::Hops(3);
        assert_eq!(trust.resolve(ip("10.0.0.4"), &forwarded), ip("203.0.113.9"));

        // More hops than entries clamps to the leftmost entry.
        let trust = TrustProxy::Hops(10);
        assert_eq!(trust.resolve(ip("10.0.0.4"), &forwarded), ip("203.0.113.9"));
    }

    #[test]
    fn trust_proxy_subnets_stop_at_the_first_untrusted_hop() {
        let trust = TrustProxy::Subnets(vec![Cidr::parse("10.0.0.0/8").unwrap()]);
        let forwarded = [ip("203.0.113.9"), ip("10.0.0.2")];

        assert_eq!(trust.resolve(ip("10.0.0.1"), &forwarded), ip("203.0.113.9"));

        // An untrusted peer means the peer itself is the client.
        assert_eq!(trust.resolve(ip("192.0.2.1"), &forwarded), ip("192.0.2.1"));
    }
}
