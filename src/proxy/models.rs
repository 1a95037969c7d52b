//! Proxy data models

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Proxy protocol kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Http,
    Socks4,
    Socks5,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Socks4 => "socks4",
            ProxyKind::Socks5 => "socks5",
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(self, ProxyKind::Socks4 | ProxyKind::Socks5)
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyKind {
    type Err = ValidationError;

    /// Case-insensitive: "HTTP", "Socks5" and "socks4" are all accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyKind::Http),
            "socks4" => Ok(ProxyKind::Socks4),
            "socks5" => Ok(ProxyKind::Socks5),
            _ => Err(ValidationError::InvalidKind),
        }
    }
}

/// One configured upstream proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub address: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub kind: ProxyKind,
}

impl ProxyRecord {
    pub fn new(address: impl Into<String>, port: u16, kind: ProxyKind) -> Self {
        Self {
            address: address.into(),
            port,
            kind,
        }
    }

    /// Validate raw form input and build a normalized record
    pub fn parse(address: &str, port: &str, kind: &str) -> Result<Self, ValidationError> {
        let address = address.trim();
        let port = port.trim();
        if address.is_empty() || port.is_empty() {
            return Err(ValidationError::MissingAddressOrPort);
        }

        let port: i64 = port.parse().map_err(|_| ValidationError::InvalidPort)?;
        let kind: ProxyKind = kind.trim().parse()?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ValidationError::PortOutOfRange(port))?;

        Ok(Self::new(address, port, kind))
    }

    /// Get the proxy URL string
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.kind, self.address, self.port)
    }

    /// Get the proxy string in HOST:PORT format
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// List line, e.g. `proxy.example.com:8080 (http)`
    pub fn display_line(&self) -> String {
        format!("{} ({})", self.endpoint(), self.kind)
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_case_insensitive() {
        assert_eq!("HTTP".parse::<ProxyKind>().unwrap(), ProxyKind::Http);
        assert_eq!("Socks4".parse::<ProxyKind>().unwrap(), ProxyKind::Socks4);
        assert_eq!("socks5".parse::<ProxyKind>().unwrap(), ProxyKind::Socks5);
        assert_eq!("https".parse::<ProxyKind>(), Err(ValidationError::InvalidKind));
        assert_eq!("".parse::<ProxyKind>(), Err(ValidationError::InvalidKind));
    }

    #[test]
    fn test_record_parse_normalizes() {
        let record = ProxyRecord::parse("proxy.example.com", "8080", "HTTP").unwrap();
        assert_eq!(record.address, "proxy.example.com");
        assert_eq!(record.port, 8080);
        assert_eq!(record.kind, ProxyKind::Http);
    }

    #[test]
    fn test_record_parse_rejections() {
        assert_eq!(
            ProxyRecord::parse("", "8080", "http"),
            Err(ValidationError::MissingAddressOrPort)
        );
        assert_eq!(
            ProxyRecord::parse("10.0.0.1", "", "http"),
            Err(ValidationError::MissingAddressOrPort)
        );
        assert_eq!(
            ProxyRecord::parse("10.0.0.1", "80a", "http"),
            Err(ValidationError::InvalidPort)
        );
        assert_eq!(
            ProxyRecord::parse("10.0.0.1", "8080", "ftp"),
            Err(ValidationError::InvalidKind)
        );
        assert_eq!(
            ProxyRecord::parse("10.0.0.1", "70000", "http"),
            Err(ValidationError::PortOutOfRange(70000))
        );
        assert_eq!(
            ProxyRecord::parse("10.0.0.1", "-1", "http"),
            Err(ValidationError::PortOutOfRange(-1))
        );
        assert_eq!(
            ProxyRecord::parse("10.0.0.1", "0", "http"),
            Err(ValidationError::PortOutOfRange(0))
        );
    }

    #[test]
    fn test_port_checked_before_kind() {
        assert_eq!(
            ProxyRecord::parse("10.0.0.1", "abc", "ftp"),
            Err(ValidationError::InvalidPort)
        );
    }

    #[test]
    fn test_record_strings() {
        let record = ProxyRecord::new("192.168.1.1", 1080, ProxyKind::Socks5);
        assert_eq!(record.url(), "socks5://192.168.1.1:1080");
        assert_eq!(record.endpoint(), "192.168.1.1:1080");
        assert_eq!(record.display_line(), "192.168.1.1:1080 (socks5)");
    }

    #[test]
    fn test_record_json_keys() {
        let record = ProxyRecord::new("proxy.example.com", 8080, ProxyKind::Http);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"address": "proxy.example.com", "port": 8080, "type": "http"})
        );
    }
}
