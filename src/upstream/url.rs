//! Source URL parsing
//!
//! Camera endpoints are plain `http://host[:port][/path]` addresses on the
//! local network, so a full URL crate would be dead weight. Anything that is
//! not plain http is rejected.

use crate::error::UpstreamError;

/// Parsed upstream endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    /// Host name or address
    pub host: String,
    /// TCP port (default 80)
    pub port: u16,
    /// Request path including any query (default `/`)
    pub path: String,
}

impl SourceUrl {
    /// Parse an `http://` URL
    pub fn parse(url: &str) -> Result<Self, UpstreamError> {
        let invalid = || UpstreamError::InvalidUrl(url.to_string());

        let rest = url.strip_prefix("http://").ok_or_else(invalid)?;
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Value for the HTTP `Host` header
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url() {
        let url = SourceUrl::parse("http://192.168.4.1:81/stream").unwrap();

        assert_eq!(url.host, "192.168.4.1");
        assert_eq!(url.port, 81);
        assert_eq!(url.path, "/stream");
        assert_eq!(url.host_header(), "192.168.4.1:81");
    }

    #[test]
    fn test_defaults() {
        let url = SourceUrl::parse("http://camera.local").unwrap();

        assert_eq!(url.host, "camera.local");
        assert_eq!(url.port, 80);
        assert_eq!(url.path, "/");
        assert_eq!(url.host_header(), "camera.local");
    }

    #[test]
    fn test_path_with_query() {
        let url = SourceUrl::parse("http://cam/stream?fps=10").unwrap();

        assert_eq!(url.path, "/stream?fps=10");
    }

    #[test]
    fn test_rejects_non_http() {
        assert!(SourceUrl::parse("https://cam/stream").is_err());
        assert!(SourceUrl::parse("rtsp://cam/stream").is_err());
        assert!(SourceUrl::parse("camera.local/stream").is_err());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(SourceUrl::parse("http://").is_err());
        assert!(SourceUrl::parse("http://:81/x").is_err());
        assert!(SourceUrl::parse("http://cam:notaport/x").is_err());
        assert!(SourceUrl::parse("http://cam:99999/x").is_err());
    }

    #[test]
    fn test_display() {
        let url = SourceUrl::parse("http://cam.local:8080/live").unwrap();

        assert_eq!(url.to_string(), "http://cam.local:8080/live");
    }
}
