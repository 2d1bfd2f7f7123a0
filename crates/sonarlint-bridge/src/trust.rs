//! Origin trust checks.

use crate::model::Connection;

/// Whether `origin` belongs to one of the configured connections.
///
/// Plain string prefix on the connection host: an origin is
/// `scheme://host[:port]`, which is exactly how a connection's base URL starts.
/// An empty origin is never trusted.
#[must_use]
pub fn is_trusted_origin(origin: &str, connections: &[Connection]) -> bool {
    if origin.is_empty() {
        return false;
    }
    connections
        .iter()
        .any(|connection| connection.host.starts_with(origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(id: &str, host: &str) -> Connection {
        Connection::new(id, host)
    }

    #[test]
    fn origin_matching_a_host_prefix_is_trusted() {
        let connections = vec![
            connection("cloud", "https://sonarcloud.io"),
            connection("local", "http://localhost:9000/sonar"),
        ];
        assert!(is_trusted_origin("http://localhost:9000", &connections));
        assert!(is_trusted_origin("https://sonarcloud.io", &connections));
    }

    #[test]
    fn unrelated_origin_is_not_trusted() {
        let connections = vec![connection("local", "http://localhost:9000")];
        assert!(!is_trusted_origin("http://localhost:9001", &connections));
        assert!(!is_trusted_origin("https://localhost:9000", &connections));
        assert!(!is_trusted_origin("null", &connections));
    }

    #[test]
    fn empty_origin_or_no_connections_is_not_trusted() {
        assert!(!is_trusted_origin("", &[connection("a", "http://a")]));
        assert!(!is_trusted_origin("http://a", &[]));
    }
}
