//! Shared networking constants and helpers used by client and server.

/// Default HTTP port of the cache server.
pub const HTTP_PORT: u16 = 8080;
/// Prefix of every versioned API route.
pub const API_PREFIX: &str = "/api/v1";

/// Helper to format an address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}

/// Absolute URL of a versioned API route on `base` (e.g. `http://127.0.0.1:8080`).
pub fn api_url(base: &str, route: &str) -> String {
    format!("{}{}{}", base.trim_end_matches('/'), API_PREFIX, route)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_joins_without_double_slash() {
        assert_eq!(
            api_url("http://127.0.0.1:8080/", "/quotes"),
            "http://127.0.0.1:8080/api/v1/quotes"
        );
        assert_eq!(addr("0.0.0.0", HTTP_PORT), "0.0.0.0:8080");
    }
}
