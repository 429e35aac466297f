use crate::error::XioError;
use url::Url;

/// URL schemes a native transport can open sessions on.
pub const SUPPORTED_SCHEMES: &[&str] = &["rdma", "tcp"];

/// Parses and validates a session URL such as `rdma://10.0.0.1:1234/`.
///
/// The host and port must both be present; the path and query are passed through
/// to the transport untouched.
pub fn parse_session_url(url_str: &str) -> Result<Url, XioError> {
  let invalid_endpoint_err = |why: &str| XioError::InvalidEndpoint(format!("{} ({})", url_str, why));

  let url = Url::parse(url_str).map_err(|e| XioError::from_url_error(e, url_str))?;

  if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
    return Err(XioError::UnsupportedTransport(url_str.to_string()));
  }
  match url.host_str() {
    Some(host) if !host.is_empty() => {}
    _ => return Err(invalid_endpoint_err("missing host")),
  }
  if url.port().is_none() {
    return Err(invalid_endpoint_err("missing port"));
  }
  Ok(url)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_valid_urls() {
    let url = parse_session_url("rdma://10.0.0.1:1234").unwrap();
    assert_eq!(url.scheme(), "rdma");
    assert_eq!(url.host_str(), Some("10.0.0.1"));
    assert_eq!(url.port(), Some(1234));

    let url = parse_session_url("tcp://server.local:5555/data?bufs=16").unwrap();
    assert_eq!(url.path(), "/data");
    assert_eq!(url.query(), Some("bufs=16"));
  }

  #[test]
  fn test_parse_rejects_unknown_scheme() {
    let err = parse_session_url("http://10.0.0.1:80").unwrap_err();
    assert!(matches!(err, XioError::UnsupportedTransport(_)));
  }

  #[test]
  fn test_parse_rejects_missing_parts() {
    assert!(matches!(parse_session_url("rdma://10.0.0.1"), Err(XioError::InvalidEndpoint(_))));
    assert!(matches!(parse_session_url("not a url"), Err(XioError::InvalidEndpoint(_))));
    assert!(matches!(parse_session_url("rdma:///path"), Err(XioError::InvalidEndpoint(_))));
  }
}
