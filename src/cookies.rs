// Cookie listing for the console
// Encrypted cookies are reported as such, never decrypted

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieEntry {
    pub name: String,
    pub value: Option<String>,
    pub encrypted: bool,
    pub raw: String,
}

/// Every cookie in the request's `Cookie` headers, in order
pub fn list_cookies(headers: &HeaderMap) -> Vec<CookieEntry> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, raw) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(entry(name, raw.trim()))
        })
        .collect()
}

fn entry(name: &str, raw: &str) -> CookieEntry {
    let decoded = url_decode(raw);
    let encrypted = is_encrypted(&decoded);
    CookieEntry {
        name: name.to_string(),
        value: if encrypted { None } else { Some(decoded) },
        encrypted,
        raw: raw.to_string(),
    }
}

fn url_decode(raw: &str) -> String {
    // form decoding turns '+' into spaces, which cookie values never mean
    let protected = raw.replace('+', "%2B");
    url::form_urlencoded::parse(format!("v={}", protected).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| raw.to_string())
}

/// Base64 JSON envelope with `iv`, `value` and `mac`
fn is_encrypted(value: &str) -> bool {
    let bytes = match general_purpose::STANDARD.decode(value.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => ["iv", "value", "mac"].iter().all(|k| map.contains_key(*k)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn plain_and_encrypted_cookies() {
        let envelope = general_purpose::STANDARD.encode(r#"{"iv":"a","value":"b","mac":"c"}"#);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark%20blue; session={}; broken", envelope)).unwrap(),
        );

        let cookies = list_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "theme");
        assert_eq!(cookies[0].value.as_deref(), Some("dark blue"));
        assert!(!cookies[0].encrypted);
        assert_eq!(cookies[1].name, "session");
        assert!(cookies[1].encrypted);
        assert_eq!(cookies[1].value, None);
        assert_eq!(cookies[1].raw, envelope);
    }

    #[test]
    fn base64_without_envelope_is_plain() {
        let other = general_purpose::STANDARD.encode(r#"{"iv":"a"}"#);
        assert!(!is_encrypted(&other));
        assert!(!is_encrypted("not base64!"));
    }

    #[test]
    fn no_cookie_header() {
        assert!(list_cookies(&HeaderMap::new()).is_empty());
    }
}
