//! A minimal, purpose-built cookie jar.
//!
//! The Service's cookie contract is exactly two cookies, `auth` and
//! `twoFactorAuth`; a generic cookie-jar crate would happily reorder or drop
//! attributes we don't care about, so this is a small struct plus a
//! `Set-Cookie` parser written against the header corpus in SPEC_FULL.md §8.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    pub auth: Option<String>,
    pub two_factor_auth: Option<String>,
}

impl CookieJar {
    pub fn new(auth: Option<String>, two_factor_auth: Option<String>) -> Self {
        Self {
            auth,
            two_factor_auth,
        }
    }

    /// The `Cookie:` request header value, e.g.
    /// `auth=<authCookie>; twoFactorAuth=<twoFactorCookie>`. Either side may
    /// be empty at the pre-2FA stage but both keys are always present.
    pub fn to_header_value(&self) -> String {
        format!(
            "auth={}; twoFactorAuth={}",
            self.auth.as_deref().unwrap_or(""),
            self.two_factor_auth.as_deref().unwrap_or("")
        )
    }

    /// Merge newly observed cookies (from a `Set-Cookie` response) into this
    /// jar, keeping whichever values are present in `other`.
    pub fn merge(&mut self, other: &CookieJar) {
        if other.auth.is_some() {
            self.auth = other.auth.clone();
        }
        if other.two_factor_auth.is_some() {
            self.two_factor_auth = other.two_factor_auth.clone();
        }
    }
}

/// Parse every `Set-Cookie` header value present on a response, extracting
/// `auth` and `twoFactorAuth` name/value pairs. A single header value may
/// carry multiple cookies separated by commas that appear outside attribute
/// quoting (rare in practice for this Service, but handled defensively);
/// each header value itself describes one `name=value; attr=...` cookie per
/// RFC 6265, so in practice callers pass one header value per invocation
/// and this function is called once per `Set-Cookie` line.
pub fn parse_set_cookie_headers<'a>(values: impl IntoIterator<Item = &'a str>) -> CookieJar {
    let mut jar = CookieJar::default();
    for value in values {
        for cookie in split_cookie_header(value) {
            if let Some((name, val)) = parse_single_cookie(&cookie) {
                match name.as_str() {
                    "auth" => jar.auth = Some(val),
                    "twoFactorAuth" => jar.two_factor_auth = Some(val),
                    _ => {}
                }
            }
        }
    }
    jar
}

/// Split a `Set-Cookie` header on commas that are not inside a quoted
/// attribute value (e.g. `Expires="Wed, 09 Jun 2021 10:18:14 GMT"`).
fn split_cookie_header(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Extract the leading `name=value` pair from one cookie's header segment,
/// discarding any trailing `; attr=...` pieces.
fn parse_single_cookie(segment: &str) -> Option<(String, String)> {
    let first = segment.split(';').next()?.trim();
    let (name, value) = first.split_once('=')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}
