use axum::http::header::{HeaderMap, AUTHORIZATION, COOKIE};

/// Pulls the access token out of `Authorization: Bearer <token>`, trimmed of
/// surrounding whitespace. Anything else yields an empty string.
pub fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

/// Pulls `refresh_token=<value>` out of the `Cookie` header (up to the next
/// `;`). Values that are not exactly 64 lower-hex characters are treated as
/// absent.
pub fn refresh_token(headers: &HeaderMap) -> String {
    let Some(cookie_header) = headers.get(COOKIE).and_then(|value| value.to_str().ok()) else {
        return String::new();
    };

    const KEY: &str = "refresh_token=";
    let Some(start) = cookie_header.find(KEY) else {
        return String::new();
    };
    let rest = &cookie_header[start + KEY.len()..];
    let value = match rest.find(';') {
        Some(end) => &rest[..end],
        None => rest,
    };
    let value = value.trim();

    if value.len() != 64
        || !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return String::new();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: axum::http::HeaderName, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn bearer_token_strips_prefix_and_whitespace() {
        let map = headers(AUTHORIZATION, "Bearer   abc.def.ghi  ");
        assert_eq!(bearer_token(&map), "abc.def.ghi");
    }

    #[test]
    fn bearer_token_rejects_other_schemes() {
        assert_eq!(bearer_token(&headers(AUTHORIZATION, "Basic abc")), "");
        assert_eq!(bearer_token(&headers(AUTHORIZATION, "Bearer ")), "");
        assert_eq!(bearer_token(&HeaderMap::new()), "");
    }

    #[test]
    fn refresh_token_parses_up_to_semicolon() {
        let token = "0f".repeat(32);
        let map = headers(COOKIE, &format!("refresh_token={token}; theme=dark"));
        assert_eq!(refresh_token(&map), token);

        let map = headers(COOKIE, &format!("session=1; refresh_token={token}"));
        assert_eq!(refresh_token(&map), token);
    }

    #[test]
    fn refresh_token_enforces_64_lower_hex() {
        let short = "0f".repeat(31);
        assert_eq!(
            refresh_token(&headers(COOKIE, &format!("refresh_token={short}"))),
            ""
        );

        let upper = "0F".repeat(32);
        assert_eq!(
            refresh_token(&headers(COOKIE, &format!("refresh_token={upper}"))),
            ""
        );

        assert_eq!(refresh_token(&HeaderMap::new()), "");
    }
}
