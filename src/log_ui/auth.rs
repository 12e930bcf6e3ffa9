//! HTTP Basic authentication for the log viewer.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::log_ui::LogUiState;

pub async fn basic_auth_middleware(
    State(state): State<LogUiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match credentials(request.headers()) {
        Some((user, password)) if user == state.username && password == state.password => {
            next.run(request).await
        }
        _ => unauthorized(),
    }
}

/// Decode `Authorization: Basic <base64(user:password)>`.
fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"log-ui\""),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_decodes_basic_credentials() {
        let encoded = STANDARD.encode("admin:s3cr:et");
        let parsed = credentials(&with_auth(&format!("Basic {}", encoded)));
        assert_eq!(parsed, Some(("admin".into(), "s3cr:et".into())));
    }

    #[test]
    fn test_rejects_other_schemes_and_garbage() {
        assert_eq!(credentials(&HeaderMap::new()), None);
        assert_eq!(credentials(&with_auth("Bearer abc")), None);
        assert_eq!(credentials(&with_auth("Basic !!!")), None);
        let no_colon = STANDARD.encode("admin");
        assert_eq!(credentials(&with_auth(&format!("Basic {}", no_colon))), None);
    }
}
