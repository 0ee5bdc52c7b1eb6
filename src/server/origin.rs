use axum::{
    extract::Request,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Rejects form posts sent from another site; those still carry the
/// browser's cached Basic credentials.
pub async fn same_origin(request: Request, next: Next) -> Response {
    if request.method() == Method::POST && !is_same_origin(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "rejected cross-origin form post");
        return (StatusCode::FORBIDDEN, "Cross-origin form submission rejected").into_response();
    }
    next.run(request).await
}

/// `Origin`, or `Referer` when there is no `Origin`, must name the `Host`.
/// Requests carrying neither come from non-browser clients and pass.
fn is_same_origin(headers: &HeaderMap) -> bool {
    let source = headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER));
    let Some(source) = source else {
        return true;
    };
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    source
        .to_str()
        .ok()
        .and_then(|s| s.parse::<Uri>().ok())
        .and_then(|uri| uri.authority().map(|a| a.as_str().eq_ignore_ascii_case(host)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_matching_origin_passes() {
        let h = headers(&[
            (header::HOST, "127.0.0.1:5876"),
            (header::ORIGIN, "http://127.0.0.1:5876"),
        ]);
        assert!(is_same_origin(&h));
    }

    #[test]
    fn test_foreign_origin_rejected() {
        let h = headers(&[
            (header::HOST, "127.0.0.1:5876"),
            (header::ORIGIN, "https://evil.example"),
        ]);
        assert!(!is_same_origin(&h));
        let opaque = headers(&[(header::HOST, "127.0.0.1:5876"), (header::ORIGIN, "null")]);
        assert!(!is_same_origin(&opaque));
    }

    #[test]
    fn test_referer_used_without_origin() {
        let ok = headers(&[
            (header::HOST, "tasks.local"),
            (header::REFERER, "http://tasks.local/tasks/3"),
        ]);
        assert!(is_same_origin(&ok));
        let foreign = headers(&[
            (header::HOST, "tasks.local"),
            (header::REFERER, "http://evil.example/page"),
        ]);
        assert!(!is_same_origin(&foreign));
    }

    #[test]
    fn test_headerless_clients_pass() {
        assert!(is_same_origin(&headers(&[(header::HOST, "tasks.local")])));
    }
}
