use super::PushError;

/// Derives the push endpoint from the backend's HTTP base address.
///
/// `https` maps to `wss` and `http` to `ws`; a trailing slash on the base is dropped
/// before `path` is appended.
pub fn push_endpoint(backend_url: &str, path: &str) -> Result<String, PushError> {
    let backend_url = backend_url.trim();
    let ws_base = if let Some(rest) = backend_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = backend_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return Err(PushError::InvalidEndpoint(backend_url.to_string()));
    };

    let ws_base = ws_base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(format!("{}/{}", ws_base, path))
}
