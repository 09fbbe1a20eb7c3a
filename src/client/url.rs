//! Parsing of Service-issued file asset URLs, e.g.
//! `https://api.vrchat.cloud/api/1/file/file_xxx/1/file` or a bare
//! `.../file/file_xxx`. Used to support file reuse on re-upload: the
//! orchestrator extracts `{id}` from a previously stored `assetUrl`.

/// Extract the `{id}` path component from a Service file URL of the shape
/// `.../file/{id}/{version}/{subresource}` or `.../file/{id}`.
pub fn parse_file_id(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let file_pos = segments.iter().position(|s| *s == "file")?;
    segments.get(file_pos + 1).map(|s| s.to_string())
}
