use crate::foundation::error::{Mp3ifyError, Mp3ifyResult};

/// Extract the resource identifier from a share link of the form `.../d/<id>/...`.
///
/// The identifier is the first run of non-`/` characters that is both preceded by `/d/` and
/// followed by `/`. `https://drive.example.com/d/ABC123/view` yields `ABC123`.
pub fn extract_resource_id(url: &str) -> Mp3ifyResult<&str> {
    let mut search_from = 0;
    while let Some(pos) = url[search_from..].find("/d/") {
        let start = search_from + pos + 3;
        let rest = &url[start..];
        if let Some(end) = rest.find('/')
            && end > 0
        {
            return Ok(&rest[..end]);
        }
        // Retry from the `/` that closed the empty or unterminated segment.
        search_from = search_from + pos + 1;
    }
    Err(Mp3ifyError::invalid_url(url))
}
