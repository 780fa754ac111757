//! Google Drive share links.
//!
//! A share link (`/file/d/<id>/view`, `/open?id=<id>`) answers with an HTML
//! viewer page, and a plain `uc?export=download` link answers large files
//! with a virus-scan confirmation page. Both are rewritten to the direct
//! download endpoint with the confirmation already given.

use reqwest::Url;

const DRIVE_HOSTS: [&str; 2] = ["drive.google.com", "docs.google.com"];

/// Direct download URL for a Google Drive link, or `None` for any other URL.
pub fn direct_download_url(url: &str) -> Option<String> {
    let id = drive_file_id(url)?;
    Some(format!(
        "https://drive.google.com/uc?export=download&id={}&confirm=t",
        id
    ))
}

/// The file id of a Google Drive link.
pub fn drive_file_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !DRIVE_HOSTS.contains(&host.as_str()) {
        return None;
    }

    let from_path = parsed.path_segments().and_then(|segments| {
        let segments: Vec<&str> = segments.collect();
        segments
            .windows(3)
            .find(|w| w[0] == "file" && w[1] == "d")
            .map(|w| w[2].to_string())
    });

    let id = from_path.or_else(|| {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
    })?;

    is_valid_id(&id).then_some(id)
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
