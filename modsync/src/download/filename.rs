//! Choosing the on-disk name of a downloaded archive.

/// Pick the file name for a package download.
///
/// Order of preference: the `content-disposition` header (`filename*` before
/// `filename`), the last non-empty path segment of `url`, then
/// `<package>.bin`. Path separators are stripped from whatever is chosen.
pub fn resolve_file_name(content_disposition: Option<&str>, url: &str, package: &str) -> String {
    content_disposition
        .and_then(parse_content_disposition_filename)
        .map(|name| sanitize(&name))
        .filter(|name| is_usable(name))
        .or_else(|| {
            last_path_segment(url)
                .map(|name| sanitize(&name))
                .filter(|name| is_usable(name))
        })
        .unwrap_or_else(|| format!("{}.bin", sanitize(package)))
}

/// Human-readable name of a download: the file name up to its first `.`.
pub fn display_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Extract the file name from a `content-disposition` header value.
///
/// Handles `filename="quoted"`, `filename=token` and the RFC 5987
/// `filename*=UTF-8''percent%20encoded` form, which wins when both appear.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in header_value.trim().split(';') {
        let Some((name, value)) = param.trim().split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();

        if name == "filename*" {
            let encoded = value
                .split_once("''")
                .filter(|(charset, _)| charset.eq_ignore_ascii_case("utf-8"))
                .map(|(_, rest)| rest);
            if let Some(decoded) = encoded.map(percent_decode) {
                let decoded = unquote(&decoded);
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
        } else if name == "filename" {
            let value = unquote(value);
            if !value.is_empty() {
                plain = Some(value);
            }
        }
    }

    plain
}

fn last_path_segment(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    Some(percent_decode(segment))
}

fn sanitize(name: &str) -> String {
    name.chars().filter(|c| !matches!(c, '/' | '\\')).collect::<String>()
}

fn is_usable(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".."
}

/// Strip surrounding quotes and unescape `\"` and `\\`.
fn unquote(value: &str) -> String {
    let inner = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner,
        None => return value.to_string(),
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '"' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(high << 4 | low);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
