//! Href construction shared by item building and catalog rebasing.
//!
//! Hrefs are either URLs or local filesystem paths. URLs follow standard
//! URL-joining rules; local paths are joined with `/` and normalised.
use url::Url;

/// Whether the href must go through the network path of a store.
pub fn is_http(href: &str) -> bool {
    Url::parse(href)
        .map(|url| url.scheme().starts_with("http"))
        .unwrap_or(false)
}

pub fn is_absolute(href: &str) -> bool {
    href.starts_with('/') || Url::parse(href).is_ok()
}

/// Joins `relative` onto `base`, treating `base` as a directory whether or
/// not it ends with a slash.
pub fn join(base: &str, relative: &str) -> Result<String, url::ParseError> {
    let base = base.trim_end_matches('/');
    if Url::parse(base).is_ok() {
        let dir = Url::parse(&format!("{base}/"))?;
        return Ok(dir.join(relative)?.to_string());
    }
    if base.is_empty() {
        return Ok(normalize(relative));
    }
    Ok(normalize(&format!("{base}/{relative}")))
}

/// Resolves a link target found in the document at `document`. A
/// root-relative target of a URL document stays on the document's host.
pub fn resolve(document: &str, target: &str) -> Result<String, url::ParseError> {
    if Url::parse(target).is_ok() {
        return Ok(target.to_string());
    }
    match Url::parse(document) {
        Ok(url) => Ok(url.join(target)?.to_string()),
        Err(_) if target.starts_with('/') => Ok(target.to_string()),
        Err(_) => join(parent(document), target),
    }
}

/// Everything before the last `/`.
pub fn parent(href: &str) -> &str {
    href.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = vec![];
    for part in path.split('/') {
        match part {
            "." => {}
            ".." if parts.last().is_some_and(|p| !p.is_empty() && *p != "..") => {
                parts.pop();
            }
            "" if !parts.is_empty() => {}
            _ => parts.push(part),
        }
    }
    parts.join("/")
}
