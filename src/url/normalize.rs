use url::Url;

/// Reduces a URL to its canonical string form
///
/// The fragment is dropped; everything else is kept as the `url` crate
/// serializes it.
///
/// # Examples
///
/// ```
/// use site_crawl::url::normalize;
/// use url::Url;
///
/// let url = Url::parse("http://base.org/page#section").unwrap();
/// assert_eq!(normalize(&url), "http://base.org/page");
/// ```
pub fn normalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// Resolves a raw `href` value against the URL of the document it came from
///
/// Absolute links pass through untouched and relative links are resolved with
/// standard reference resolution. The fragment is stripped from the result.
///
/// An empty `href` refers to the document itself. Returns None if the link
/// cannot be resolved to a valid URL.
pub fn resolve_link(href: &str, document_url: &Url) -> Option<Url> {
    let mut resolved = document_url.join(href.trim()).ok()?;
    resolved.set_fragment(None);
    Some(resolved)
}
