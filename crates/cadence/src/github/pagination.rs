//! Link-header pagination helpers.

/// Pagination information extracted from GitHub's `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPagination {
    /// Full URL of the next page (from `rel="next"`).
    pub next_url: Option<String>,
    /// The last page number (from `rel="last"`), when present.
    pub last_page: Option<u32>,
}

/// Parse the Link header to extract pagination info.
///
/// GitHub Link headers look like:
/// `<https://api.github.com/repositories/1/actions/runs?per_page=100&page=2>; rel="next", <...&page=3>; rel="last"`
#[must_use]
pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut info = LinkPagination::default();

    for part in link_header.split(',') {
        let part = part.trim();

        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some(rel_type)) = (url, rel) {
            match rel_type {
                "next" => info.next_url = Some(url.to_string()),
                "last" => info.last_page = extract_page_from_url(url),
                _ => {}
            }
        }
    }

    info
}

/// Extract the `page` query parameter from a URL.
fn extract_page_from_url(url: &str) -> Option<u32> {
    let query_start = url.find('?')?;
    let query = &url[query_start + 1..];

    for param in query.split('&') {
        if let Some(value) = param.strip_prefix("page=") {
            return value.parse().ok();
        }
    }

    None
}
