use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context as _;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// A link harvested from a report page. `url` is always absolute; relative
/// hrefs are resolved against the page that carried them.
#[derive(Debug, Clone)]
pub struct Link {
    pub url: Url,
    pub text: String,
    pub is_document: bool,
    pub is_folder: bool,
}

const LINK_TEXT_LIMIT: usize = 200;

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// CivicWeb document centers expose a folder tree under this path and
/// serve each document from an id-addressed endpoint.
pub fn is_document_center(url: &Url) -> bool {
    url.path().contains("/filepro/documents")
}

/// Fetch a page and return its candidate links. Transport and parse
/// failures degrade to an empty list: a page we cannot read is a page
/// with nothing on it, never a fatal error.
pub async fn extract_links(client: &reqwest::Client, page_url: &Url) -> Vec<Link> {
    match fetch_html(client, page_url).await {
        Ok(html) => {
            if is_document_center(page_url) {
                parse_document_center(&html, page_url)
            } else {
                parse_anchors(&html, page_url)
            }
        }
        Err(err) => {
            tracing::warn!(?err, url = %page_url, "page fetch failed");
            Vec::new()
        }
    }
}

async fn fetch_html(client: &reqwest::Client, url: &Url) -> anyhow::Result<String> {
    let response = client
        .get(url.clone())
        .timeout(PAGE_FETCH_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .context("page status")?;

    response.text().await.context("read page body")
}

/// Generic strategy: every anchor on the page, resolved to absolute.
fn parse_anchors(html: &str, base: &Url) -> Vec<Link> {
    let document = Html::parse_document(html);
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            continue;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            continue;
        }

        let text = truncate_text(&element.text().collect::<String>());
        let is_document = looks_like_document(&text, url.as_str());
        links.push(Link {
            url,
            text,
            is_document,
            is_folder: false,
        });
    }

    links
}

/// Generic sites serve reports from ambiguous download paths that also
/// serve logos and forms; requiring a document-looking URL *and*
/// report-looking text keeps the false positives down.
pub fn looks_like_document(text: &str, url: &str) -> bool {
    let url_lower = url.to_lowercase();
    if url_lower.ends_with(".pdf") {
        return true;
    }

    let url_segments = ["/media/", "/document/", "/files/", "/download/", "/assets/"];
    if !url_segments.iter().any(|segment| url_lower.contains(segment)) {
        return false;
    }

    let text_lower = text.to_lowercase();
    let text_keywords = [
        "annual report", "financial statement", "sofi", "view", "download", "report",
    ];
    text_keywords.iter().any(|kw| text_lower.contains(kw))
}

const FOLDER_KEYWORDS: [&str; 6] = ["report", "finance", "financial", "annual", "statement", "sofi"];

/// Document-center strategy: documents are tagged with structured data
/// attributes and served from `/document/{id}`, bypassing the listing
/// page entirely. Folders become navigable links, but only when their
/// title sounds financial; anything else is out of bounds.
fn parse_document_center(html: &str, page_url: &Url) -> Vec<Link> {
    let document = Html::parse_document(html);
    let Some(origin) = page_origin(page_url) else {
        return Vec::new();
    };

    let mut links = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    if let Ok(selector) = Selector::parse(r#"[data-type="document"]"#) {
        for element in document.select(&selector) {
            let Some(doc_id) = element.value().attr("data-id") else {
                continue;
            };
            if !seen_ids.insert(doc_id.to_owned()) {
                continue;
            }

            let title = element.value().attr("data-title").unwrap_or_default();
            let Ok(url) = Url::parse(&format!("{origin}/document/{doc_id}")) else {
                continue;
            };
            links.push(Link {
                url,
                text: truncate_text(title),
                is_document: true,
                is_folder: false,
            });
        }
    }

    // Documents missing the structured attributes still show up as plain
    // /document/{id} anchors.
    if let Ok(anchor) = Selector::parse("a[href]")
        && let Ok(id_pattern) = Regex::new(r"/document/(\d+)")
    {
        for element in document.select(&anchor) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !href.contains("/document/") || href.contains("filepro") {
                continue;
            }
            let Some(cap) = id_pattern.captures(href) else {
                continue;
            };
            let doc_id = cap[1].to_owned();
            if !seen_ids.insert(doc_id.clone()) {
                continue;
            }

            let text = match element.value().attr("title") {
                Some(title) if !title.is_empty() => truncate_text(title),
                _ => truncate_text(&element.text().collect::<String>()),
            };
            let Ok(url) = Url::parse(&format!("{origin}/document/{doc_id}")) else {
                continue;
            };
            links.push(Link {
                url,
                text,
                is_document: true,
                is_folder: false,
            });
        }
    }

    if let Ok(selector) = Selector::parse(r#"[data-type="folder"]"#) {
        for element in document.select(&selector) {
            let Some(folder_id) = element.value().attr("data-id") else {
                continue;
            };
            let title = element.value().attr("data-title").unwrap_or_default();
            let title_lower = title.to_lowercase();
            if !FOLDER_KEYWORDS.iter().any(|kw| title_lower.contains(kw)) {
                continue;
            }

            let Ok(url) = Url::parse(&format!("{origin}/filepro/documents/{folder_id}/")) else {
                continue;
            };
            links.push(Link {
                url,
                text: truncate_text(title),
                is_document: false,
                is_folder: true,
            });
        }
    }

    links
}

fn page_origin(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{host}:{port}", url.scheme())),
        None => Some(format!("{}://{host}", url.scheme())),
    }
}

fn truncate_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(LINK_TEXT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://town.example.ca/finance/reports").unwrap()
    }

    #[test]
    fn document_center_detection_is_path_based() {
        let listing = Url::parse("https://town.civicweb.net/filepro/documents/12").unwrap();
        assert!(is_document_center(&listing));
        assert!(!is_document_center(&base()));
    }

    #[test]
    fn pdf_extension_is_always_a_document() {
        assert!(looks_like_document("", "https://x.ca/a/b/report.PDF"));
    }

    #[test]
    fn ambiguous_paths_need_document_text() {
        assert!(looks_like_document("View Report", "https://x.ca/files/123"));
        assert!(looks_like_document("Download", "https://x.ca/media/9"));
        assert!(!looks_like_document("click here", "https://x.ca/files/123"));
        assert!(!looks_like_document("Annual Report", "https://x.ca/news/story"));
    }

    #[test]
    fn anchors_resolve_relative_hrefs() {
        let html = r#"
            <html><body>
              <a href="/files/annual-report-2023.pdf">2023 Annual Report</a>
              <a href="statements/2022.pdf">2022 Statements</a>
              <a href="mailto:clerk@town.ca">Email us</a>
              <a href="/contact">Contact</a>
            </body></html>
        "#;
        let links = parse_anchors(html, &base());

        assert_eq!(links.len(), 3);
        assert_eq!(
            links[0].url.as_str(),
            "https://town.example.ca/files/annual-report-2023.pdf"
        );
        assert!(links[0].is_document);
        assert_eq!(
            links[1].url.as_str(),
            "https://town.example.ca/finance/statements/2022.pdf"
        );
        assert!(!links[2].is_document);
        assert!(links.iter().all(|link| !link.is_folder));
    }

    #[test]
    fn anchor_text_is_collapsed() {
        let html = r#"<a href="/files/r.pdf">  2023
            Annual   Report </a>"#;
        let links = parse_anchors(html, &base());
        assert_eq!(links[0].text, "2023 Annual Report");
    }

    #[test]
    fn document_center_synthesizes_id_urls() {
        let page = Url::parse("https://town.civicweb.net/filepro/documents/").unwrap();
        let html = r#"
            <div data-type="document" data-id="101" data-title="2021 Annual Report"></div>
            <div data-type="document" data-id="101" data-title="2021 Annual Report (dup)"></div>
            <a href="/document/102" title="SOFI 2019">SOFI 2019</a>
            <a href="/filepro/documents/55/">listing link</a>
        "#;
        let links = parse_document_center(html, &page);

        let documents: Vec<_> = links.iter().filter(|link| link.is_document).collect();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].url.as_str(), "https://town.civicweb.net/document/101");
        assert_eq!(documents[0].text, "2021 Annual Report");
        assert_eq!(documents[1].url.as_str(), "https://town.civicweb.net/document/102");
        assert_eq!(documents[1].text, "SOFI 2019");
    }

    #[test]
    fn structured_documents_win_over_anchor_fallback() {
        let page = Url::parse("https://town.civicweb.net/filepro/documents/").unwrap();
        let html = r#"
            <div data-type="document" data-id="7" data-title="2020 Annual Report"></div>
            <a href="/document/7">duplicate anchor</a>
        "#;
        let links = parse_document_center(html, &page);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "2020 Annual Report");
    }

    #[test]
    fn only_financial_folders_are_navigable() {
        let page = Url::parse("http://127.0.0.1:8080/filepro/documents/").unwrap();
        let html = r#"
            <div data-type="folder" data-id="201" data-title="Financial Statements"></div>
            <div data-type="folder" data-id="202" data-title="Council Minutes"></div>
        "#;
        let links = parse_document_center(html, &page);

        assert_eq!(links.len(), 1);
        assert!(links[0].is_folder);
        assert_eq!(
            links[0].url.as_str(),
            "http://127.0.0.1:8080/filepro/documents/201/"
        );
    }
}
