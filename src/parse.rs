//! Scraping steps, one pure function per question asked of a page.
//!
//! Every lookup that depends on the portal's markup is an ordered list of
//! candidates: the first one that matches wins. Nothing in here touches the
//! network, so each list can be checked against a fixture on its own.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{Pagination, RequestPage, RequestSummary};
use crate::{Error, Result};

/// Where an anti-forgery token may live on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSource {
    pub selector: &'static str,
    pub attr: &'static str,
}

impl TokenSource {
    pub const fn new(selector: &'static str, attr: &'static str) -> Self {
        Self { selector, attr }
    }

    /// First non-empty attribute value of an element matching the selector.
    pub fn extract(&self, doc: &Html) -> Result<Option<String>> {
        let selector = create_selector(self.selector)?;
        let token = doc
            .select(&selector)
            .filter_map(|el| el.value().attr(self.attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_owned);
        Ok(token)
    }
}

/// Sign-in page: the dedicated signin token, then the generic Rails one.
pub const SIGN_IN_TOKEN_SOURCES: &[TokenSource] = &[
    TokenSource::new("input#signin_token", "value"),
    TokenSource::new(r#"input[name="authenticity_token"]"#, "value"),
];

/// Request forms: the Rails hidden input, the layout's meta tag, then any
/// input whose name mentions a token.
pub const FORM_TOKEN_SOURCES: &[TokenSource] = &[
    TokenSource::new(r#"input[name="authenticity_token"]"#, "value"),
    TokenSource::new(r#"meta[name="csrf-token"]"#, "content"),
    TokenSource::new(r#"input[name*="token"]"#, "value"),
];

const LOGIN_SUCCESS_MARKERS: [&str; 4] = [
    "Sign out",
    "sign_out",
    "Your profile",
    "alaveteli_pro/dashboard",
];

const PRO_DRAFT_LINK: &str = r#"a[href*="/en/alaveteli_pro/info_requests/"]"#;
const STANDARD_DRAFT_MARKER: &str = "/drafts/";
const REQUEST_MARKER: &str = "/request/";
const REQUEST_LINK: &str = r#"a[href*="/request/"]"#;

const LISTING_CONTAINERS: &[&str] = &[
    ".request-list__request",
    ".request_listing",
    ".request-listing",
];
const LISTING_TITLES: &[&str] = &[
    "a.request-list__request__title",
    ".head a",
    r#"a[href*="/request/"]"#,
];
const LISTING_STATUSES: &[&str] = &[
    ".request-list__request__status",
    ".bottomline",
    ".request-status",
];
const LISTING_DATES: &[&str] = &["time", ".request-list__request__date", ".date"];
const UNKNOWN_STATUS: &str = "Unknown";

/// Tries each source in order and returns the first token found.
pub fn extract_token(html: &str, sources: &[TokenSource]) -> Result<Option<String>> {
    let doc = Html::parse_document(html);
    for source in sources {
        if let Some(token) = source.extract(&doc)? {
            return Ok(Some(token));
        }
    }
    Ok(None)
}

/// Decides whether the answer to the sign-in POST means we are signed in.
///
/// Any of the following counts: a sign-out link or the profile/dashboard
/// navigation in the body, or having been redirected away from the sign-in
/// page. Changes to the portal's copy can fool this either way.
pub fn interpret_login_response(html: &str, final_url: &Url, sign_in_url: &Url) -> bool {
    LOGIN_SUCCESS_MARKERS.iter().any(|m| html.contains(m))
        || html.to_lowercase().contains("logout")
        || final_url != sign_in_url
}

/// The Pro interface answers a draft submission with a page linking to the
/// draft; the first such link ending in a numeric segment carries its id.
pub fn extract_pro_draft_id(html: &str) -> Result<Option<String>> {
    let doc = Html::parse_document(html);
    let selector = create_selector(PRO_DRAFT_LINK)?;

    let id = doc
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| href.rsplit('/').next())
        .find(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_owned);
    Ok(id)
}

/// The standard interface either lands on the draft itself or renders a
/// preview whose form posts back to it.
pub fn recover_standard_draft_id(final_url: &Url, html: &str) -> Result<Option<String>> {
    if let Some(id) = segment_after(final_url.path(), STANDARD_DRAFT_MARKER) {
        return Ok(Some(id.to_owned()));
    }

    let doc = Html::parse_document(html);
    let selector = create_selector("form[action]")?;
    let id = doc
        .select(&selector)
        .filter_map(|form| form.value().attr("action"))
        .find_map(|action| segment_after(action, STANDARD_DRAFT_MARKER))
        .map(str::to_owned);
    Ok(id)
}

/// Public request id after sending: from the redirect target, the final URL,
/// or failing those any link into `/request/`.
pub fn recover_request_id(
    location: Option<&str>,
    final_url: &Url,
    html: &str,
) -> Result<Option<String>> {
    let from_redirect = location
        .and_then(|l| segment_after(l, REQUEST_MARKER))
        .or_else(|| segment_after(final_url.path(), REQUEST_MARKER));
    if let Some(id) = from_redirect {
        return Ok(Some(id.to_owned()));
    }

    let doc = Html::parse_document(html);
    let selector = create_selector(REQUEST_LINK)?;
    let id = doc
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| segment_after(href, REQUEST_MARKER))
        .map(str::to_owned);
    Ok(id)
}

/// Scrapes one page of the user's request listing.
///
/// Blocks without a recognisable title link are skipped; every other field
/// is best-effort.
pub fn parse_listing(html: &str, base: &Url, page: u32) -> Result<RequestPage> {
    let doc = Html::parse_document(html);

    let mut blocks = Vec::new();
    for candidate in LISTING_CONTAINERS {
        let selector = create_selector(candidate)?;
        blocks = doc.select(&selector).collect::<Vec<_>>();
        if !blocks.is_empty() {
            break;
        }
    }

    let mut requests = Vec::with_capacity(blocks.len());
    for block in blocks {
        if let Some(entry) = parse_listing_entry(block, base)? {
            requests.push(entry);
        }
    }

    let has_next = doc.select(&create_selector(r#"a[rel="next"]"#)?).next().is_some();
    let has_prev = doc.select(&create_selector(r#"a[rel="prev"]"#)?).next().is_some();

    Ok(RequestPage {
        requests,
        pagination: Pagination {
            current_page: page,
            next_page: has_next.then(|| page.checked_add(1)).flatten(),
            prev_page: (has_prev && page > 1).then(|| page - 1),
        },
    })
}

fn parse_listing_entry(block: ElementRef<'_>, base: &Url) -> Result<Option<RequestSummary>> {
    let Some(title_elem) = first_match(block, LISTING_TITLES)? else {
        return Ok(None);
    };
    let title = element_text(title_elem);
    if title.is_empty() {
        return Ok(None);
    }

    let url = title_elem
        .value()
        .attr("href")
        .and_then(|href| base.join(href).ok());
    let id = url.as_ref().and_then(|u| {
        u.path_segments()?
            .filter(|s| !s.is_empty())
            .last()
            .map(str::to_owned)
    });

    let status = first_match(block, LISTING_STATUSES)?
        .map(element_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_STATUS.to_string());
    let date = first_match(block, LISTING_DATES)?
        .map(element_text)
        .filter(|s| !s.is_empty());

    Ok(Some(RequestSummary {
        id,
        title,
        url: url.map(String::from),
        status,
        date,
    }))
}

fn first_match<'a>(scope: ElementRef<'a>, chain: &[&str]) -> Result<Option<ElementRef<'a>>> {
    for candidate in chain {
        let selector = create_selector(candidate)?;
        if let Some(found) = scope.select(&selector).next() {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Text content with runs of whitespace collapsed.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The path segment directly after the last occurrence of `marker`.
fn segment_after<'a>(s: &'a str, marker: &str) -> Option<&'a str> {
    let (_, rest) = s.rsplit_once(marker)?;
    let segment = rest.split(['/', '?', '#']).next()?;
    (!segment.is_empty()).then_some(segment)
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseMissingSelector(sel_str.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn sign_in_prefers_signin_token() {
        let html = r#"<form>
            <input type="hidden" name="authenticity_token" value="rails-token">
            <input type="hidden" id="signin_token" name="token" value="signin-token">
        </form>"#;
        let token = extract_token(html, SIGN_IN_TOKEN_SOURCES).unwrap();
        assert_eq!(token.as_deref(), Some("signin-token"));
    }

    #[test]
    fn sign_in_falls_back_to_authenticity_token() {
        let html = r#"<input type="hidden" name="authenticity_token" value="rails-token">"#;
        let token = extract_token(html, SIGN_IN_TOKEN_SOURCES).unwrap();
        assert_eq!(token.as_deref(), Some("rails-token"));
    }

    #[test]
    fn empty_token_values_are_skipped() {
        let html = r#"<input id="signin_token" value="">
            <input name="authenticity_token" value="   ">"#;
        assert_eq!(extract_token(html, SIGN_IN_TOKEN_SOURCES).unwrap(), None);
    }

    #[test]
    fn form_token_from_meta_tag() {
        let html = r#"<html><head><meta name="csrf-token" content="meta-token"></head>
            <body><form><input name="q"></form></body></html>"#;
        let token = extract_token(html, FORM_TOKEN_SOURCES).unwrap();
        assert_eq!(token.as_deref(), Some("meta-token"));
    }

    #[test]
    fn form_token_from_any_token_input() {
        let html = r#"<form><input name="request_token" value="generic"></form>"#;
        let source = FORM_TOKEN_SOURCES[2];
        let doc = Html::parse_document(html);
        assert_eq!(source.extract(&doc).unwrap().as_deref(), Some("generic"));
        assert_eq!(FORM_TOKEN_SOURCES[0].extract(&doc).unwrap(), None);
        assert_eq!(FORM_TOKEN_SOURCES[1].extract(&doc).unwrap(), None);
    }

    #[test]
    fn login_detected_from_sign_out_link() {
        let sign_in = url("https://www.asktheeu.org/profile/sign_in");
        let html = r#"<nav><a href="/profile/sign_out">Sign out</a></nav>"#;
        assert!(interpret_login_response(html, &sign_in, &sign_in));
    }

    #[test]
    fn login_detected_from_redirect() {
        let sign_in = url("https://www.asktheeu.org/profile/sign_in");
        let landed = url("https://www.asktheeu.org/en/alaveteli_pro");
        assert!(interpret_login_response("<p>Welcome</p>", &landed, &sign_in));
    }

    #[test]
    fn login_detected_from_mixed_case_logout() {
        let sign_in = url("https://www.asktheeu.org/profile/sign_in");
        assert!(interpret_login_response("<a>LogOut</a>", &sign_in, &sign_in));
    }

    #[test]
    fn failed_login_stays_on_sign_in_page() {
        let sign_in = url("https://www.asktheeu.org/profile/sign_in");
        let html = r#"<div class="error">Invalid email or password</div>
            <form action="/profile/sign_in"><input name="user_signin[email]"></form>"#;
        assert!(!interpret_login_response(html, &sign_in, &sign_in));
    }

    #[test]
    fn pro_draft_id_is_first_numeric_link() {
        let html = r#"
            <a href="/en/alaveteli_pro/info_requests/new">New</a>
            <a href="/en/alaveteli_pro/info_requests/">All</a>
            <a href="/en/alaveteli_pro/info_requests/8812">Your draft</a>
            <a href="/en/alaveteli_pro/info_requests/9000">Other</a>"#;
        assert_eq!(extract_pro_draft_id(html).unwrap().as_deref(), Some("8812"));
    }

    #[test]
    fn pro_draft_id_missing() {
        let html = r#"<a href="/en/alaveteli_pro/info_requests/new">New</a>"#;
        assert_eq!(extract_pro_draft_id(html).unwrap(), None);
    }

    #[test]
    fn standard_draft_id_from_final_url() {
        let landed = url("https://www.asktheeu.org/en/drafts/77");
        let id = recover_standard_draft_id(&landed, "").unwrap();
        assert_eq!(id.as_deref(), Some("77"));
    }

    #[test]
    fn standard_draft_id_from_form_action() {
        let landed = url("https://www.asktheeu.org/en/new");
        let html = r#"<form action="/en/search" method="get"></form>
            <form action="/en/drafts/3141/edit" method="post"></form>"#;
        let id = recover_standard_draft_id(&landed, html).unwrap();
        assert_eq!(id.as_deref(), Some("3141"));
    }

    #[test]
    fn request_id_prefers_location_header() {
        let final_url = url("https://www.asktheeu.org/en/request/from_url");
        let id = recover_request_id(
            Some("https://www.asktheeu.org/en/request/from_header/new"),
            &final_url,
            "",
        )
        .unwrap();
        assert_eq!(id.as_deref(), Some("from_header"));
    }

    #[test]
    fn request_id_from_final_url_then_links() {
        let final_url = url("https://www.asktheeu.org/en/request/gas_documents");
        let id = recover_request_id(None, &final_url, "").unwrap();
        assert_eq!(id.as_deref(), Some("gas_documents"));

        let final_url = url("https://www.asktheeu.org/en/alaveteli_pro/info_requests/5/send");
        let html = r#"<p>Sent! <a href="/en/request/gas_documents#incoming">view</a></p>"#;
        let id = recover_request_id(None, &final_url, html).unwrap();
        assert_eq!(id.as_deref(), Some("gas_documents"));

        assert_eq!(recover_request_id(None, &final_url, "<p>Sent</p>").unwrap(), None);
    }

    #[test]
    fn listing_with_two_requests_and_next_page() {
        let base = url("https://www.asktheeu.org");
        let html = r#"<html><body>
            <div class="request-list__request">
              <a class="request-list__request__title" href="/en/alaveteli_pro/info_requests/101">
                Gas infrastructure
              </a>
              <span class="request-list__request__status">Awaiting response</span>
              <time datetime="2025-01-02">2 January 2025</time>
            </div>
            <div class="request-list__request">
              <a class="request-list__request__title" href="/en/alaveteli_pro/info_requests/102">Meeting minutes</a>
            </div>
            <nav><a rel="next" href="?page=3">Next</a></nav>
        </body></html>"#;

        let page = parse_listing(html, &base, 2).unwrap();
        assert_eq!(page.requests.len(), 2);

        let first = &page.requests[0];
        assert_eq!(first.id.as_deref(), Some("101"));
        assert_eq!(first.title, "Gas infrastructure");
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.asktheeu.org/en/alaveteli_pro/info_requests/101")
        );
        assert_eq!(first.status, "Awaiting response");
        assert_eq!(first.date.as_deref(), Some("2 January 2025"));

        let second = &page.requests[1];
        assert_eq!(second.status, "Unknown");
        assert_eq!(second.date, None);

        assert_eq!(page.pagination.current_page, 2);
        assert_eq!(page.pagination.next_page, Some(3));
        assert_eq!(page.pagination.prev_page, None);
    }

    #[test]
    fn listing_falls_back_to_public_markup() {
        let base = url("https://www.asktheeu.org");
        let html = r#"
            <div class="request_listing">
              <span class="head"><a href="/en/request/minutes_of_meeting">Minutes of meeting</a></span>
              <span class="bottomline">Successful.</span>
            </div>
            <div class="request_listing"><p>no link here</p></div>
            <a rel="prev" href="?page=1">Previous</a>"#;

        let page = parse_listing(html, &base, 2).unwrap();
        assert_eq!(page.requests.len(), 1);
        assert_eq!(page.requests[0].id.as_deref(), Some("minutes_of_meeting"));
        assert_eq!(page.requests[0].status, "Successful.");
        assert_eq!(page.pagination.next_page, None);
        assert_eq!(page.pagination.prev_page, Some(1));
    }

    #[test]
    fn no_prev_page_before_the_first() {
        let base = url("https://www.asktheeu.org");
        let page = parse_listing(r#"<a rel="prev" href="?page=0">p</a>"#, &base, 1).unwrap();
        assert_eq!(page.pagination.prev_page, None);
    }

    #[test]
    fn listing_hyphenated_container_with_status_and_date_classes() {
        let base = url("https://www.asktheeu.org");
        let html = r#"
            <ul>
              <li class="request-listing">
                <a href="/en/request/budget_lines">Budget lines</a>
                <span class="request-status">Long overdue</span>
                <span class="request-list__request__date">5 March 2025</span>
              </li>
            </ul>"#;

        let page = parse_listing(html, &base, 1).unwrap();
        assert_eq!(page.requests.len(), 1);

        let entry = &page.requests[0];
        assert_eq!(entry.title, "Budget lines");
        assert_eq!(entry.id.as_deref(), Some("budget_lines"));
        assert_eq!(
            entry.url.as_deref(),
            Some("https://www.asktheeu.org/en/request/budget_lines")
        );
        assert_eq!(entry.status, "Long overdue");
        assert_eq!(entry.date.as_deref(), Some("5 March 2025"));
    }

    #[test]
    fn listing_title_from_request_link_and_plain_date() {
        let base = url("https://www.asktheeu.org");
        let html = r#"
            <div class="request_listing">
              <p><a href="/en/body/sg">Secretariat-General</a></p>
              <a href="/en/request/lobby_meetings">Lobby meetings</a>
              <span class="date">12 May 2024</span>
            </div>"#;

        let page = parse_listing(html, &base, 1).unwrap();
        let entry = &page.requests[0];
        assert_eq!(entry.title, "Lobby meetings");
        assert_eq!(entry.id.as_deref(), Some("lobby_meetings"));
        assert_eq!(entry.status, "Unknown");
        assert_eq!(entry.date.as_deref(), Some("12 May 2024"));
    }

    #[test]
    fn no_next_page_past_the_last_representable() {
        let base = url("https://www.asktheeu.org");
        let page = parse_listing(r#"<a rel="next" href="?page=1">n</a>"#, &base, u32::MAX).unwrap();
        assert_eq!(page.pagination.next_page, None);
        assert_eq!(page.pagination.prev_page, None);
    }

    #[test]
    fn malformed_markup_degrades_to_nothing_found() {
        let base = url("https://www.asktheeu.org");
        let garbage = "<div class=\"request-list__request\"><<<>>> </span></p></table><input name=</div>";

        assert!(extract_token(garbage, FORM_TOKEN_SOURCES).unwrap().is_none());
        assert!(extract_pro_draft_id(garbage).unwrap().is_none());
        let page = parse_listing(garbage, &base, 1).unwrap();
        assert!(page.requests.is_empty());
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let bad = TokenSource::new("input[name=", "value");
        let doc = Html::parse_document("<input>");
        assert!(matches!(
            bad.extract(&doc),
            Err(Error::ParseMissingSelector(_))
        ));
    }

    #[test]
    fn segment_after_marker() {
        assert_eq!(segment_after("/en/request/abc/response", "/request/"), Some("abc"));
        assert_eq!(segment_after("/en/request/", "/request/"), None);
        assert_eq!(segment_after("/en/drafts/9?x=1", "/drafts/"), Some("9"));
        assert_eq!(segment_after("/en/new", "/drafts/"), None);
    }
}
