use log::debug;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use url::Url;

use crate::Result;

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";
const ACCEPT_NAVIGATION: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

/// What the portal answered, after redirects were followed.
#[derive(Debug)]
pub(crate) struct Page {
    pub status: StatusCode,
    /// Final URL of the response.
    pub url: Url,
    /// `Location` header of the final response, if it still carried one.
    pub location: Option<String>,
    pub html: String,
}

/// One browser-like session: a cookie jar plus the authenticated flag.
#[derive(Debug)]
pub(crate) struct Session {
    client: Client,
    base: Url,
    authenticated: bool,
}

impl Session {
    pub fn new(mut base: Url) -> Result<Self> {
        // Portal paths are joined relative to the base, so keep any path prefix
        // in the domain as a directory.
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }

        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base,
            authenticated: false,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    /// Resolves a portal path such as `/profile/sign_in` below the domain,
    /// keeping whatever path prefix the domain carries.
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    /// `scheme://host[:port]` without a trailing slash, as browsers send it.
    pub fn origin(&self) -> String {
        self.base.origin().ascii_serialization()
    }

    pub async fn get(&self, url: Url, headers: HeaderMap) -> Result<Page> {
        debug!("GET {}", url);
        let res = self.client.get(url).headers(headers).send().await?;
        read_page(res).await
    }

    /// Submits `form` as `application/x-www-form-urlencoded`, keeping field order.
    pub async fn post_form(
        &self,
        url: Url,
        headers: HeaderMap,
        form: &[(&str, &str)],
    ) -> Result<Page> {
        debug!("POST {} ({} fields)", url, form.len());
        let res = self
            .client
            .post(url)
            .headers(headers)
            .form(form)
            .send()
            .await?;
        read_page(res).await
    }

    /// The short header set used for every page after sign-in.
    pub fn form_headers(&self, referer: &Url) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(header::ORIGIN, HeaderValue::from_str(&self.origin())?);
        headers.insert(header::REFERER, HeaderValue::from_str(referer.as_str())?);
        Ok(headers)
    }

    pub fn listing_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers
    }

    /// Mirrors what desktop Chrome sends when submitting the sign-in form.
    pub fn sign_in_headers(&self, referer: &Url) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_NAVIGATION));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-GB,en-US;q=0.9,en;q=0.8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::ORIGIN, HeaderValue::from_str(&self.origin())?);
        headers.insert(header::REFERER, HeaderValue::from_str(referer.as_str())?);
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );

        let fetch_metadata = [
            (
                "sec-ch-ua",
                r#""Google Chrome";v="135", "Not-A.Brand";v="8", "Chromium";v="135""#,
            ),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", r#""macOS""#),
            ("sec-fetch-dest", "document"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-site", "same-origin"),
            ("sec-fetch-user", "?1"),
        ];
        for (name, value) in fetch_metadata {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        Ok(headers)
    }
}

async fn read_page(res: Response) -> Result<Page> {
    let status = res.status();
    let url = res.url().clone();
    let location = res
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let html = res.text().await?;
    debug!("{} -> {}", url, status);

    Ok(Page {
        status,
        url,
        location,
        html,
    })
}
