use std::fmt;
use std::sync::Arc;

use chrono::Local;
use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tokio::task::spawn_blocking;
use url::Url;

use crate::config::Credentials;
use crate::debug::DebugSink;
use crate::models::{Draft, DraftRequest, Interface, RequestPage, SentRequest};
use crate::parse::{self, FORM_TOKEN_SOURCES, SIGN_IN_TOKEN_SOURCES};
use crate::request::{Page, Session};
use crate::{
    info_time, Error, Result, DEFAULT_DOMAIN, LISTING_PATHS, PRO_DRAFTS_PATH,
    PRO_NEW_REQUEST_PATH, PRO_REQUESTS_PATH, PUBLIC_REQUEST_PATH, SIGN_IN_PATH,
    SIGN_IN_REFERER_PATH, STANDARD_DRAFTS_PATH, STANDARD_NEW_REQUEST_PATH,
};

const PRO_SEND_FIELDS: &[(&str, &str)] = &[("commit", "Send request")];
const STANDARD_SEND_FIELDS: &[(&str, &str)] = &[
    ("submitted_new_request", "1"),
    ("preview", "0"),
    ("commit", "Send request"),
];

/// One signed-in browser session against an Alaveteli portal.
///
/// The client starts unauthenticated. The first call that needs an account
/// signs in once; there is no sign-out and no detection of an expired
/// session, later calls then simply fail to find what they scrape for.
pub struct PortalClient {
    session: Session,
    credentials: Credentials,
    debug_sink: Option<Arc<dyn DebugSink>>,
}

impl PortalClient {
    /// Credentials not passed explicitly are read from `ASKTHEEU_EMAIL` and
    /// `ASKTHEEU_PASSWORD`.
    pub fn new(email: Option<&str>, password: Option<&str>, domain: &str) -> Result<Self> {
        let mut builder = Self::builder().domain(domain);
        if let Some(email) = email {
            builder = builder.email(email);
        }
        if let Some(password) = password {
            builder = builder.password(password);
        }
        builder.build()
    }

    /// Credentials from the environment, default domain.
    pub fn from_env() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> PortalClientBuilder {
        PortalClientBuilder::default()
    }

    pub fn domain(&self) -> &Url {
        self.session.base()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Signs in through the portal's sign-in form.
    ///
    /// Returns `Ok(false)` when the sign-in page carries no token (nothing is
    /// posted then) or when the response doesn't look like a signed-in page.
    /// Once signed in, further calls return `Ok(true)` without any traffic.
    pub async fn login(&mut self) -> Result<bool> {
        if self.session.is_authenticated() {
            debug!("Already authenticated");
            return Ok(true);
        }

        let started = Local::now();
        let sign_in_url = self.session.url(SIGN_IN_PATH)?;
        let page = self.session.get(sign_in_url.clone(), HeaderMap::new()).await?;
        debug!("Login page status code: {}", page.status);

        let Some(token) = parse::extract_token(&page.html, SIGN_IN_TOKEN_SOURCES)? else {
            warn!("No sign-in token found on {}", sign_in_url);
            self.capture("login_page.html", &page.html);
            return Ok(false);
        };

        let referer = self.session.url(SIGN_IN_REFERER_PATH)?;
        let headers = self.session.sign_in_headers(&referer)?;
        let form = [
            ("authenticity_token", ""),
            ("user_signin[email]", self.credentials.email()),
            ("user_signin[password]", self.credentials.password()),
            ("token", token.as_str()),
            ("modal", ""),
            ("commit", "Sign in"),
        ];
        debug!("Submitting login form for {}", self.credentials.email());
        let page = self
            .session
            .post_form(sign_in_url.clone(), headers, &form)
            .await?;
        debug!("Login response status code: {}", page.status);

        let authenticated = parse::interpret_login_response(&page.html, &page.url, &sign_in_url);
        self.session.set_authenticated(authenticated);

        if authenticated {
            info_time!(started, "Signed in to {} as {}", self.session.base(), self.credentials.email());
        } else {
            warn!("Login failed with status {}", page.status);
            self.capture("login_response.html", &page.html);
        }
        Ok(authenticated)
    }

    /// Creates an unsent draft.
    ///
    /// The Pro interface is tried first. If its form page is missing or has
    /// no token, the standard interface is tried; should that fail as well,
    /// the Pro error is returned.
    pub async fn create_draft_request(&mut self, request: &DraftRequest) -> Result<Draft> {
        self.ensure_authenticated().await?;

        match self.create_pro_draft(request).await {
            Ok(draft) => Ok(draft),
            Err(primary) if primary.allows_fallback() => {
                warn!("Pro interface unavailable ({}), trying the standard interface", primary);
                match self.create_standard_draft(request).await {
                    Ok(draft) => Ok(draft),
                    Err(secondary) => {
                        warn!("Standard interface failed as well: {}", secondary);
                        Err(primary)
                    }
                }
            }
            Err(primary) => Err(primary),
        }
    }

    /// Submits a draft to the public body, through the interface that created it.
    pub async fn send_request(&mut self, draft_id: &str, interface: Interface) -> Result<SentRequest> {
        self.ensure_authenticated().await?;

        let (draft_path, confirmation) = match interface {
            Interface::Pro => (format!("{}/{}", PRO_REQUESTS_PATH, draft_id), PRO_SEND_FIELDS),
            Interface::Standard => (
                format!("{}/{}", STANDARD_DRAFTS_PATH, draft_id),
                STANDARD_SEND_FIELDS,
            ),
        };

        let draft_url = self.session.url(&draft_path)?;
        let page = self
            .session
            .get(draft_url.clone(), self.session.listing_headers())
            .await?;
        self.capture("draft_page.html", &page.html);
        if page.status != StatusCode::OK {
            return Err(Error::PageUnavailable {
                page: "draft request".to_string(),
                status: page.status,
            });
        }
        let token = self.form_token(&page, "draft request")?;

        let mut form = vec![("utf8", "✓"), ("authenticity_token", token.as_str())];
        form.extend_from_slice(confirmation);

        let send_url = self.session.url(&format!("{}/send", draft_path))?;
        let headers = self.session.form_headers(&draft_url)?;
        let page = self.session.post_form(send_url, headers, &form).await?;
        self.capture("send_response.html", &page.html);

        if !(page.status.is_success() || page.status.is_redirection()) {
            return Err(Error::SendRejected {
                status: page.status,
            });
        }

        let Page {
            url, location, html, ..
        } = page;
        let request_id = spawn_blocking(move || {
            parse::recover_request_id(location.as_deref(), &url, &html)
        })
        .await??;
        let request_url = request_id
            .as_ref()
            .map(|id| self.session.url(&format!("{}/{}", PUBLIC_REQUEST_PATH, id)))
            .transpose()?
            .map(String::from);

        match &request_id {
            Some(id) => info!("Sent draft {} as request {}", draft_id, id),
            None => warn!("Sent draft {} but couldn't recover its public id", draft_id),
        }
        Ok(SentRequest {
            request_id,
            request_url,
        })
    }

    /// One page of the signed-in user's requests.
    pub async fn list_requests(&mut self, page: u32) -> Result<RequestPage> {
        self.ensure_authenticated().await?;

        let started = Local::now();
        let paths = LISTING_PATHS
            .iter()
            .map(|path| format!("{}?page={}", path, page))
            .collect::<Vec<_>>();
        let (_, listing) = self.first_ok_page(&paths, "request listing").await?;
        self.capture("requests_page.html", &listing.html);

        let base = self.session.base().clone();
        let html = listing.html;
        let requests = spawn_blocking(move || parse::parse_listing(&html, &base, page)).await??;

        info_time!(started, "Listed {} requests on page {}", requests.requests.len(), page);
        Ok(requests)
    }

    async fn ensure_authenticated(&mut self) -> Result<()> {
        if self.session.is_authenticated() || self.login().await? {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    async fn create_pro_draft(&self, request: &DraftRequest) -> Result<Draft> {
        let form_url = self.session.url(PRO_NEW_REQUEST_PATH)?;
        let page = self
            .session
            .get(form_url.clone(), self.session.listing_headers())
            .await?;
        self.capture("new_request_page.html", &page.html);
        if page.status != StatusCode::OK {
            return Err(Error::PageUnavailable {
                page: "new request page".to_string(),
                status: page.status,
            });
        }
        let token = self.form_token(&page, "new request page")?;

        let form = [
            ("utf8", "✓"),
            ("authenticity_token", token.as_str()),
            ("info_request[public_body_id]", request.public_body_id.as_str()),
            ("info_request[title]", request.title.as_str()),
            ("outgoing_message[body]", request.body.as_str()),
            (
                "embargo[embargo_duration]",
                request.embargo_duration.as_deref().unwrap_or(""),
            ),
            ("preview", "true"),
        ];
        let headers = self.session.form_headers(&form_url)?;
        let page = self
            .session
            .post_form(self.session.url(PRO_DRAFTS_PATH)?, headers, &form)
            .await?;
        self.capture("draft_response.html", &page.html);

        if page.status == StatusCode::OK {
            let html = page.html;
            if let Some(id) = spawn_blocking(move || parse::extract_pro_draft_id(&html)).await?? {
                let url = self.session.url(&format!("{}/{}", PRO_REQUESTS_PATH, id))?;
                info!("Created draft {} through the Pro interface", id);
                return Ok(Draft {
                    id,
                    url: url.into(),
                    interface: Interface::Pro,
                });
            }
        }
        Err(Error::DraftNotCreated {
            status: page.status,
        })
    }

    async fn create_standard_draft(&self, request: &DraftRequest) -> Result<Draft> {
        let candidates = [
            format!("{}/{}", STANDARD_NEW_REQUEST_PATH, request.public_body_id),
            STANDARD_NEW_REQUEST_PATH.to_string(),
        ];
        let (form_url, page) = self.first_ok_page(&candidates, "standard request form").await?;
        self.capture("standard_new_request_page.html", &page.html);
        let token = self.form_token(&page, "standard request form")?;

        let form = [
            ("utf8", "✓"),
            ("authenticity_token", token.as_str()),
            ("info_request[public_body_id]", request.public_body_id.as_str()),
            ("info_request[title]", request.title.as_str()),
            ("outgoing_message[body]", request.body.as_str()),
            ("submitted_new_request", "1"),
            ("preview", "1"),
        ];
        let headers = self.session.form_headers(&form_url)?;
        let page = self
            .session
            .post_form(self.session.url(STANDARD_NEW_REQUEST_PATH)?, headers, &form)
            .await?;
        self.capture("standard_draft_response.html", &page.html);

        if page.status.is_success() {
            let Page { url, html, .. } = page;
            let found = spawn_blocking(move || parse::recover_standard_draft_id(&url, &html)).await??;
            if let Some(id) = found {
                let url = self.session.url(&format!("{}/{}", STANDARD_DRAFTS_PATH, id))?;
                info!("Created draft {} through the standard interface", id);
                return Ok(Draft {
                    id,
                    url: url.into(),
                    interface: Interface::Standard,
                });
            }
        }
        Err(Error::DraftNotCreated {
            status: page.status,
        })
    }

    /// GETs each path in order and returns the first page answered with 200.
    async fn first_ok_page(&self, paths: &[String], what: &str) -> Result<(Url, Page)> {
        let mut status = StatusCode::NOT_FOUND;
        for path in paths {
            let url = self.session.url(path)?;
            let page = self
                .session
                .get(url.clone(), self.session.listing_headers())
                .await?;
            if page.status == StatusCode::OK {
                return Ok((url, page));
            }
            debug!("{} answered {}", url, page.status);
            status = page.status;
        }
        Err(Error::PageUnavailable {
            page: what.to_string(),
            status,
        })
    }

    fn form_token(&self, page: &Page, what: &str) -> Result<String> {
        parse::extract_token(&page.html, FORM_TOKEN_SOURCES)?.ok_or_else(|| {
            self.capture("missing_token_page.html", &page.html);
            Error::MissingToken {
                page: what.to_string(),
            }
        })
    }

    fn capture(&self, name: &str, html: &str) {
        if let Some(sink) = &self.debug_sink {
            sink.capture(name, html);
        }
    }
}

impl fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalClient")
            .field("domain", &self.session.base().as_str())
            .field("credentials", &self.credentials)
            .field("authenticated", &self.session.is_authenticated())
            .field("debug_sink", &self.debug_sink.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct PortalClientBuilder {
    email: Option<String>,
    password: Option<String>,
    domain: Option<String>,
    debug_sink: Option<Arc<dyn DebugSink>>,
}

impl PortalClientBuilder {
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Base URL of the portal, `https://www.asktheeu.org` unless set.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Receives raw pages the client fetched, for inspecting markup changes.
    pub fn debug_sink(mut self, sink: impl DebugSink + 'static) -> Self {
        self.debug_sink = Some(Arc::new(sink));
        self
    }

    pub fn build(self) -> Result<PortalClient> {
        let credentials = Credentials::resolve(self.email.as_deref(), self.password.as_deref())?;
        let base = Url::parse(self.domain.as_deref().unwrap_or(DEFAULT_DOMAIN))?;
        let session = Session::new(base)?;
        debug!("Client ready for {}", session.base());

        Ok(PortalClient {
            session,
            credentials,
            debug_sink: self.debug_sink,
        })
    }
}

/// Signs in and creates a draft in one go.
pub async fn create_foi_request(
    request: &DraftRequest,
    email: Option<&str>,
    password: Option<&str>,
    domain: &str,
) -> Result<Draft> {
    if request.title.trim().is_empty() || request.body.trim().is_empty() {
        return Err(Error::IncompleteRequest);
    }

    let mut client = PortalClient::new(email, password, domain)?;
    if !client.login().await? {
        return Err(Error::LoginFailed);
    }
    client.create_draft_request(request).await
}
