//! Client for filing freedom-of-information requests on AskTheEU.org.
//!
//! The portal has no API, so [`PortalClient`] drives its HTML forms the way a
//! browser would: it scrapes the anti-forgery token out of each form page,
//! posts the form, and scrapes the answer for the identifiers it needs.
//! Everything here depends on the portal's current markup.

mod macros;

mod client;
pub mod config;
pub mod debug;
mod error;
pub mod models;
pub mod parse;
mod request;

pub use client::{create_foi_request, PortalClient, PortalClientBuilder};
pub use config::Credentials;
pub use error::{Error, Result};
pub use models::{Draft, DraftRequest, Interface, Pagination, RequestPage, RequestSummary, SentRequest};

pub const DEFAULT_DOMAIN: &str = "https://www.asktheeu.org";
pub const EMAIL_ENV_VAR: &str = "ASKTHEEU_EMAIL";
pub const PASSWORD_ENV_VAR: &str = "ASKTHEEU_PASSWORD";

const SIGN_IN_PATH: &str = "/profile/sign_in";
const SIGN_IN_REFERER_PATH: &str = "/profile/sign_in?r=%2F";

const PRO_NEW_REQUEST_PATH: &str = "/en/alaveteli_pro/info_requests/new";
const PRO_DRAFTS_PATH: &str = "/en/alaveteli_pro/draft_info_requests";
const PRO_REQUESTS_PATH: &str = "/en/alaveteli_pro/info_requests";

const STANDARD_NEW_REQUEST_PATH: &str = "/en/new";
const STANDARD_DRAFTS_PATH: &str = "/en/drafts";

const PUBLIC_REQUEST_PATH: &str = "/en/request";

/// Tried in order; the first one answering 200 is scraped.
const LISTING_PATHS: [&str; 3] = [
    "/en/alaveteli_pro/info_requests",
    "/en/my_requests",
    "/en/profile/requests",
];
