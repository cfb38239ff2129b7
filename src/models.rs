use std::fmt;

use serde::Serialize;

/// A request the caller wants to file, before it exists on the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRequest {
    /// The portal's internal id of the receiving institution.
    pub public_body_id: String,
    pub title: String,
    pub body: String,
    /// e.g. `3_months`. Only the Pro interface honours it.
    pub embargo_duration: Option<String>,
}

impl DraftRequest {
    pub fn new(
        public_body_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            public_body_id: public_body_id.into(),
            title: title.into(),
            body: body.into(),
            embargo_duration: None,
        }
    }

    pub fn with_embargo(mut self, duration: impl Into<String>) -> Self {
        self.embargo_duration = Some(duration.into());
        self
    }
}

/// The form workflow a draft was created through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Pro,
    Standard,
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Pro => f.write_str("pro"),
            Interface::Standard => f.write_str("standard"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Draft {
    pub id: String,
    pub url: String,
    pub interface: Interface,
}

/// Outcome of sending a draft. The public id is best-effort: the portal
/// accepted the request even when it could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentRequest {
    pub request_id: Option<String>,
    pub request_url: Option<String>,
}

/// One entry scraped from the request listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub id: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub status: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPage {
    pub requests: Vec<RequestSummary>,
    pub pagination: Pagination,
}
