use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Email and password must be provided or set in environment variables")]
    Configuration,

    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Login failed")]
    LoginFailed,

    #[error("Failed to access {page}: {status}")]
    PageUnavailable { page: String, status: StatusCode },
    #[error("Could not find authenticity token on {page}")]
    MissingToken { page: String },

    #[error("Failed to create draft request. Status code: {status}")]
    DraftNotCreated { status: StatusCode },
    #[error("Failed to send request. Status code: {status}")]
    SendRejected { status: StatusCode },
    #[error("Title and body are required")]
    IncompleteRequest,

    #[error("The selector you are trying to scrape for is missing. Selector: {0}")]
    ParseMissingSelector(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid portal URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl Error {
    /// Whether a failed Pro draft submission may be retried through the
    /// standard interface: the form page was missing or carried no token.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            Error::PageUnavailable { .. } | Error::MissingToken { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_page_or_token_allow_fallback() {
        let missing_page = Error::PageUnavailable {
            page: "new request page".into(),
            status: StatusCode::NOT_FOUND,
        };
        let missing_token = Error::MissingToken {
            page: "new request page".into(),
        };
        let rejected = Error::DraftNotCreated {
            status: StatusCode::OK,
        };

        assert!(missing_page.allows_fallback());
        assert!(missing_token.allows_fallback());
        assert!(!rejected.allows_fallback());
        assert!(!Error::NotAuthenticated.allows_fallback());
    }

    #[test]
    fn messages_stay_human_readable() {
        let err = Error::PageUnavailable {
            page: "new request page".into(),
            status: StatusCode::NOT_FOUND,
        };
        assert_eq!(
            err.to_string(),
            "Failed to access new request page: 404 Not Found"
        );
        assert_eq!(Error::NotAuthenticated.to_string(), "Not authenticated");
    }
}
