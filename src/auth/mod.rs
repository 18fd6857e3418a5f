use hyper::Request;

use crate::prelude::*;

mod config;
mod session;

pub use self::{
    config::AuthConfig,
    session::{SessionError, SessionKey},
};


/// Name of the cookie holding the session token.
pub const SESSION_COOKIE: &str = "gander_session";

/// The user a request was made by.
///
/// This is a plain value: constructing one performs no checks and holding
/// one grants nothing by itself. The HTTP layer only creates it after
/// verifying a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    username: String,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into() }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.username.fmt(f)
    }
}

/// Figures out who sent the given request, judging by its session cookie.
/// Returns `None` for requests without a session cookie, or with an invalid
/// or expired one.
pub fn authenticate<B>(req: &Request<B>, key: &SessionKey) -> Option<Principal> {
    let Some(token) = session_cookie(req) else {
        trace!("no session cookie in request -> treating as anonymous");
        return None;
    };

    match key.verify(token) {
        Ok(principal) => {
            trace!(user = principal.username(), "request carries a valid session");
            Some(principal)
        }
        Err(e) => {
            debug!("rejected session cookie ({e:?}) -> treating as anonymous");
            None
        }
    }
}

/// Extracts the session token from the request's `Cookie` headers, if any.
fn session_cookie<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get_all(hyper::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|cookie| cookie.split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn request(cookie_headers: &[&str]) -> Request<()> {
        let mut builder = Request::builder().uri("/");
        for value in cookie_headers {
            builder = builder.header(hyper::header::COOKIE, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn cookie_extraction() {
        assert_eq!(session_cookie(&request(&[])), None);
        assert_eq!(session_cookie(&request(&["foo=bar"])), None);
        assert_eq!(session_cookie(&request(&["gander_session=abc"])), Some("abc"));
        assert_eq!(
            session_cookie(&request(&["foo=bar; gander_session=abc; baz=qux"])),
            Some("abc"),
        );
        assert_eq!(
            session_cookie(&request(&["foo=bar", "gander_session=abc"])),
            Some("abc"),
        );
        // Only the first '=' separates name and value.
        assert_eq!(session_cookie(&request(&["gander_session=a=b"])), Some("a=b"));
    }

    #[test]
    fn authenticate_by_cookie() {
        let key = SessionKey::from_secret("secret");
        let token = key.issue("admin", std::time::Duration::from_secs(3600));

        let req = request(&[&format!("{SESSION_COOKIE}={token}")]);
        assert_eq!(authenticate(&req, &key).unwrap().username(), "admin");

        let req = request(&[&format!("{SESSION_COOKIE}=bogus")]);
        assert!(authenticate(&req, &key).is_none());

        let req = request(&[]);
        assert!(authenticate(&req, &key).is_none());
    }
}
