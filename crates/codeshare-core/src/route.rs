//! Path to session mapping.

use crate::session::SessionId;

/// Path prefix of editor routes.
pub const SESSION_PREFIX: &str = "/session";

/// A resolved application route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Landing page (`/`).
    Landing,
    /// Editor for one session (`/session/{id}`).
    Editor(SessionId),
    /// Send the client elsewhere.
    Redirect(String),
    /// No such page.
    NotFound,
}

impl Route {
    /// Resolve a request path.
    ///
    /// `/session` without a usable id segment redirects to the landing page.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        if path.is_empty() || path == "/" {
            return Self::Landing;
        }

        let Some(rest) = path.strip_prefix(SESSION_PREFIX) else {
            return Self::NotFound;
        };
        let segment = match rest.strip_prefix('/') {
            Some(segment) => segment.trim_end_matches('/'),
            None if rest.is_empty() => "",
            None => return Self::NotFound,
        };

        if segment.is_empty() {
            return Self::Redirect("/".to_string());
        }
        match SessionId::parse(segment) {
            Ok(id) => Self::Editor(id),
            Err(e) => {
                tracing::debug!("Rejecting session path {path}: {e}");
                Self::Redirect("/".to_string())
            }
        }
    }

    /// Mint a fresh session and return its editor route.
    #[must_use]
    pub fn new_session() -> Self {
        Self::Editor(SessionId::mint())
    }

    /// Canonical path of this route.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Landing | Self::NotFound => "/".to_string(),
            Self::Editor(id) => format!("{SESSION_PREFIX}/{id}"),
            Self::Redirect(target) => target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landing() {
        assert_eq!(Route::parse("/"), Route::Landing);
        assert_eq!(Route::parse(""), Route::Landing);
        assert_eq!(Route::parse("/?ref=x"), Route::Landing);
    }

    #[test]
    fn test_editor() {
        let route = Route::parse("/session/A1");
        assert_eq!(route, Route::Editor(SessionId::parse("A1").unwrap()));
        assert_eq!(route.path(), "/session/A1");
        assert_eq!(Route::parse("/session/A1/"), route);
    }

    #[test]
    fn test_missing_id_redirects_home() {
        assert_eq!(Route::parse("/session"), Route::Redirect("/".to_string()));
        assert_eq!(Route::parse("/session/"), Route::Redirect("/".to_string()));
        assert_eq!(
            Route::parse("/session/bad%20id"),
            Route::Redirect("/".to_string())
        );
    }

    #[test]
    fn test_unknown_paths() {
        assert_eq!(Route::parse("/sessions/A1"), Route::NotFound);
        assert_eq!(Route::parse("/about"), Route::NotFound);
    }

    #[test]
    fn test_new_session_routes_to_editor() {
        let Route::Editor(id) = Route::new_session() else {
            panic!("expected editor route");
        };
        assert_eq!(Route::parse(&format!("/session/{id}")), Route::Editor(id));
    }
}
