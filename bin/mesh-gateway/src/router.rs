//! Router for matching request paths to peer services

use mesh_core::RouteSettings;
use tracing::debug;

/// A matched route and the path to forward upstream
#[derive(Debug, PartialEq)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteSettings,
    pub forward_path: String,
}

/// Router for matching HTTP requests to configured prefix routes
pub struct Router {
    routes: Vec<RouteSettings>,
}

impl Router {
    /// Create a router; longer prefixes are tried first
    pub fn new(mut routes: Vec<RouteSettings>) -> Self {
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { routes }
    }

    pub fn routes(&self) -> &[RouteSettings] {
        &self.routes
    }

    /// Match a request path against a route prefix
    ///
    /// `/api/orders` matches itself and `/api/orders/...` but not
    /// `/api/ordersx`. A prefix ending in `/` matches anything below it.
    pub fn match_path(path: &str, prefix: &str) -> bool {
        if path == prefix {
            return true;
        }

        if prefix.ends_with('/') {
            return path.starts_with(prefix);
        }

        path.starts_with(prefix) && path[prefix.len()..].starts_with('/')
    }

    /// Find the route for `path_and_query` and compute the upstream path
    pub fn route<'a>(&'a self, path_and_query: &str) -> Option<RouteMatch<'a>> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };

        let route = self
            .routes
            .iter()
            .find(|route| Self::match_path(path, &route.prefix))?;

        let mut forward_path = match route.strip_prefix.as_deref() {
            Some(strip) => Self::strip(path, strip),
            None => path.to_string(),
        };
        if let Some(query) = query {
            forward_path.push('?');
            forward_path.push_str(query);
        }

        debug!("{} matched {} -> {}", path_and_query, route.prefix, route.service);
        Some(RouteMatch { route, forward_path })
    }

    fn strip(path: &str, prefix: &str) -> String {
        match path.strip_prefix(prefix) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            Some(rest) => format!("/{}", rest),
            None => path.to_string(),
        }
    }
}
