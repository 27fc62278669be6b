//! What a matched route hands the request to.

use std::path::PathBuf;

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use thiserror::Error;

/// Terminal handler configuration for a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Long-poll change notification endpoint.
    ChangeWait,
    /// Project management API.
    Api,
    Redirect { location: String },
    /// Dashboard resources; `mount` is stripped from the request path.
    Dashboard { root: PathBuf, mount: String },
    /// Files of the active project.
    Static { root: PathBuf },
    /// Forward to the active project's upstream dev server.
    Proxy(Upstream),
}

#[derive(Debug, Error)]
#[error("invalid target host '{host}': {reason}")]
pub struct InvalidUpstream {
    pub host: String,
    pub reason: &'static str,
}

/// Parsed upstream address for proxy mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
}

impl Upstream {
    /// Parse a target host such as `localhost:4000` or `http://127.0.0.1:3000/`.
    pub fn parse(target_host: &str) -> Result<Self, InvalidUpstream> {
        let invalid = |reason| InvalidUpstream {
            host: target_host.to_string(),
            reason,
        };

        let trimmed = target_host.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(invalid("empty host"));
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        let uri: Uri = with_scheme.parse().map_err(|_| invalid("not a valid URI"))?;
        if uri.scheme() != Some(&Scheme::HTTP) {
            return Err(invalid("only http upstreams are supported"));
        }
        if uri.path() != "/" && !uri.path().is_empty() {
            return Err(invalid("upstream must not include a path"));
        }
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| invalid("missing host"))?;

        Ok(Self {
            scheme: Scheme::HTTP,
            authority,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Absolute URI on the upstream for the given request path and query.
    pub fn uri_for(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, axum::http::Error> {
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query.map(PathAndQuery::as_str).unwrap_or("/"))
            .build()
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}
