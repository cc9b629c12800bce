//! Path-prefix routing to backend tool servers.
//!
//! The route table is built once at startup and is read-only afterwards.
//! Routing runs only after a request has been authenticated.
//!
//! # Matching
//!
//! - Longest prefix wins; equal prefixes resolve to the first registered
//! - Matching is segment-aware: `/weather` matches `/weather` and
//!   `/weather/mcp` but not `/weatherman`. A prefix ending in `/` matches any
//!   continuation.
//! - The matched prefix is stripped from the forwarded path unless the route
//!   is marked `keep-prefix`

pub mod proxy;

use std::fmt;
use thiserror::Error;

/// Name of the in-process weather tool.
pub const WEATHER_TOOL: &str = "weather";

/// Local tools the gateway can serve in-process.
pub const LOCAL_TOOL_NAMES: &[&str] = &[WEATHER_TOOL];

/// Default route table: the weather tool mounted in-process under `/weather`.
pub const DEFAULT_ROUTES: &str = "/weather=local:weather";

/// Where a matched request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// A separate tool server process at `base_url` (no trailing slash).
    Upstream { base_url: String },

    /// An in-process tool router registered under `tool`.
    Local { tool: String },
}

impl BackendTarget {
    /// Bounded label for logs and metrics.
    pub fn label(&self) -> String {
        match self {
            BackendTarget::Upstream { .. } => "upstream".to_string(),
            BackendTarget::Local { tool } => format!("local:{}", tool),
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendTarget::Upstream { base_url } => f.write_str(base_url),
            BackendTarget::Local { tool } => write!(f, "local:{}", tool),
        }
    }
}

/// One route table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Path prefix, always starting with `/`.
    pub prefix: String,

    /// Backend for matching requests.
    pub target: BackendTarget,

    /// Forward the full path instead of stripping the prefix.
    pub keep_prefix: bool,
}

impl Route {
    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/'),
            None => false,
        }
    }

    fn forwarded_path(&self, path: &str) -> String {
        if self.keep_prefix {
            return path.to_string();
        }

        let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
        if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{}", rest)
        }
    }
}

/// A routing decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// The selected route.
    pub route: &'a Route,

    /// Path to send to the backend (starts with `/`).
    pub forwarded_path: String,
}

/// Errors parsing a route table description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteParseError {
    #[error("route table is empty")]
    Empty,

    #[error("route '{0}' must have the form prefix=target[|keep-prefix]")]
    MissingTarget(String),

    #[error("route prefix '{0}' must start with '/'")]
    InvalidPrefix(String),

    #[error("route target '{0}' must be local:<tool> or an http(s) URL")]
    InvalidTarget(String),

    #[error("unknown local tool '{0}'")]
    UnknownLocalTool(String),

    #[error("unknown route option '{0}'")]
    UnknownOption(String),
}

/// Ordered, read-only route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build a table from routes in registration order.
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Parse a comma-separated list of `prefix=target[|keep-prefix]` entries.
    ///
    /// Targets are `local:<tool>` or an `http://` / `https://` base URL.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteParseError`] describing the first bad entry.
    pub fn parse(table: &str) -> Result<Self, RouteParseError> {
        let mut routes = Vec::new();

        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (prefix, rest) = entry
                .split_once('=')
                .ok_or_else(|| RouteParseError::MissingTarget(entry.to_string()))?;
            let prefix = prefix.trim();
            if !prefix.starts_with('/') {
                return Err(RouteParseError::InvalidPrefix(prefix.to_string()));
            }

            let mut parts = rest.split('|').map(str::trim);
            let target = parts.next().unwrap_or_default();
            if target.is_empty() {
                return Err(RouteParseError::MissingTarget(entry.to_string()));
            }

            let mut keep_prefix = false;
            for option in parts {
                match option {
                    "keep-prefix" => keep_prefix = true,
                    other => return Err(RouteParseError::UnknownOption(other.to_string())),
                }
            }

            routes.push(Route {
                prefix: prefix.to_string(),
                target: parse_target(target)?,
                keep_prefix,
            });
        }

        if routes.is_empty() {
            return Err(RouteParseError::Empty);
        }

        Ok(Self::new(routes))
    }

    /// Select the backend for `path`.
    ///
    /// Returns `None` if no prefix matches.
    pub fn route(&self, path: &str) -> Option<RouteMatch<'_>> {
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            if !route.matches(path) {
                continue;
            }
            // Strictly longer replaces; ties keep the earlier route
            if best.map_or(true, |b| route.prefix.len() > b.prefix.len()) {
                best = Some(route);
            }
        }

        best.map(|route| RouteMatch {
            route,
            forwarded_path: route.forwarded_path(path),
        })
    }

    /// Routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

fn parse_target(target: &str) -> Result<BackendTarget, RouteParseError> {
    if let Some(tool) = target.strip_prefix("local:") {
        if !LOCAL_TOOL_NAMES.contains(&tool) {
            return Err(RouteParseError::UnknownLocalTool(tool.to_string()));
        }
        return Ok(BackendTarget::Local {
            tool: tool.to_string(),
        });
    }

    let has_host = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
        .is_some_and(|host| !host.is_empty());
    if !has_host {
        return Err(RouteParseError::InvalidTarget(target.to_string()));
    }

    Ok(BackendTarget::Upstream {
        base_url: target.trim_end_matches('/').to_string(),
    })
}
