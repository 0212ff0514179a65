//! Path pattern router with navigation history.
//!
//! Patterns are slash separated: literal segments, `:name` captures one
//! segment and a trailing `*name` captures the rest. The first registered
//! pattern that matches wins.

use std::collections::BTreeMap;

use tracing::{debug, warn};

pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Splat(String),
}

#[derive(Debug, Clone)]
struct Route<T> {
    pattern: String,
    segments: Vec<Segment>,
    target: T,
}

#[derive(Debug, Clone)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
    history: Vec<String>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            history: Vec::new(),
        }
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.trim_start_matches('#')
        .split(&['?', '#'][..])
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|segment| !segment.is_empty())
}

impl<T: Clone> Router<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: &str, target: T) -> Self {
        self.add(pattern, target);
        self
    }

    pub fn add(&mut self, pattern: &str, target: T) {
        let segments = split(pattern)
            .map(|segment| {
                if let Some(name) = segment.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else if let Some(name) = segment.strip_prefix('*') {
                    Segment::Splat(name.to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();
        self.routes.push(Route {
            pattern: pattern.to_string(),
            segments,
            target,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn recognize(&self, path: &str) -> Option<(T, Params)> {
        let parts: Vec<&str> = split(path).collect();
        self.routes.iter().find_map(|route| {
            let params = match_segments(&route.segments, &parts)?;
            debug!(path, pattern = %route.pattern, "route matched");
            Some((route.target.clone(), params))
        })
    }

    /// Records `path` in the history and resolves it.
    pub fn navigate(&mut self, path: &str) -> Option<(T, Params)> {
        let path = path.trim_start_matches('#').trim_matches('/').to_string();
        let resolved = self.recognize(&path);
        if resolved.is_none() {
            warn!(path = %path, "no route for path");
        }
        self.history.push(path);
        resolved
    }

    pub fn current(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> Option<Params> {
    let mut params = Params::new();
    for (index, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Splat(name) => {
                params.insert(name.clone(), parts.get(index..)?.join("/"));
                return Some(params);
            }
            Segment::Literal(literal) => {
                if parts.get(index) != Some(&literal.as_str()) {
                    return None;
                }
            }
            Segment::Param(name) => {
                params.insert(name.clone(), (*parts.get(index)?).to_string());
            }
        }
    }
    (segments.len() == parts.len()).then_some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router<&'static str> {
        Router::new()
            .route("", "login")
            .route("login", "login")
            .route("projects", "project-list")
            .route("projects/create", "project-new")
            .route("projects/edit/:id", "project-edit")
            .route("projects/:id", "project-view")
            .route("*rest", "not-found")
    }

    #[test]
    fn first_matching_pattern_wins() {
        let router = router();
        assert_eq!(router.recognize("projects/create").map(|r| r.0), Some("project-new"));
        let (target, params) = router.recognize("#projects/edit/ab12").expect("route");
        assert_eq!(target, "project-edit");
        assert_eq!(params.get("id").map(String::as_str), Some("ab12"));
        assert_eq!(router.recognize("/projects/ab12/?tab=items").map(|r| r.0), Some("project-view"));
        assert_eq!(router.recognize("").map(|r| r.0), Some("login"));
    }

    #[test]
    fn splat_catches_the_rest() {
        let router = router();
        let (target, params) = router.recognize("reports/2024/q1").expect("route");
        assert_eq!(target, "not-found");
        assert_eq!(params.get("rest").map(String::as_str), Some("reports/2024/q1"));
    }

    #[test]
    fn navigation_is_recorded() {
        let mut router = Router::new().route("projects", 1);
        assert!(router.navigate("#projects/").is_some());
        assert!(router.navigate("nowhere").is_none());
        assert_eq!(router.history(), &["projects".to_string(), "nowhere".to_string()]);
        assert_eq!(router.current(), Some("nowhere"));
    }
}
