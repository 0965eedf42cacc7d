//! Path sanitization guard.
//!
//! The request path is percent-decoded and lexically cleaned. Any path whose
//! clean form differs from what the client sent is rejected, which catches
//! `..` traversal, `.` segments, doubled separators and trailing slashes in
//! one rule. The filesystem is never consulted.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;

use crate::security::guard::{Guard, GuardDecision, GuardKind, GuardRequest, ReasonCode};

/// Lexically clean a slash-separated path.
///
/// Repeated separators collapse, `.` segments vanish, `..` removes the
/// segment before it (or is dropped at the root), and the trailing slash
/// goes unless the result is the root itself. An empty result is `"."`.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Rejects requests whose path is not already canonical.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathGuard;

impl PathGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn check_path(&self, path: &str) -> GuardDecision {
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        let cleaned = clean_path(&decoded);

        if cleaned == decoded {
            GuardDecision::allow()
        } else {
            tracing::warn!(path = %path, cleaned = %cleaned, "Non-canonical request path");
            GuardDecision::reject(ReasonCode::PathTraversal)
        }
    }
}

#[async_trait]
impl Guard for PathGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Path
    }

    async fn check(&self, request: &GuardRequest) -> GuardDecision {
        self.check_path(&request.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path_rules() {
        let cases = [
            ("", "."),
            ("/", "/"),
            ("/a/b", "/a/b"),
            ("//a//b", "/a/b"),
            ("/a/./b", "/a/b"),
            ("/a/../b", "/b"),
            ("/../a", "/a"),
            ("/a/b/", "/a/b"),
            ("a/../..", ".."),
            ("a/..", "."),
            ("./a", "a"),
            ("/a/b/../../..", "/"),
        ];
        for (input, expected) in cases {
            assert_eq!(clean_path(input), expected, "clean_path({:?})", input);
        }
    }

    #[test]
    fn test_canonical_paths_pass() {
        let guard = PathGuard::new();
        for path in ["/", "/api/users", "/api/v1/items/42", "/files/a%20b"] {
            assert!(guard.check_path(path).is_allow(), "{} should pass", path);
        }
    }

    #[test]
    fn test_traversal_rejected() {
        let guard = PathGuard::new();
        for path in [
            "/api/../secret",
            "/a/./b",
            "//etc/passwd",
            "/api/users/",
            "/a/%2e%2e/b",
            "/a/%2E%2E/%2e%2e/etc",
            "/a%2F%2Fb",
        ] {
            assert_eq!(
                guard.check_path(path).reason(),
                Some(ReasonCode::PathTraversal),
                "{} should be rejected",
                path
            );
        }
    }
}
