//! Login identities
//!
//! Parsing of `user@host` strings and `alias = user@host` definition lines.
//! Everything here is pure: no I/O, no state.

use std::fmt;

use serde::Serialize;

use crate::error::{OrchError, Result};

/// A canonical `user@host` connection target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UserHost {
    pub user: String,
    pub host: String,
}

impl UserHost {
    #[must_use]
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// Registry key naming the physical connection
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UserHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

/// One parsed line of the `define-alias` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasDefinition {
    pub alias: String,
    pub target: UserHost,
}

fn is_segment(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

/// Check that `s` is a single `user@host` token.
///
/// Returns `None` rather than an error: callers use this to tell a literal
/// login apart from an alias.
#[must_use]
pub fn validate_user_host(s: &str) -> Option<UserHost> {
    let (user, host) = s.split_once('@')?;
    if host.contains('@') || !is_segment(user) || !is_segment(host) {
        return None;
    }
    Some(UserHost::new(user, host))
}

/// Parse `alias = user@host`.
///
/// # Errors
///
/// Returns [`OrchError::MalformedAlias`] with the offending line when the line
/// does not have exactly three tokens, the middle token is not `=`, or the
/// third token is not `user@host`.
pub fn parse_alias_line(line: &str) -> Result<AliasDefinition> {
    let malformed = || OrchError::MalformedAlias {
        line: line.trim().to_string(),
    };

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [alias, eq, user_host] = tokens.as_slice() else {
        return Err(malformed());
    };
    if *eq != "=" {
        return Err(malformed());
    }
    let target = validate_user_host(user_host).ok_or_else(malformed)?;

    Ok(AliasDefinition {
        alias: (*alias).to_string(),
        target,
    })
}

/// Parse every non-blank line of a `define-alias` block, in order.
///
/// # Errors
///
/// Fails on the first malformed line.
pub fn parse_alias_block(block: &str) -> Result<Vec<AliasDefinition>> {
    block
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_alias_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============== validate_user_host ==============

    #[test]
    fn test_validate_user_host_valid() {
        let uh = validate_user_host("root@blackhost.com").unwrap();
        assert_eq!(uh.user, "root");
        assert_eq!(uh.host, "blackhost.com");
        assert_eq!(uh.canonical(), "root@blackhost.com");
    }

    #[test]
    fn test_validate_user_host_no_at() {
        assert!(validate_user_host("blackhost.com").is_none());
    }

    #[test]
    fn test_validate_user_host_two_ats() {
        assert!(validate_user_host("a@b@c").is_none());
    }

    #[test]
    fn test_validate_user_host_empty_segments() {
        assert!(validate_user_host("@host").is_none());
        assert!(validate_user_host("user@").is_none());
        assert!(validate_user_host("@").is_none());
    }

    #[test]
    fn test_validate_user_host_whitespace() {
        assert!(validate_user_host("ro ot@host").is_none());
        assert!(validate_user_host("root@host name").is_none());
        assert!(validate_user_host("root@host\tname").is_none());
    }

    // ============== parse_alias_line ==============

    #[test]
    fn test_parse_alias_line() {
        let def = parse_alias_line("my-machine = root@blackhost.com").unwrap();
        assert_eq!(def.alias, "my-machine");
        assert_eq!(def.target, UserHost::new("root", "blackhost.com"));
    }

    #[test]
    fn test_parse_alias_line_extra_whitespace() {
        let def = parse_alias_line("   friend-machine\t=   joey@whitehost.com  ").unwrap();
        assert_eq!(def.alias, "friend-machine");
        assert_eq!(def.target.user, "joey");
    }

    #[test]
    fn test_parse_alias_line_single_token() {
        let err = parse_alias_line("bad-line").unwrap_err();
        assert!(matches!(err, OrchError::MalformedAlias { line } if line == "bad-line"));
    }

    #[test]
    fn test_parse_alias_line_missing_at() {
        assert!(matches!(
            parse_alias_line("a = b"),
            Err(OrchError::MalformedAlias { .. })
        ));
    }

    #[test]
    fn test_parse_alias_line_no_spaces_around_eq() {
        // "a=b@c" is a single token
        assert!(parse_alias_line("a=root@host").is_err());
    }

    #[test]
    fn test_parse_alias_line_wrong_separator() {
        assert!(parse_alias_line("a : root@host").is_err());
    }

    #[test]
    fn test_parse_alias_line_too_many_tokens() {
        assert!(parse_alias_line("a = root@host extra").is_err());
    }

    // ============== parse_alias_block ==============

    #[test]
    fn test_parse_alias_block_skips_blank_lines() {
        let block = "my-machine = root@blackhost.com\n\n  \nfriend-machine = joey@whitehost.com\n";
        let defs = parse_alias_block(block).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].alias, "my-machine");
        assert_eq!(defs[1].alias, "friend-machine");
    }

    #[test]
    fn test_parse_alias_block_empty() {
        assert!(parse_alias_block("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_alias_block_keeps_duplicates_in_order() {
        let block = "m = a@one\nm = b@two\n";
        let defs = parse_alias_block(block).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].target.host, "two");
    }

    #[test]
    fn test_parse_alias_block_reports_bad_line() {
        let block = "m = a@one\noops\n";
        let err = parse_alias_block(block).unwrap_err();
        assert!(format!("{err}").contains("oops"));
    }
}
