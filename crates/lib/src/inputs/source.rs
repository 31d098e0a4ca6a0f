//! Input URL parsing.
//!
//! Supported forms:
//!
//! - `git:<url>[#<rev>]` - a git repository, optionally pinned to a branch, tag or commit
//! - `path:<path>` - a local directory (relative paths resolve against the descriptor)
//! - `tarball:<url>` - a gzip-compressed tar archive
//! - `https://.../x.tar.gz`, `https://.../x.tgz` - shorthand for `tarball:`

use std::path::PathBuf;

use thiserror::Error;

/// A parsed input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
  Git {
    /// Transport URL without the `git:` prefix or the `#rev` fragment.
    url: String,
    rev: Option<String>,
  },
  Path {
    path: PathBuf,
  },
  Archive {
    url: String,
  },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("unknown input scheme in '{0}' (expected git:, path:, tarball: or an archive URL)")]
  UnknownScheme(String),

  #[error("empty URL in '{0}'")]
  EmptyUrl(String),

  #[error("empty revision in '{0}'")]
  EmptyRev(String),

  #[error("unsupported archive format '{0}' (expected .tar.gz or .tgz)")]
  UnsupportedArchive(String),
}

/// Parse an input URL string.
pub fn parse(input: &str) -> Result<InputSource, ParseError> {
  let input = input.trim();

  if let Some(rest) = input.strip_prefix("git:") {
    let (url, rev) = match rest.split_once('#') {
      Some((_, "")) => return Err(ParseError::EmptyRev(input.to_string())),
      Some((url, rev)) => (url, Some(rev.to_string())),
      None => (rest, None),
    };
    if url.is_empty() {
      return Err(ParseError::EmptyUrl(input.to_string()));
    }
    return Ok(InputSource::Git {
      url: url.to_string(),
      rev,
    });
  }

  if let Some(rest) = input.strip_prefix("path:") {
    if rest.is_empty() {
      return Err(ParseError::EmptyUrl(input.to_string()));
    }
    return Ok(InputSource::Path {
      path: PathBuf::from(rest),
    });
  }

  if let Some(rest) = input.strip_prefix("tarball:") {
    if rest.is_empty() {
      return Err(ParseError::EmptyUrl(input.to_string()));
    }
    if !is_archive_url(rest) {
      return Err(ParseError::UnsupportedArchive(rest.to_string()));
    }
    return Ok(InputSource::Archive { url: rest.to_string() });
  }

  if (input.starts_with("https://") || input.starts_with("http://")) && is_archive_url(input) {
    return Ok(InputSource::Archive { url: input.to_string() });
  }

  Err(ParseError::UnknownScheme(input.to_string()))
}

fn is_archive_url(url: &str) -> bool {
  let path = url.split(['?', '#']).next().unwrap_or(url);
  path.ends_with(".tar.gz") || path.ends_with(".tgz")
}

/// The lock file `type` of a source.
pub fn source_type(source: &InputSource) -> &'static str {
  match source {
    InputSource::Git { .. } => "git",
    InputSource::Path { .. } => "path",
    InputSource::Archive { .. } => "tarball",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  mod git {
    use super::*;

    #[test]
    fn without_rev() {
      let source = parse("git:https://github.com/org/repo.git").unwrap();
      assert_eq!(
        source,
        InputSource::Git {
          url: "https://github.com/org/repo.git".to_string(),
          rev: None,
        }
      );
    }

    #[test]
    fn with_rev() {
      let source = parse("git:https://github.com/org/repo.git#v1.0.0").unwrap();
      assert_eq!(
        source,
        InputSource::Git {
          url: "https://github.com/org/repo.git".to_string(),
          rev: Some("v1.0.0".to_string()),
        }
      );
    }

    #[test]
    fn ssh_url() {
      let source = parse("git:git@github.com:org/repo.git#main").unwrap();
      assert!(matches!(source, InputSource::Git { ref url, .. } if url == "git@github.com:org/repo.git"));
    }

    #[test]
    fn empty_rev_is_error() {
      assert!(matches!(parse("git:https://x/repo.git#"), Err(ParseError::EmptyRev(_))));
    }

    #[test]
    fn empty_url_is_error() {
      assert!(matches!(parse("git:"), Err(ParseError::EmptyUrl(_))));
      assert!(matches!(parse("git:#main"), Err(ParseError::EmptyUrl(_))));
    }
  }

  mod path {
    use super::*;

    #[test]
    fn relative() {
      assert_eq!(
        parse("path:./flake-utils").unwrap(),
        InputSource::Path {
          path: PathBuf::from("./flake-utils")
        }
      );
    }

    #[test]
    fn tilde() {
      assert_eq!(
        parse("path:~/dotfiles").unwrap(),
        InputSource::Path {
          path: PathBuf::from("~/dotfiles")
        }
      );
    }

    #[test]
    fn empty_is_error() {
      assert!(matches!(parse("path:"), Err(ParseError::EmptyUrl(_))));
    }
  }

  mod archive {
    use super::*;

    #[test]
    fn tarball_prefix() {
      assert_eq!(
        parse("tarball:https://example.com/a/master.tar.gz").unwrap(),
        InputSource::Archive {
          url: "https://example.com/a/master.tar.gz".to_string()
        }
      );
    }

    #[test]
    fn bare_https_archive() {
      assert_eq!(
        parse("https://example.com/rust-overlay/archive/master.tgz?x=1").unwrap(),
        InputSource::Archive {
          url: "https://example.com/rust-overlay/archive/master.tgz?x=1".to_string()
        }
      );
    }

    #[test]
    fn zip_is_unsupported() {
      assert!(matches!(
        parse("tarball:https://example.com/a.zip"),
        Err(ParseError::UnsupportedArchive(_))
      ));
    }
  }

  #[test]
  fn unknown_scheme() {
    assert!(matches!(parse("invalid-url"), Err(ParseError::UnknownScheme(_))));
    assert!(matches!(
      parse("https://example.com/repo.git"),
      Err(ParseError::UnknownScheme(_))
    ));
  }

  #[test]
  fn source_types() {
    assert_eq!(source_type(&parse("git:https://x/y.git").unwrap()), "git");
    assert_eq!(source_type(&parse("path:.").unwrap()), "path");
    assert_eq!(source_type(&parse("tarball:https://x/y.tar.gz").unwrap()), "tarball");
  }
}
