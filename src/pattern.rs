//! Pattern compiler (spec §4.A).
//!
//! Templates are slash-delimited path strings. A literal segment matches
//! itself case-insensitively. A dynamic segment has the syntax `{name:type}`
//! where `type` selects one of the built-in matchers or `regex:<pattern>`
//! for a free-form match. Compilation produces a [`CompiledPattern`] (an
//! ordered list of [`Segment`]s) plus the [`ParamDescriptor`] list in
//! declaration order.
//!
//! Segment matching is grounded on `tii`'s `PathPart` enum
//! (`other_examples/ef30195d_tiipotto-tii__src-tii_router.rs.rs`): literal,
//! named variable, trailing wildcard, and regex-typed variable segments.

use regex::Regex;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
  #[error("template `{0}` is not anchored (must start with '/')")]
  NotAnchored(String),
  #[error("duplicate parameter name `{0}` in template `{1}`")]
  DuplicateParam(String, String),
  #[error("unknown parameter type `{0}` for `{1}` in template `{2}`")]
  UnknownType(String, String, String),
  #[error("invalid regex `{0}` for parameter `{1}`: {2}")]
  InvalidRegex(String, String, regex::Error),
  #[error("wildcard `*` must be the final segment in template `{0}`")]
  WildcardNotLast(String),
}

/// The type a captured dynamic segment is declared to carry. Actual
/// conversion to a Rust value happens in the transformer pipeline
/// (`transformer.rs`); this only gates *matching*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
  String,
  Int,
  Float,
  Uuid,
  Regex(String),
}

impl fmt::Display for ParamType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamType::String => write!(f, "string"),
      ParamType::Int => write!(f, "int"),
      ParamType::Float => write!(f, "float"),
      ParamType::Uuid => write!(f, "uuid"),
      ParamType::Regex(p) => write!(f, "regex:{p}"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ParamDescriptor {
  pub name: String,
  pub ty: ParamType,
}

#[derive(Debug, Clone)]
enum Segment {
  Literal(String),
  Param { name: String, matcher: SegmentMatcher },
  /// Trailing `*`, matches the rest of the path verbatim, not captured.
  Wildcard,
}

#[derive(Debug, Clone)]
enum SegmentMatcher {
  String,
  Int,
  Float,
  Uuid,
  Regex(Regex),
}

impl SegmentMatcher {
  fn is_match(&self, part: &str) -> bool {
    match self {
      SegmentMatcher::String => !part.is_empty(),
      SegmentMatcher::Int => part.parse::<i64>().is_ok(),
      SegmentMatcher::Float => part.parse::<f64>().is_ok(),
      SegmentMatcher::Uuid => uuid::Uuid::parse_str(part).is_ok(),
      SegmentMatcher::Regex(re) => re.is_match(part),
    }
  }
}

/// A compiled path template: an ordered list of segments plus the param
/// descriptors in declaration order. Immutable once built.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
  template: String,
  segments: Vec<Segment>,
  params: Vec<ParamDescriptor>,
}

impl CompiledPattern {
  /// Compiles a template. Fails per spec §4.A: duplicate parameter names,
  /// unknown types, or an unanchored (non-`/`-prefixed) template.
  pub fn compile(template: &str) -> Result<Self, PatternError> {
    if !template.starts_with('/') {
      return Err(PatternError::NotAnchored(template.to_string()));
    }

    let mut segments = Vec::new();
    let mut params = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let trimmed = template.trim_start_matches('/').trim_end_matches('/');
    let parts: Vec<&str> = if trimmed.is_empty() {
      Vec::new()
    } else {
      trimmed.split('/').collect()
    };

    for (idx, part) in parts.iter().enumerate() {
      if *part == "*" {
        if idx != parts.len() - 1 {
          return Err(PatternError::WildcardNotLast(template.to_string()));
        }
        segments.push(Segment::Wildcard);
        continue;
      }

      if part.starts_with('{') && part.ends_with('}') {
        let inner = &part[1..part.len() - 1];
        let (name, ty_str) = match inner.split_once(':') {
          Some((n, t)) => (n, t),
          None => (inner, "string"),
        };

        if !seen.insert(name.to_string()) {
          return Err(PatternError::DuplicateParam(
            name.to_string(),
            template.to_string(),
          ));
        }

        let (ty, matcher) = if let Some(pat) = ty_str.strip_prefix("regex:") {
          let re = Regex::new(pat).map_err(|e| {
            PatternError::InvalidRegex(pat.to_string(), name.to_string(), e)
          })?;
          (ParamType::Regex(pat.to_string()), SegmentMatcher::Regex(re))
        } else {
          match ty_str {
            "string" => (ParamType::String, SegmentMatcher::String),
            "int" => (ParamType::Int, SegmentMatcher::Int),
            "float" => (ParamType::Float, SegmentMatcher::Float),
            "uuid" => (ParamType::Uuid, SegmentMatcher::Uuid),
            other => {
              return Err(PatternError::UnknownType(
                other.to_string(),
                name.to_string(),
                template.to_string(),
              ))
            }
          }
        };

        params.push(ParamDescriptor {
          name: name.to_string(),
          ty,
        });
        segments.push(Segment::Param {
          name: name.to_string(),
          matcher,
        });
        continue;
      }

      segments.push(Segment::Literal(part.to_string()));
    }

    Ok(CompiledPattern {
      template: template.to_string(),
      segments,
      params,
    })
  }

  pub fn template(&self) -> &str {
    &self.template
  }

  pub fn params(&self) -> &[ParamDescriptor] {
    &self.params
  }

  /// Attempts to match `path` (already trimmed, leading/trailing slashes
  /// removed by the caller per the registry's convention). On success,
  /// returns the captured strings in the same order as `params()`.
  pub fn matches(&self, path: &str) -> Option<Vec<String>> {
    let path_parts: Vec<&str> = if path.is_empty() {
      Vec::new()
    } else {
      path.split('/').collect()
    };

    let has_wildcard = matches!(self.segments.last(), Some(Segment::Wildcard));
    if !has_wildcard && path_parts.len() != self.segments.len() {
      return None;
    }
    if has_wildcard && path_parts.len() < self.segments.len() {
      return None;
    }

    let mut captures = Vec::with_capacity(self.params.len());
    for (i, seg) in self.segments.iter().enumerate() {
      match seg {
        Segment::Wildcard => break,
        Segment::Literal(lit) => {
          let part = path_parts.get(i)?;
          if !lit.eq_ignore_ascii_case(part) {
            return None;
          }
        }
        Segment::Param { matcher, .. } => {
          let part = path_parts.get(i)?;
          if !matcher.is_match(part) {
            return None;
          }
          captures.push((*part).to_string());
        }
      }
    }

    Some(captures)
  }

  /// Reassembles a URL from captured strings, used by property test #2
  /// (pattern round-trip).
  pub fn reassemble(&self, captures: &[String]) -> String {
    let mut out = String::from("/");
    let mut cap_iter = captures.iter();
    let mut first = true;
    for seg in &self.segments {
      if !first {
        out.push('/');
      }
      first = false;
      match seg {
        Segment::Literal(lit) => out.push_str(lit),
        Segment::Param { .. } => {
          if let Some(c) = cap_iter.next() {
            out.push_str(c);
          }
        }
        Segment::Wildcard => out.push('*'),
      }
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compiles_literal_and_typed_segments() {
    let p = CompiledPattern::compile("/users/{id:int}").unwrap();
    assert_eq!(p.params().len(), 1);
    assert_eq!(p.params()[0].name, "id");
    assert_eq!(p.params()[0].ty, ParamType::Int);
  }

  #[test]
  fn rejects_unanchored_template() {
    assert!(matches!(
      CompiledPattern::compile("users/{id:int}"),
      Err(PatternError::NotAnchored(_))
    ));
  }

  #[test]
  fn rejects_duplicate_param_names() {
    let err = CompiledPattern::compile("/a/{id:int}/b/{id:string}").unwrap_err();
    assert!(matches!(err, PatternError::DuplicateParam(_, _)));
  }

  #[test]
  fn rejects_unknown_type() {
    let err = CompiledPattern::compile("/a/{id:bogus}").unwrap_err();
    assert!(matches!(err, PatternError::UnknownType(_, _, _)));
  }

  #[test]
  fn matches_case_insensitive_literals() {
    let p = CompiledPattern::compile("/Users/Profile").unwrap();
    assert!(p.matches("users/profile").is_some());
  }

  #[test]
  fn matches_and_captures_in_declaration_order() {
    let p = CompiledPattern::compile("/a/{x:int}/b/{y:string}").unwrap();
    let caps = p.matches("a/1/b/hello").unwrap();
    assert_eq!(caps, vec!["1".to_string(), "hello".to_string()]);
  }

  #[test]
  fn round_trip_reassembles_original_path() {
    let p = CompiledPattern::compile("/users/{id:int}/posts/{slug:string}").unwrap();
    let url = "users/42/posts/hello-world";
    let caps = p.matches(url).unwrap();
    assert_eq!(p.reassemble(&caps), format!("/{url}"));
  }

  #[test]
  fn regex_segment_matches_custom_pattern() {
    let p = CompiledPattern::compile("/tag/{name:regex:^[a-z]{3}$}").unwrap();
    assert!(p.matches("tag/abc").is_some());
    assert!(p.matches("tag/abcd").is_none());
  }

  #[test]
  fn wildcard_matches_remaining_segments() {
    let p = CompiledPattern::compile("/static/*").unwrap();
    assert!(p.matches("static/a/b/c.png").is_some());
    assert!(p.matches("static").is_none());
  }

  #[test]
  fn uuid_type_requires_valid_uuid() {
    let p = CompiledPattern::compile("/items/{id:uuid}").unwrap();
    assert!(p.matches("items/550e8400-e29b-41d4-a716-446655440000").is_some());
    assert!(p.matches("items/not-a-uuid").is_none());
  }
}
