//! Transformer pipeline (spec §4.D): converts matched path segments to
//! domain-typed values, with a dispatch-scoped cache for transformers
//! marked cacheable.
//!
//! This replaces the source's exception-for-flow-control pattern (spec §9):
//! a failing transformer produces `Err(TransformerException)` which the
//! pipeline turns into a `Sentinel` slot rather than unwinding, and the
//! dispatcher matches on that instead of catching an exception.

use crate::registry::ArgValues;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransformerException(pub String);

pub trait Transformer: Send + Sync {
  /// A stable identifier for this transformer's *type*, used as half of
  /// the dispatch cache key. Two different `Arc<dyn Transformer>`
  /// instances of the same logical transformer must return the same id.
  fn type_id(&self) -> &str;

  fn transform(&self, input: &str) -> Result<Arc<dyn Any + Send + Sync>, TransformerException>;
}

/// Bound to a parameter name at registration time.
pub struct TransformerDescriptor {
  pub parameter: String,
  pub transformer: Arc<dyn Transformer>,
  pub cacheable: bool,
}

pub struct IntTransformer;
impl Transformer for IntTransformer {
  fn type_id(&self) -> &str {
    "builtin.int"
  }
  fn transform(&self, input: &str) -> Result<Arc<dyn Any + Send + Sync>, TransformerException> {
    input
      .parse::<i64>()
      .map(|v| Arc::new(v) as Arc<dyn Any + Send + Sync>)
      .map_err(|e| TransformerException(format!("not an integer: {e}")))
  }
}

pub struct FloatTransformer;
impl Transformer for FloatTransformer {
  fn type_id(&self) -> &str {
    "builtin.float"
  }
  fn transform(&self, input: &str) -> Result<Arc<dyn Any + Send + Sync>, TransformerException> {
    input
      .parse::<f64>()
      .map(|v| Arc::new(v) as Arc<dyn Any + Send + Sync>)
      .map_err(|e| TransformerException(format!("not a float: {e}")))
  }
}

pub struct UuidTransformer;
impl Transformer for UuidTransformer {
  fn type_id(&self) -> &str {
    "builtin.uuid"
  }
  fn transform(&self, input: &str) -> Result<Arc<dyn Any + Send + Sync>, TransformerException> {
    uuid::Uuid::parse_str(input)
      .map(|v| Arc::new(v) as Arc<dyn Any + Send + Sync>)
      .map_err(|e| TransformerException(format!("not a uuid: {e}")))
  }
}

pub struct StringTransformer;
impl Transformer for StringTransformer {
  fn type_id(&self) -> &str {
    "builtin.string"
  }
  fn transform(&self, input: &str) -> Result<Arc<dyn Any + Send + Sync>, TransformerException> {
    Ok(Arc::new(input.to_string()) as Arc<dyn Any + Send + Sync>)
  }
}

pub fn builtin_transformer(ty: &crate::pattern::ParamType) -> Arc<dyn Transformer> {
  match ty {
    crate::pattern::ParamType::Int => Arc::new(IntTransformer),
    crate::pattern::ParamType::Float => Arc::new(FloatTransformer),
    crate::pattern::ParamType::Uuid => Arc::new(UuidTransformer),
    crate::pattern::ParamType::String | crate::pattern::ParamType::Regex(_) => {
      Arc::new(StringTransformer)
    }
  }
}

/// One dispatch's worth of memoized transformer results; cleared when the
/// request/message completes (spec §4.D: "cache lifetime is exactly one
/// request/message").
#[derive(Default)]
pub struct DispatchCache {
  entries: HashMap<(String, String), Arc<dyn Any + Send + Sync>>,
}

impl DispatchCache {
  pub fn new() -> Self {
    Self::default()
  }
}

/// The outcome of running one parameter slot through its transformer.
enum Slot {
  Value(Arc<dyn Any + Send + Sync>),
  Error { parameter: String, message: String },
}

/// Runs `descriptors` against `captures` (same length, same order). Returns
/// `Ok(args)` if every slot transformed successfully, or the first error
/// encountered -- spec §4.D step 3 says a sentinel is substituted and the
/// *endpoint* is skipped, which callers implement by treating `Err` as
/// "skip this endpoint, surface this error".
pub fn run_pipeline(
  descriptors: &[TransformerDescriptor],
  captures: &[String],
  cache: &mut DispatchCache,
) -> Result<ArgValues, TransformerException> {
  let mut args = ArgValues::with_capacity(descriptors.len());
  let mut first_error = None;

  for (descriptor, input) in descriptors.iter().zip(captures.iter()) {
    let slot = run_one(descriptor, input, cache);
    match slot {
      Slot::Value(v) => args.push(v),
      Slot::Error { parameter, message } => {
        if first_error.is_none() {
          first_error = Some(TransformerException(format!(
            "parameter `{parameter}`: {message}"
          )));
        }
        // Keep a sentinel placeholder so indices still line up; the
        // caller won't use `args` once an error is returned.
        args.push(Arc::new(()) as Arc<dyn Any + Send + Sync>);
      }
    }
  }

  match first_error {
    Some(e) => Err(e),
    None => Ok(args),
  }
}

fn run_one(descriptor: &TransformerDescriptor, input: &str, cache: &mut DispatchCache) -> Slot {
  let cache_key = (descriptor.transformer.type_id().to_string(), input.to_string());

  if descriptor.cacheable {
    if let Some(cached) = cache.entries.get(&cache_key) {
      return Slot::Value(cached.clone());
    }
  }

  match descriptor.transformer.transform(input) {
    Ok(value) => {
      if descriptor.cacheable {
        cache.entries.insert(cache_key, value.clone());
      }
      Slot::Value(value)
    }
    Err(e) => Slot::Error {
      parameter: descriptor.parameter.clone(),
      message: e.0,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingTransformer {
    calls: Arc<AtomicUsize>,
  }

  impl Transformer for CountingTransformer {
    fn type_id(&self) -> &str {
      "test.counting"
    }
    fn transform(
      &self,
      input: &str,
    ) -> Result<Arc<dyn Any + Send + Sync>, TransformerException> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(Arc::new(input.to_string()) as Arc<dyn Any + Send + Sync>)
    }
  }

  #[test]
  fn cacheable_transformer_runs_once_for_repeated_input_in_one_dispatch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transformer: Arc<dyn Transformer> = Arc::new(CountingTransformer {
      calls: calls.clone(),
    });

    let descriptors = vec![
      TransformerDescriptor {
        parameter: "a".to_string(),
        transformer: transformer.clone(),
        cacheable: true,
      },
      TransformerDescriptor {
        parameter: "b".to_string(),
        transformer,
        cacheable: true,
      },
    ];
    let captures = vec!["same".to_string(), "same".to_string()];

    let mut cache = DispatchCache::new();
    let args = run_pipeline(&descriptors, &captures, &mut cache).unwrap();
    assert_eq!(args.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn cache_is_empty_across_dispatches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transformer: Arc<dyn Transformer> = Arc::new(CountingTransformer {
      calls: calls.clone(),
    });
    let descriptors = vec![TransformerDescriptor {
      parameter: "a".to_string(),
      transformer,
      cacheable: true,
    }];

    let mut cache1 = DispatchCache::new();
    run_pipeline(&descriptors, &["x".to_string()], &mut cache1).unwrap();
    let mut cache2 = DispatchCache::new();
    run_pipeline(&descriptors, &["x".to_string()], &mut cache2).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn failing_transformer_surfaces_error_and_skips_endpoint() {
    let descriptors = vec![TransformerDescriptor {
      parameter: "id".to_string(),
      transformer: Arc::new(IntTransformer),
      cacheable: true,
    }];
    let mut cache = DispatchCache::new();
    let err = run_pipeline(&descriptors, &["not-an-int".to_string()], &mut cache).unwrap_err();
    assert!(err.0.contains("id"));
  }
}
