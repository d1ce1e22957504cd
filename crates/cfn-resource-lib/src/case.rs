//! Key-casing conversion between the wire contract and callback payloads.
//!
//! Wire keys are `PascalCase` (`TPSCode`, `ResourceARN`), callback keys are
//! `camelCase` (`tpsCode`, `resourceARN`). Conversion walks mappings and
//! sequences recursively and never touches leaf values.
//!
//! A leading acronym collapses to lowercase as one unit (`TPSCode` →
//! `tpsCode`), so the reverse direction cannot recover it from the key alone.
//! A transformer built with [`CaseTransformer::with_wire_keys`] remembers the
//! declared wire spelling of every schema key and uses it on the way back.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use tracing::debug;

/// Maximum number of memoized conversions per direction.
const CACHE_CAPACITY: usize = 100_000;

/// Keys at or above this length are converted but never memoized.
const MAX_CACHED_KEY_LEN: usize = 100;

/// Process-wide memoization, keyed by the original key string.
static CALLBACK_KEYS: Lazy<Mutex<LruCache<String, String>>> = Lazy::new(new_cache);
static WIRE_KEYS: Lazy<Mutex<LruCache<String, String>>> = Lazy::new(new_cache);

fn new_cache() -> Mutex<LruCache<String, String>> {
    let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(capacity))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Callback,
    Wire,
}

/// Bidirectional key-casing converter.
///
/// Holds no invocation state; share one instance across invocations.
#[derive(Debug, Clone, Default)]
pub struct CaseTransformer {
    /// callback key → declared wire key, for keys the generic rule cannot
    /// reproduce.
    wire_aliases: HashMap<String, String>,
}

impl CaseTransformer {
    /// Transformer using only the generic casing rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transformer that restores the exact spelling of the given wire keys.
    pub fn with_wire_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut wire_aliases = HashMap::new();
        for wire in keys {
            let callback = callback_key(wire);
            if wire_key(&callback) == wire {
                continue;
            }
            match wire_aliases.get(&callback) {
                Some(existing) if existing != wire => {
                    debug!(
                        callback = %callback,
                        kept = %existing,
                        ignored = %wire,
                        "ambiguous wire key casing"
                    );
                }
                Some(_) => {}
                None => {
                    wire_aliases.insert(callback, wire.to_string());
                }
            }
        }
        Self { wire_aliases }
    }

    /// Converts every mapping key to callback casing.
    pub fn to_callback_case(&self, value: &Value) -> Value {
        self.transform(value, Direction::Callback)
    }

    /// Converts every mapping key to wire casing.
    pub fn to_wire_case(&self, value: &Value) -> Value {
        self.transform(value, Direction::Wire)
    }

    pub fn to_callback_key(&self, key: &str) -> String {
        memoized(&CALLBACK_KEYS, key, callback_key)
    }

    pub fn to_wire_key(&self, key: &str) -> String {
        if let Some(alias) = self.wire_aliases.get(key) {
            return alias.clone();
        }
        memoized(&WIRE_KEYS, key, wire_key)
    }

    fn transform(&self, value: &Value, direction: Direction) -> Value {
        match value {
            Value::Object(map) => {
                let converted: Map<String, Value> = map
                    .iter()
                    .map(|(key, inner)| {
                        let key = match direction {
                            Direction::Callback => self.to_callback_key(key),
                            Direction::Wire => self.to_wire_key(key),
                        };
                        (key, self.transform(inner, direction))
                    })
                    .collect();
                Value::Object(converted)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.transform(item, direction))
                    .collect(),
            ),
            leaf => leaf.clone(),
        }
    }
}

fn memoized(
    cache: &Lazy<Mutex<LruCache<String, String>>>,
    key: &str,
    convert: fn(&str) -> String,
) -> String {
    if let Ok(mut guard) = cache.lock() {
        if let Some(hit) = guard.get(key) {
            return hit.clone();
        }
    }

    let converted = convert(key);
    if key.len() < MAX_CACHED_KEY_LEN {
        if let Ok(mut guard) = cache.lock() {
            guard.put(key.to_string(), converted.clone());
        }
    }
    converted
}

/// Splits a key into words on separators, lower→upper transitions and the
/// end of an uppercase run (`TPSCode` → `TPS`, `Code`).
fn split_words(key: &str) -> Vec<String> {
    let chars: Vec<char> = key.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | '-' | '.' | ' ') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn is_acronym(word: &str) -> bool {
    word.chars().count() > 1 && word.chars().all(|c| !c.is_lowercase())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn callback_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, word) in split_words(key).iter().enumerate() {
        if i == 0 {
            out.push_str(&word.to_lowercase());
        } else if is_acronym(word) {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

fn wire_key(key: &str) -> String {
    split_words(key).iter().map(|word| capitalize(word)).collect()
}
