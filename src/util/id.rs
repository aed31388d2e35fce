//! Hierarchical issue IDs.
//!
//! Format: `<prefix>-<token>(.<n>)*` where the token is random base36
//! (0-9, a-z) and the dotted suffix expresses nesting up to a configured
//! max depth. Token length adapts to database size using a birthday
//! bound so small projects get short IDs.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{BeadsError, Result};

/// Default maximum nesting depth for dotted IDs.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// ID generation configuration.
#[derive(Debug, Clone)]
pub struct IdConfig {
    /// Per-repo prefix (e.g. "bd").
    pub prefix: String,
    pub min_token_length: usize,
    pub max_token_length: usize,
    /// Collision probability ceiling before the token grows.
    pub max_collision_prob: f64,
    /// Maximum dotted nesting depth.
    pub max_depth: usize,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            prefix: "bd".to_string(),
            min_token_length: 3,
            max_token_length: 8,
            max_collision_prob: 0.25,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl IdConfig {
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }
}

/// A parsed hierarchical ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParts {
    pub prefix: String,
    pub token: String,
    /// Dotted child suffixes, outermost first.
    pub path: Vec<u32>,
}

impl IdParts {
    /// Nesting depth: 0 for a root ID, 1 for `x.1`, and so on.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Parse and validate an ID of the form `<prefix>-<base36>(.<n>)*`.
///
/// # Errors
///
/// Returns `InvalidId` when the shape is wrong or the token contains
/// characters outside base36.
pub fn parse_id(id: &str) -> Result<IdParts> {
    let invalid = || BeadsError::InvalidId { id: id.to_string() };

    let (prefix, rest) = id.rsplit_once('-').ok_or_else(invalid)?;
    if prefix.is_empty() || rest.is_empty() {
        return Err(invalid());
    }

    let mut segments = rest.split('.');
    let token = segments.next().ok_or_else(invalid)?;
    if token.is_empty()
        || !token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let mut path = Vec::new();
    for segment in segments {
        let n: u32 = segment.parse().map_err(|_| invalid())?;
        if n == 0 {
            return Err(invalid());
        }
        path.push(n);
    }

    Ok(IdParts {
        prefix: prefix.to_string(),
        token: token.to_string(),
        path,
    })
}

/// The dotted parent of an ID, or `None` for root IDs.
#[must_use]
pub fn parent_id(id: &str) -> Option<String> {
    let dash = id.rfind('-')?;
    let suffix = &id[dash + 1..];
    let dot = suffix.rfind('.')?;
    Some(id[..dash + 1 + dot].to_string())
}

/// Nesting depth of an ID (0 for roots).
#[must_use]
pub fn id_depth(id: &str) -> usize {
    id.rfind('-')
        .map_or(0, |dash| id[dash + 1..].matches('.').count())
}

/// Build a child ID from a parent and a counter-assigned suffix.
#[must_use]
pub fn child_id(parent: &str, suffix: i64) -> String {
    format!("{parent}.{suffix}")
}

/// ID generator producing unique root IDs.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    config: IdConfig,
}

impl IdGenerator {
    #[must_use]
    pub const fn new(config: IdConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    /// Token length keeping the birthday-bound collision probability
    /// under the configured ceiling for the given issue count.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )]
    pub fn optimal_length(&self, issue_count: usize) -> usize {
        let n = issue_count as f64;
        for len in self.config.min_token_length..=self.config.max_token_length {
            let space = 36_f64.powi(len as i32);
            let prob = 1.0 - (-n * n / (2.0 * space)).exp();
            if prob < self.config.max_collision_prob {
                return len;
            }
        }
        self.config.max_token_length
    }

    /// Generate a fresh root ID, consulting `exists` for collisions.
    pub fn generate<F>(&self, title: &str, created_at: DateTime<Utc>, issue_count: usize, exists: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let mut length = self.optimal_length(issue_count);

        loop {
            for nonce in 0..10u32 {
                let id = self.candidate(title, created_at, nonce, length);
                if !exists(&id) {
                    return id;
                }
            }
            if length < self.config.max_token_length {
                length += 1;
            } else {
                // Exhausted the normal space; widen and walk nonces.
                let mut nonce = 10u32;
                loop {
                    let id = self.candidate(title, created_at, nonce, 12);
                    if !exists(&id) {
                        return id;
                    }
                    nonce += 1;
                }
            }
        }
    }

    fn candidate(
        &self,
        title: &str,
        created_at: DateTime<Utc>,
        nonce: u32,
        length: usize,
    ) -> String {
        let seed = format!(
            "{title}|{}|{nonce}",
            created_at.timestamp_nanos_opt().unwrap_or(0)
        );
        format!("{}-{}", self.config.prefix, base36_token(&seed, length))
    }
}

/// SHA-256 the seed, fold the first 8 bytes into a u64, encode base36,
/// and truncate to `length`.
#[must_use]
pub fn base36_token(seed: &str, length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let digest = hasher.finalize();

    let mut num = 0u64;
    for &byte in digest.iter().take(8) {
        num = (num << 8) | u64::from(byte);
    }

    let mut encoded = base36_encode(num);
    if encoded.len() < length {
        encoded = format!("{encoded:0>length$}");
    }
    encoded.chars().take(length).collect()
}

fn base36_encode(mut num: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if num == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while num > 0 {
        chars.push(ALPHABET[(num % 36) as usize] as char);
        num /= 36;
    }
    chars.into_iter().rev().collect()
}
