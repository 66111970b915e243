//! Cherry-pick branch naming.
//!
//! Produces `<prefix>/<sanitized-target>/pr-<number>`, lowercase and bounded
//! in length. Names are consumed by external tooling, so the format is stable:
//! the same inputs always yield the same name.
//!
//! Truncated segments end in a prefix of the SHA-256 hex digest of the full
//! sanitized segment. Tools that hash with a different function (FNV, say)
//! produce different truncated names for the same target.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static DISALLOWED_BRANCH_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9._/-]+").unwrap_or_else(|e| panic!("invalid branch regex: {e}"))
});

/// Default branch prefix for generated cherry-pick branches.
pub const DEFAULT_PREFIX: &str = "cherry-pick";

/// Default maximum branch length (fits common ref and DNS-label limits).
pub const DEFAULT_MAX_LENGTH: usize = 63;

/// Default number of hex digits in the truncation hash suffix.
pub const DEFAULT_HASH_LENGTH: usize = 8;

/// Controls how cherry-pick branch names are generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNamingOptions {
    pub prefix: String,
    pub max_length: usize,
    pub hash_length: usize,
    /// Substituted when the sanitized target is empty.
    pub empty_fallback: String,
}

impl Default for BranchNamingOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            max_length: DEFAULT_MAX_LENGTH,
            hash_length: DEFAULT_HASH_LENGTH,
            empty_fallback: "target".to_string(),
        }
    }
}

impl BranchNamingOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_hash_length(mut self, hash_length: usize) -> Self {
        self.hash_length = hash_length;
        self
    }
}

/// Branch name for cherry-picking `source_pr` onto `target_branch` with default options.
pub fn branch_name_for(target_branch: &str, source_pr: u64) -> String {
    branch_name_with(target_branch, source_pr, &BranchNamingOptions::default())
}

/// Branch name for cherry-picking `source_pr` onto `target_branch`.
///
/// Targets that would push the name past `options.max_length` are truncated
/// and suffixed with a short hash of the full sanitized segment, so distinct
/// long targets stay distinct.
pub fn branch_name_with(target_branch: &str, source_pr: u64, options: &BranchNamingOptions) -> String {
    let fallback = sanitize_segment(non_empty_or(&options.empty_fallback, "target"), "target");
    let prefix = non_empty_or(&options.prefix, DEFAULT_PREFIX);
    let max_length = if options.max_length == 0 {
        DEFAULT_MAX_LENGTH
    } else {
        options.max_length
    };
    let hash_length = if options.hash_length == 0 {
        DEFAULT_HASH_LENGTH
    } else {
        options.hash_length
    };

    let sanitized = sanitize_segment(target_branch, &fallback);
    let pr_segment = format!("pr-{source_pr}");
    let branch = format!("{prefix}/{sanitized}/{pr_segment}");

    if branch.len() <= max_length {
        return branch;
    }

    let available = max_length
        .saturating_sub(prefix.len() + 1 + pr_segment.len() + 1)
        .max(1);

    let shortened = shorten_segment(&sanitized, available, hash_length, &fallback);
    format!("{prefix}/{shortened}/{pr_segment}")
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

/// Sanitize a target branch into a single lowercase, ASCII-safe path segment.
pub fn sanitize_segment(segment: &str, fallback: &str) -> String {
    let segment = segment.trim().replace(' ', "-");
    let segment = DISALLOWED_BRANCH_CHARS.replace_all(&segment, "-");
    let segment = segment.trim_matches(|c| matches!(c, '-' | '/' | '.'));

    let mut segment = if segment.is_empty() {
        fallback.to_string()
    } else {
        segment.to_string()
    };

    segment = segment.to_lowercase().replace("-/-", "/");
    while segment.contains("//") {
        segment = segment.replace("//", "/");
    }
    while segment.contains("--") {
        segment = segment.replace("--", "-");
    }

    let segment = segment.trim_matches('-');
    if segment.is_empty() {
        fallback.to_string()
    } else {
        segment.to_string()
    }
}

/// Stable short hex hash of `segment`.
pub fn short_hash(segment: &str, hash_length: usize) -> String {
    let digest = hex::encode(Sha256::digest(segment.as_bytes()));
    digest[..hash_length.min(digest.len())].to_string()
}

fn shorten_segment(segment: &str, available: usize, hash_length: usize, fallback: &str) -> String {
    if segment.len() <= available {
        return segment.to_string();
    }

    let hash = short_hash(segment, hash_length);
    let suffix = format!("-{hash}");

    if suffix.len() > available {
        // No room for the separator; keep as much of the hash as fits.
        return hash[..available.min(hash.len())].to_string();
    }

    let base_len = available - suffix.len();
    if base_len == 0 {
        return suffix[suffix.len() - available..].to_string();
    }

    // Sanitized segments are ASCII, so byte slicing is safe.
    let base = segment[..base_len.min(segment.len())].trim_end_matches(['-', '.', '/']);
    let base = if base.is_empty() {
        &fallback[..base_len.min(fallback.len())]
    } else {
        base
    };

    format!("{}{}", base.trim_end_matches(['-', '.', '/']), suffix)
}
