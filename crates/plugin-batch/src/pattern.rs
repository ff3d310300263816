//! Batch URL pattern parsing.
//!
//! Two notations are recognised:
//!
//! - Range: `http://host/img{001..010}.jpg` or `http://host/img[1-10].jpg`.
//!   Both bounds are inclusive; the wider of the two literal tokens sets
//!   the zero padding.
//! - Sequential: `http://host/part00*.rar`. The `*` stands for an
//!   open-ended index starting at 1; each `0` directly before it adds one
//!   digit of padding.

use serde::{Deserialize, Serialize};

/// How candidate indices of a pattern are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Closed interval `[start, end]`.
    Range,
    /// Open-ended walk from `start`.
    Sequential,
}

/// A URL decomposed around its varying numeric index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPattern {
    pub kind: PatternKind,
    pub prefix: String,
    pub suffix: String,
    pub start: u64,
    /// Inclusive upper bound. Only set for [`PatternKind::Range`].
    pub end: Option<u64>,
    /// Minimum digit count of a generated index.
    pub pad_length: usize,
}

impl BatchPattern {
    /// Builds the candidate URL for `index`.
    ///
    /// The index is left-padded with zeros to `pad_length` digits; wider
    /// indices are emitted in full.
    pub fn url_for(&self, index: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.suffix,
            width = self.pad_length
        )
    }

    /// Same pattern with a different start index.
    pub fn starting_at(&self, start: u64) -> Self {
        Self {
            start,
            ..self.clone()
        }
    }
}

/// Cheap pre-check: does `url` contain anything that looks like a batch token?
pub fn is_batchable(url: &str) -> bool {
    url.contains('*')
        || (url.contains('{') && url.contains(".."))
        || (url.contains('[') && url.contains('-'))
}

/// Decomposes `url` into a [`BatchPattern`].
///
/// Range notation takes precedence over sequential notation, and `{a..b}`
/// over `[a-b]`. When a notation occurs more than once, the rightmost
/// well-formed token is the varying one and the others stay literal.
/// Sequential notation uses the first `*`; later ones stay in the suffix.
/// Returns `None` when nothing is well formed or the range is reversed.
pub fn parse(url: &str) -> Option<BatchPattern> {
    match find_range_token(url, '{', '}', "..").or_else(|| find_range_token(url, '[', ']', "-")) {
        Some((at, token)) => range_pattern(url, at, token),
        None => parse_sequential(url),
    }
}

fn range_pattern(url: &str, at: usize, token: RangeToken<'_>) -> Option<BatchPattern> {
    let start: u64 = token.start.parse().ok()?;
    let end: u64 = token.end.parse().ok()?;
    if start > end {
        return None;
    }

    Some(BatchPattern {
        kind: PatternKind::Range,
        prefix: url[..at].to_string(),
        suffix: url[at + token.len..].to_string(),
        start,
        end: Some(end),
        pad_length: token.start.len().max(token.end.len()),
    })
}

struct RangeToken<'a> {
    start: &'a str,
    end: &'a str,
    /// Byte length of the whole token including delimiters.
    len: usize,
}

/// Finds the rightmost `<open>digits<separator>digits<close>` token.
fn find_range_token<'a>(
    url: &'a str,
    open: char,
    close: char,
    separator: &str,
) -> Option<(usize, RangeToken<'a>)> {
    url.rmatch_indices(open).find_map(|(at, _)| {
        let body_start = at + open.len_utf8();
        let body_len = url[body_start..].find(close)?;
        let body = &url[body_start..body_start + body_len];
        let (start, end) = body.split_once(separator)?;

        if !is_digits(start) || !is_digits(end) {
            return None;
        }

        Some((
            at,
            RangeToken {
                start,
                end,
                len: open.len_utf8() + body_len + close.len_utf8(),
            },
        ))
    })
}

fn parse_sequential(url: &str) -> Option<BatchPattern> {
    let (head, suffix) = url.split_once('*')?;

    let prefix = head.trim_end_matches('0');
    let zeros = head.len() - prefix.len();

    Some(BatchPattern {
        kind: PatternKind::Sequential,
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
        start: 1,
        end: None,
        pad_length: zeros + 1,
    })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
