//! Topic pattern tokenizing and matching.
//!
//! A topic is a dot-separated sequence of tokens, e.g. `"order.created.v1"`.
//! A token of `*` matches any single token at that position. Matching is
//! bilateral: either side of the comparison may carry a wildcard token, so
//! two subscription patterns can be compared for overlap the same way a
//! pattern is compared against a concrete publish key. Arity is fixed —
//! patterns with a different number of tokens never match.

pub const WILDCARD: &str = "*";

#[derive(Debug)]
pub struct TopicError {
    pub topic: String,
}

impl std::fmt::Display for TopicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid topic: {:?}", self.topic)
    }
}

impl std::error::Error for TopicError {}

/// Split a topic string into its dot-separated tokens, rejecting the empty
/// topic and topics with an empty token (`"order..v1"`, a leading or
/// trailing dot).
pub fn tokenize(topic: &str) -> Result<Vec<&str>, TopicError> {
    if topic.is_empty() {
        return Err(TopicError { topic: topic.to_string() });
    }
    let tokens: Vec<&str> = topic.split('.').collect();
    if tokens.iter().any(|t| t.is_empty()) {
        return Err(TopicError { topic: topic.to_string() });
    }
    Ok(tokens)
}

/// Whether `a` and `b` match token-by-token: same arity, and at each
/// position at least one side is `*` or the tokens are equal.
pub fn matches(a: &[&str], b: &[&str]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| *x == WILDCARD || *y == WILDCARD || x == y)
}
