//! A standard segmented path tree over `:name` variables.
//!
//! Kept as a simple `Vec<PathTemplate>` scanned linearly rather than a true
//! radix tree — the number of registered routes in any one service is small
//! enough that this never shows up as a bottleneck, and it keeps the
//! matching rule (segment count equal, each segment either a literal match
//! or a `:name` capture) easy to read straight off the code.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

/// A parsed route path, e.g. `/group/:ID/members/:Name`.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Capture(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self { segments }
    }

    /// Match `path` against this template, returning the captured
    /// `:name` -> value pairs in template order on success.
    pub fn matches<'a>(&self, path: &'a str) -> Option<Vec<(&str, &'a str)>> {
        let incoming: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if incoming.len() != self.segments.len() {
            return None;
        }

        let mut captures = Vec::new();
        for (template_segment, actual) in self.segments.iter().zip(incoming.iter()) {
            match template_segment {
                Segment::Literal(literal) if literal == actual => {}
                Segment::Literal(_) => return None,
                Segment::Capture(name) => captures.push((name.as_str(), *actual)),
            }
        }
        Some(captures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_literal_segments_exactly() {
        let template = PathTemplate::parse("/healthz");
        assert!(template.matches("/healthz").is_some());
        assert!(template.matches("/healthzz").is_none());
    }

    #[test]
    fn captures_named_variables_in_order() {
        let template = PathTemplate::parse("/group/:ID/members/:Name");
        let captures = template.matches("/group/42/members/ada").unwrap();
        assert_eq!(captures, vec![("ID", "42"), ("Name", "ada")]);
    }

    #[test]
    fn rejects_mismatched_segment_count() {
        let template = PathTemplate::parse("/group/:ID");
        assert!(template.matches("/group/42/members/ada").is_none());
        assert!(template.matches("/group").is_none());
    }

    #[test]
    fn leading_and_trailing_slashes_are_insignificant() {
        let template = PathTemplate::parse("/group/:ID/");
        assert_eq!(template.matches("group/7").unwrap(), vec![("ID", "7")]);
    }
}
