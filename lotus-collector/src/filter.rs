//! Exclusion filtering of captured lines.

/// Returns false iff `line` contains any of the exclusion substrings.
///
/// `None` or an empty set keeps every line.
pub fn should_keep(line: &str, exclusions: Option<&[String]>) -> bool {
    match exclusions {
        Some(words) => !words.iter().any(|word| line.contains(word.as_str())),
        None => true,
    }
}

/// Owned exclusion set applied by the capture loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFilter {
    exclusions: Vec<String>,
}

impl LineFilter {
    pub fn new(exclusions: Vec<String>) -> Self {
        Self { exclusions }
    }

    pub fn should_keep(&self, line: &str) -> bool {
        should_keep(line, Some(&self.exclusions))
    }
}
