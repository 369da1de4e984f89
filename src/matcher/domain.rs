use crate::types::HostInfo;

/// How a literal domain pattern applies to the query name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainMode {
    /// `example.com` matches only itself.
    Exact,
    /// `*.example.com`: the base domain or anything under it.
    Wildcard,
    /// `suffix:example.com`: same coverage as the wildcard form.
    Suffix,
}

/// Literal domain matcher for rules written directly in the rulebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMatcher {
    pattern: String,
    mode: DomainMode,
}

impl DomainMatcher {
    /// `pattern` must already have its `*.`/`suffix:` marker stripped.
    pub fn new(pattern: &str, mode: DomainMode) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            mode,
        }
    }

    pub fn matches(&self, host: &HostInfo) -> bool {
        let name = host.name.as_str();
        if name.is_empty() {
            return false;
        }
        match self.mode {
            DomainMode::Exact => name == self.pattern,
            DomainMode::Wildcard | DomainMode::Suffix => {
                name == self.pattern
                    || name
                        .strip_suffix(self.pattern.as_str())
                        .is_some_and(|head| head.ends_with('.'))
            }
        }
    }
}
