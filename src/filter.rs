//! `PathFilter`: the ignore-name set, hidden-entry rule, and blacklist /
//! whitelist regex pair consulted by the Enumerator (spec.md §4.1 steps 3
//! and 5).

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use crate::error::{EngineError, EngineResult};

/// Concrete name/regex filtering policy. Regex decisions are last-match-wins
/// within each of the blacklist and whitelist (spec.md §4.1: "Ignore matcher
/// decisions are authoritative last-match-wins").
pub struct PathFilter {
    ignore_names: HashSet<String>,
    show_hidden: bool,
    blacklist: Vec<Regex>,
    whitelist: Vec<Regex>,
}

impl PathFilter {
    pub fn new(show_hidden: bool) -> Self {
        Self {
            ignore_names: HashSet::new(),
            show_hidden,
            blacklist: Vec::new(),
            whitelist: Vec::new(),
        }
    }

    /// Parses `-i LIST`: a comma-separated set of names to ignore.
    pub fn with_ignore_names(mut self, list: &str) -> Self {
        self.ignore_names.extend(list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
        self
    }

    /// Adds a blacklist pattern (`-e REGEX`), case-insensitive when `-c` is set.
    pub fn with_blacklist(mut self, pattern: &str, case_insensitive: bool) -> EngineResult<Self> {
        self.blacklist.push(compile(pattern, case_insensitive)?);
        Ok(self)
    }

    /// Adds a whitelist pattern (`-w REGEX`).
    pub fn with_whitelist(mut self, pattern: &str, case_insensitive: bool) -> EngineResult<Self> {
        self.whitelist.push(compile(pattern, case_insensitive)?);
        Ok(self)
    }

    /// True when `name` should be skipped outright (spec.md §4.1 step 3):
    /// `.`/`..`, a configured ignore-name, or hidden unless `SHOW_HIDDEN`.
    pub fn skip_by_name(&self, name: &str) -> bool {
        if name == "." || name == ".." {
            return true;
        }
        if self.ignore_names.contains(name) {
            return true;
        }
        if !self.show_hidden && name.starts_with('.') {
            return true;
        }
        false
    }

    /// Applies the blacklist then the whitelist to `path` (spec.md §4.1 step
    /// 5): last match in the blacklist wins over earlier ones, likewise for
    /// the whitelist; a path passes only if not blacklisted and, when a
    /// whitelist exists, matched by it.
    pub fn allows_path(&self, path: &str) -> bool {
        if last_match(&self.blacklist, path) {
            return false;
        }
        if !self.whitelist.is_empty() && !last_match(&self.whitelist, path) {
            return false;
        }
        true
    }
}

/// Evaluates every pattern in order and returns whichever verdict the *last*
/// matching pattern gave — "last-match-wins" over a list where later entries
/// are meant to override earlier ones.
fn last_match(patterns: &[Regex], path: &str) -> bool {
    let mut matched = false;
    for re in patterns {
        if re.is_match(path) {
            matched = true;
        }
    }
    matched
}

fn compile(pattern: &str, case_insensitive: bool) -> EngineResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| EngineError::InvalidArgument(format!("bad regex {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_dot_and_dotdot_and_hidden() {
        let filter = PathFilter::new(false);
        assert!(filter.skip_by_name("."));
        assert!(filter.skip_by_name(".."));
        assert!(filter.skip_by_name(".hidden"));
        assert!(!filter.skip_by_name("visible"));
    }

    #[test]
    fn show_hidden_allows_dotfiles() {
        let filter = PathFilter::new(true);
        assert!(!filter.skip_by_name(".hidden"));
    }

    #[test]
    fn ignore_names_list_is_parsed_on_commas() {
        let filter = PathFilter::new(false).with_ignore_names("target, .git,node_modules");
        assert!(filter.skip_by_name("target"));
        assert!(filter.skip_by_name(".git"));
        assert!(filter.skip_by_name("node_modules"));
        assert!(!filter.skip_by_name("src"));
    }

    #[test]
    fn blacklist_rejects_matching_paths() {
        let filter = PathFilter::new(false).with_blacklist(r"\.tmp$", false).unwrap();
        assert!(!filter.allows_path("/a/file.tmp"));
        assert!(filter.allows_path("/a/file.rs"));
    }

    #[test]
    fn whitelist_requires_a_match_when_present() {
        let filter = PathFilter::new(false).with_whitelist(r"\.rs$", false).unwrap();
        assert!(filter.allows_path("/a/file.rs"));
        assert!(!filter.allows_path("/a/file.txt"));
    }

    #[test]
    fn any_blacklist_pattern_matching_rejects() {
        let filter = PathFilter::new(false)
            .with_blacklist(r"^$", false)
            .unwrap()
            .with_blacklist(r"\.rs$", false)
            .unwrap();
        assert!(!filter.allows_path("/a/file.rs"));
    }

    #[test]
    fn rejects_invalid_regex() {
        assert!(PathFilter::new(false).with_blacklist("(", false).is_err());
    }
}
