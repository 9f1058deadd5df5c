// src/analyze/matcher.rs
//! Keyword-group classification.
//!
//! All comparisons are case-insensitive substring checks. Global filter words
//! beat every group; among groups the first one (in configured order) that is
//! satisfied wins.

use serde::Serialize;

/// Label used for the catch-all group when no groups are configured.
pub const CATCH_ALL_GROUP_KEY: &str = "All news";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordGroup {
    pub required: Vec<String>,
    pub normal: Vec<String>,
    pub group_key: String,
    #[serde(skip)]
    required_lc: Vec<String>,
    #[serde(skip)]
    normal_lc: Vec<String>,
}

impl KeywordGroup {
    /// `None` when both term lists are empty; such groups are dropped at load time.
    pub fn new(required: Vec<String>, normal: Vec<String>) -> Option<Self> {
        if required.is_empty() && normal.is_empty() {
            return None;
        }
        let group_key = if normal.is_empty() {
            required.join(" ")
        } else {
            normal.join(" ")
        };
        Some(Self::build(required, normal, group_key))
    }

    /// Matches every title.
    pub fn catch_all() -> Self {
        Self::build(Vec::new(), Vec::new(), CATCH_ALL_GROUP_KEY.to_string())
    }

    fn build(required: Vec<String>, normal: Vec<String>, group_key: String) -> Self {
        let required_lc = required.iter().map(|w| w.to_lowercase()).collect();
        let normal_lc = normal.iter().map(|w| w.to_lowercase()).collect();
        Self {
            required,
            normal,
            group_key,
            required_lc,
            normal_lc,
        }
    }

    /// `title_lc` must already be lower-cased.
    fn is_satisfied_by(&self, title_lc: &str) -> bool {
        if !self.required_lc.is_empty()
            && !self.required_lc.iter().all(|w| title_lc.contains(w.as_str()))
        {
            return false;
        }
        if !self.normal_lc.is_empty()
            && !self.normal_lc.iter().any(|w| title_lc.contains(w.as_str()))
        {
            return false;
        }
        true
    }
}

/// Compiled groups plus the global filter list. Immutable after load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordGroups {
    groups: Vec<KeywordGroup>,
    filter_words: Vec<String>,
    filter_words_lc: Vec<String>,
}

impl KeywordGroups {
    pub fn new(groups: Vec<KeywordGroup>, filter_words: Vec<String>) -> Self {
        let filter_words_lc = filter_words.iter().map(|w| w.to_lowercase()).collect();
        Self {
            groups,
            filter_words,
            filter_words_lc,
        }
    }

    /// The substitution callers make for an empty group list. Filter words stay active.
    pub fn with_catch_all_if_empty(self) -> Self {
        if !self.groups.is_empty() {
            return self;
        }
        tracing::warn!("no keyword groups configured, every title will be reported");
        Self::new(vec![KeywordGroup::catch_all()], self.filter_words)
    }

    pub fn groups(&self) -> &[KeywordGroup] {
        &self.groups
    }

    pub fn filter_words(&self) -> &[String] {
        &self.filter_words
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// True when any filter word occurs in the title.
    pub fn is_filtered(&self, title: &str) -> bool {
        let title_lc = title.to_lowercase();
        self.is_filtered_lc(&title_lc)
    }

    fn is_filtered_lc(&self, title_lc: &str) -> bool {
        self.filter_words_lc
            .iter()
            .any(|w| title_lc.contains(w.as_str()))
    }

    /// Index of the first satisfied group. Does not apply the filter.
    pub fn classify_index(&self, title: &str) -> Option<usize> {
        let title_lc = title.to_lowercase();
        self.groups
            .iter()
            .position(|g| g.is_satisfied_by(&title_lc))
    }

    /// Group key of the first satisfied group. Does not apply the filter.
    pub fn classify(&self, title: &str) -> Option<&str> {
        self.classify_index(title)
            .map(|i| self.groups[i].group_key.as_str())
    }

    /// Filter first, then the first satisfied group. Blank titles never match.
    pub fn match_title(&self, title: &str) -> Option<usize> {
        if title.trim().is_empty() {
            return None;
        }
        let title_lc = title.to_lowercase();
        if self.is_filtered_lc(&title_lc) {
            return None;
        }
        self.groups
            .iter()
            .position(|g| g.is_satisfied_by(&title_lc))
    }

    pub fn matches(&self, title: &str) -> bool {
        self.match_title(title).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|w| w.to_string()).collect()
    }

    fn group(required: &[&str], normal: &[&str]) -> KeywordGroup {
        KeywordGroup::new(words(required), words(normal)).unwrap()
    }

    #[test]
    fn group_key_prefers_normal_terms() {
        assert_eq!(group(&["a", "b"], &["x", "y"]).group_key, "x y");
        assert_eq!(group(&["a", "b"], &[]).group_key, "a b");
        assert!(KeywordGroup::new(vec![], vec![]).is_none());
    }

    #[test]
    fn required_terms_all_needed() {
        let ok = KeywordGroups::new(vec![group(&["foo", "baz"], &[])], vec![]);
        assert!(ok.matches("Foo Bar Baz"));
        let missing = KeywordGroups::new(vec![group(&["foo", "qux"], &[])], vec![]);
        assert!(!missing.matches("Foo Bar Baz"));
    }

    #[test]
    fn normal_terms_any_needed() {
        let g = KeywordGroups::new(vec![group(&[], &["foo", "qux"])], vec![]);
        assert!(g.matches("contains foo"));
        assert!(!g.matches("neither"));
    }

    #[test]
    fn required_and_normal_combine() {
        let g = KeywordGroups::new(vec![group(&["apple"], &["phone", "watch"])], vec![]);
        assert!(g.matches("Apple unveils new Watch"));
        assert!(!g.matches("Apple earnings"));
        assert!(!g.matches("Phone sales"));
    }

    #[test]
    fn filter_beats_groups() {
        let g = KeywordGroups::new(vec![group(&[], &["tesla"])], words(&["Rumor"]));
        assert!(g.matches("Tesla recalls cars"));
        assert!(!g.matches("Tesla RUMOR mill"));
        assert_eq!(g.classify("Tesla RUMOR mill"), Some("tesla"));
        assert!(g.is_filtered("rumor"));
    }

    #[test]
    fn first_matching_group_wins() {
        let g = KeywordGroups::new(
            vec![group(&[], &["ai"]), group(&[], &["chip", "ai"])],
            vec![],
        );
        assert_eq!(g.match_title("AI chip shortage"), Some(0));
        assert_eq!(g.match_title("chip shortage"), Some(1));
        assert_eq!(g.match_title("nothing"), None);
    }

    #[test]
    fn catch_all_matches_everything_but_filtered() {
        let g = KeywordGroups::new(vec![], words(&["ad"])).with_catch_all_if_empty();
        assert_eq!(g.groups().len(), 1);
        assert_eq!(g.groups()[0].group_key, CATCH_ALL_GROUP_KEY);
        assert!(g.matches("anything at all"));
        assert!(!g.matches("sponsored ad"));
        assert!(!g.matches("   "));
    }

    #[test]
    fn unicode_titles_match() {
        let g = KeywordGroups::new(vec![group(&[], &["华为"])], vec![]);
        assert!(g.matches("华为发布新手机"));
    }
}
