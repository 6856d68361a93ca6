use unicode_normalization::UnicodeNormalization;

use crate::config::FilterConfig;

/// Substring word filter applied to ordinary (non-command) group messages
#[derive(Debug, Clone)]
pub struct WordFilter {
    active: bool,
    bypass_admins: bool,
    words: Vec<String>,
}

impl WordFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        let words = config
            .words
            .iter()
            .map(|w| normalize(w.trim()))
            .filter(|w| !w.is_empty())
            .collect();

        Self {
            active: config.active,
            bypass_admins: config.bypass_admins,
            words,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active && !self.words.is_empty()
    }

    pub fn bypass_admins(&self) -> bool {
        self.bypass_admins
    }

    pub fn matches(&self, text: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let text = normalize(text);
        self.words.iter().any(|w| text.contains(w.as_str()))
    }
}

fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}
