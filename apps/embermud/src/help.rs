//! The help catalog.
//!
//! Markdown documents in the docs directory, each opening with a
//! `---`-delimited YAML block carrying `title` and `keywords`. Topics are
//! found by exact case-insensitive title first, then through the keyword
//! index.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FrontMatter {
    title: String,
    #[serde(default)]
    keywords: Keywords,
}

/// Keywords appear both as YAML lists and as comma-separated strings.
#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
enum Keywords {
    #[default]
    None,
    List(Vec<String>),
    Csv(String),
}

impl Keywords {
    fn into_vec(self) -> Vec<String> {
        match self {
            Keywords::None => Vec::new(),
            Keywords::List(v) => v,
            Keywords::Csv(s) => s
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HelpTopic {
    pub title: String,
    pub keywords: Vec<String>,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct HelpSystem {
    topics: HashMap<String, HelpTopic>,
    keyword_index: HashMap<String, Vec<String>>,
}

impl HelpSystem {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every `.md` file in the docs directory. Files that fail to
    /// parse are skipped with a warning; a missing directory just yields an
    /// empty catalog.
    pub fn load_dir(dir: impl AsRef<Path>) -> Self {
        let mut hs = Self::default();
        let entries = match std::fs::read_dir(dir.as_ref()) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.as_ref().display(), err = %e, "no help directory");
                return hs;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    if let Err(e) = hs.add_document(&text) {
                        tracing::warn!(file = %path.display(), err = %e, "bad help file; skipped");
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), err = %e, "unreadable help file");
                }
            }
        }

        tracing::info!(topics = hs.topics.len(), "help catalog loaded");
        hs
    }

    pub fn add_document(&mut self, text: &str) -> anyhow::Result<()> {
        let (front, content) = split_front_matter(text)
            .ok_or_else(|| anyhow::anyhow!("missing front matter block"))?;
        let fm: FrontMatter = serde_yaml::from_str(front)?;

        let topic = HelpTopic {
            title: fm.title.clone(),
            keywords: fm.keywords.into_vec(),
            content: content.trim().to_string(),
        };
        for kw in &topic.keywords {
            self.keyword_index
                .entry(kw.to_ascii_lowercase())
                .or_default()
                .push(fm.title.clone());
        }
        self.topics.insert(fm.title.to_ascii_lowercase(), topic);
        Ok(())
    }

    pub fn lookup(&self, query: &str) -> Option<&HelpTopic> {
        let q = query.trim().to_ascii_lowercase();
        if let Some(topic) = self.topics.get(&q) {
            return Some(topic);
        }
        let titles = self.keyword_index.get(&q)?;
        titles.first().and_then(|t| self.topics.get(&t.to_ascii_lowercase()))
    }

    pub fn titles(&self) -> Vec<&str> {
        let mut ts: Vec<&str> = self.topics.values().map(|t| t.title.as_str()).collect();
        ts.sort_unstable();
        ts
    }

    /// Render a topic (or the topic list) for the player.
    pub fn render(&self, query: Option<&str>) -> String {
        let query = query.unwrap_or("index");
        match self.lookup(query) {
            Some(topic) => format!("{{Y}}{}{{x}}\r\n{}", topic.title, topic.content),
            None => {
                let mut out = format!("No help found for '{query}'.\r\n");
                if !self.topics.is_empty() {
                    out.push_str("Available topics: ");
                    out.push_str(&self.titles().join(", "));
                }
                out
            }
        }
    }
}

/// Split `---\nyaml\n---\nbody` into the YAML block and the body.
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let front = &rest[..end];
    let body = rest[end + 4..].trim_start_matches(['\r', '\n']);
    Some((front, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMBAT_DOC: &str = "---\ntitle: Combat\nkeywords: attack, kill, flee\n---\nType 'attack <target>' to start a fight.";
    const MOVE_DOC: &str = "---\ntitle: Movement\nkeywords: [north, south]\n---\nWalk with the six directions.";

    fn catalog() -> HelpSystem {
        let mut hs = HelpSystem::empty();
        hs.add_document(COMBAT_DOC).unwrap();
        hs.add_document(MOVE_DOC).unwrap();
        hs
    }

    #[test]
    fn lookup_by_title_is_case_insensitive() {
        let hs = catalog();
        assert_eq!(hs.lookup("combat").unwrap().title, "Combat");
        assert_eq!(hs.lookup("COMBAT").unwrap().title, "Combat");
    }

    #[test]
    fn lookup_by_keyword_in_both_formats() {
        let hs = catalog();
        assert_eq!(hs.lookup("flee").unwrap().title, "Combat");
        assert_eq!(hs.lookup("north").unwrap().title, "Movement");
    }

    #[test]
    fn unknown_topic_lists_titles() {
        let hs = catalog();
        let out = hs.render(Some("dragons"));
        assert!(out.contains("No help found"));
        assert!(out.contains("Combat"));
        assert!(out.contains("Movement"));
    }

    #[test]
    fn missing_front_matter_is_an_error() {
        let mut hs = HelpSystem::empty();
        assert!(hs.add_document("just prose").is_err());
    }
}
