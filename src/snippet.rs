//! Code snippets.
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Record, SNIPPETS_KEY};

/// A stored piece of code with its language and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub code: String,
    /// Language tag used for highlighting, e.g. `rust` or `javascript`
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SnippetDraft {
    pub title: String,
    pub code: String,
    pub language: String,
    pub description: String,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SnippetPatch {
    pub title: Option<String>,
    pub code: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    /// Replaces the whole tag set
    pub tags: Option<BTreeSet<String>>,
}

impl Record for Snippet {
    type Draft = SnippetDraft;
    type Patch = SnippetPatch;

    const STORAGE_KEY: &'static str = SNIPPETS_KEY;

    fn from_draft(id: String, now: DateTime<Utc>, draft: SnippetDraft) -> Self {
        Snippet {
            id,
            title: draft.title,
            code: draft.code,
            language: draft.language,
            description: draft.description,
            tags: draft.tags,
            created_at: now,
            updated_at: now,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn apply_patch(&mut self, patch: SnippetPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(code) = patch.code {
            self.code = code;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn search_text(&self) -> String {
        format!("{}\n{}", self.description, self.code)
    }

    fn tags(&self) -> Vec<&str> {
        self.tags.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_tags_collapse() {
        let json = r#"{
            "id": "1",
            "title": "t",
            "code": "fn main() {}",
            "language": "rust",
            "tags": ["cli", "rust", "cli"],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }"#;
        let snippet: Snippet = serde_json::from_str(json).unwrap();
        assert_eq!(snippet.tags.len(), 2);
        assert_eq!(snippet.description, "");
    }
}
