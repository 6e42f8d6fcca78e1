//! Catalog data model.
//!
//! A [`Template`] is one catalog entry. Search results are returned as
//! [`RankedResult`]s, which wrap a template with the provenance of the match
//! ([`MatchType`]) and, for semantic matches, a 0–100 similarity score.
//! Ranked results are built per query and never persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::SearchError;

/// Classification of a template. Not used in ranking, only for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    /// A complete project starter.
    #[default]
    Starter,
    /// A minimal viable example.
    Mve,
    /// An add-on applied on top of an existing project.
    Addon,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::Starter => "starter",
            TemplateType::Mve => "mve",
            TemplateType::Addon => "addon",
        }
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(TemplateType::Starter),
            "mve" => Ok(TemplateType::Mve),
            "addon" => Ok(TemplateType::Addon),
            other => Err(SearchError::Validation(format!(
                "unknown template type '{}': expected starter, mve, or addon",
                other
            ))),
        }
    }
}

/// A stored catalog entry.
///
/// `embedding` is `None` when embedding generation failed at write time;
/// such templates are invisible to vector retrieval but still eligible for
/// keyword retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub best_use_case: String,
    #[serde(rename = "type")]
    pub template_type: TemplateType,
    pub library_tags: Vec<String>,
    pub architecture_tags: Vec<String>,
    pub github_url: String,
    pub notes: Option<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(serialize_with = "serialize_ts")]
    pub created_at: i64,
    #[serde(serialize_with = "serialize_ts")]
    pub updated_at: i64,
}

impl Template {
    /// Text submitted to the embedding provider for this template.
    pub fn embedding_text(&self) -> String {
        embedding_text(
            &self.best_use_case,
            &self.title,
            &self.description,
            &self.library_tags,
            &self.architecture_tags,
        )
    }

    /// Whether `needle` (already passed through [`str::to_lowercase`])
    /// occurs in any searchable text field. Case folding is Unicode-aware,
    /// so `"école"` matches `"ÉCOLE"`. Tag lists are matched as
    /// space-joined text.
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        [
            self.title.as_str(),
            self.description.as_str(),
            self.best_use_case.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
            || tags_text(&self.library_tags).to_lowercase().contains(needle)
            || tags_text(&self.architecture_tags)
                .to_lowercase()
                .contains(needle)
    }
}

/// Write-path input for a new template.
///
/// Deserializes from the same camelCase JSON shape the HTTP API returns,
/// which makes exported listings re-importable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub title: String,
    pub description: String,
    pub best_use_case: String,
    #[serde(rename = "type", default)]
    pub template_type: TemplateType,
    #[serde(default)]
    pub library_tags: Vec<String>,
    #[serde(default)]
    pub architecture_tags: Vec<String>,
    pub github_url: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewTemplate {
    /// Reject templates missing any required text field.
    pub fn validate(&self) -> Result<(), SearchError> {
        let required = [
            ("title", &self.title),
            ("description", &self.description),
            ("bestUseCase", &self.best_use_case),
            ("githubUrl", &self.github_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(SearchError::Validation(format!(
                    "{} must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn embedding_text(&self) -> String {
        embedding_text(
            &self.best_use_case,
            &self.title,
            &self.description,
            &self.library_tags,
            &self.architecture_tags,
        )
    }
}

fn embedding_text(
    best_use_case: &str,
    title: &str,
    description: &str,
    library_tags: &[String],
    architecture_tags: &[String],
) -> String {
    [best_use_case, title, description]
        .into_iter()
        .chain(library_tags.iter().map(String::as_str))
        .chain(architecture_tags.iter().map(String::as_str))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a tag list the way keyword retrieval matches it.
pub fn tags_text(tags: &[String]) -> String {
    tags.join(" ")
}

/// Which retrieval path(s) produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Vector,
    Fulltext,
    Both,
}

impl MatchType {
    /// Sort rank: lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            MatchType::Both => 0,
            MatchType::Vector => 1,
            MatchType::Fulltext => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Vector => "vector",
            MatchType::Fulltext => "fulltext",
            MatchType::Both => "both",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A template annotated with how it matched a query.
///
/// Serializes as the template's fields plus `similarity` and `matchType`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    #[serde(flatten)]
    pub template: Template,
    /// Similarity percentage in `[0, 100]`; `0.0` for keyword-only matches.
    pub similarity: f64,
    pub match_type: MatchType,
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn serialize_ts<S: Serializer>(ts: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_ts_iso(*ts))
}
