use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Publication status, normalized from the free-form strings sources emit.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum MangaStatus {
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
    #[default]
    Unknown,
}

impl MangaStatus {
    pub fn parse(value: &str) -> Self {
        let v = value.to_lowercase();
        if v.contains("ongoing") || v.contains("publishing") || v.contains("releasing") {
            MangaStatus::Ongoing
        } else if v.contains("complete") || v.contains("finished") {
            MangaStatus::Completed
        } else if v.contains("hiatus") {
            MangaStatus::Hiatus
        } else if v.contains("cancel") || v.contains("dropped") || v.contains("discontinued") {
            MangaStatus::Cancelled
        } else {
            MangaStatus::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MangaStatus::Ongoing => "Ongoing",
            MangaStatus::Completed => "Completed",
            MangaStatus::Hiatus => "Hiatus",
            MangaStatus::Cancelled => "Cancelled",
            MangaStatus::Unknown => "Unknown",
        }
    }
}

/// Normalized listing record. `(source, id)` is the dedup key; re-ingesting
/// the same pair merges into the existing record.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MangaSummary {
    pub id: String,
    pub source: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_title: Option<String>,
    pub cover: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_full: Option<String>,
    pub rating: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_chapter: Option<String>,
    pub status: MangaStatus,
    #[serde(rename = "type")]
    pub kind: String,
    pub genres: Vec<String>,
    pub url: String,
    pub description: String,
    pub is_new: bool,
    /// Best-effort timestamp derived from the source payload (RFC 3339).
    pub updated_at: String,
    /// Set at ingestion time (RFC 3339).
    pub last_fetched: String,
    pub language: String,
    pub languages: Vec<String>,
}

/// Full per-manga record, kept independently of summaries and never expired
/// by staleness. Unknown source fields survive round-trips via `extra`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MangaDetail {
    pub id: String,
    pub source: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_title: Option<String>,
    #[serde(default)]
    pub cover: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_full: Option<String>,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub status: MangaStatus,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters_count: Option<u32>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Write timestamp (RFC 3339).
    pub saved_at: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Loosely-typed record as produced by source adapters or deserialized from
/// heterogeneous payloads. Field aliases absorb the naming differences
/// between sources; the metadata store's sanitizer turns this into a
/// `MangaSummary`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawMangaEntry {
    #[serde(default, alias = "slug", alias = "slugId", alias = "mangaId")]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "name")]
    pub title: Option<String>,
    #[serde(default)]
    pub alt_title: Option<String>,
    #[serde(default, alias = "image")]
    pub cover: Option<String>,
    #[serde(default)]
    pub cover_full: Option<String>,
    #[serde(default, alias = "score", deserialize_with = "string_or_number")]
    pub rating: Option<String>,
    #[serde(
        default,
        alias = "lastChapter",
        alias = "chapter",
        deserialize_with = "string_or_number"
    )]
    pub latest_chapter: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "type", default, alias = "format")]
    pub kind: Option<String>,
    #[serde(default, alias = "tags")]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_new: Option<bool>,
    #[serde(default, alias = "lang")]
    pub language: Option<String>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    // Date-like fields, consulted in priority order by the sanitizer.
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub saved_at: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

/// Loosely-typed detail payload from an adapter. Known listing fields live
/// in `entry`; anything else is preserved in `extra`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawMangaDetail {
    #[serde(flatten)]
    pub entry: RawMangaEntry,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub chapters_count: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawChapter {
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChapterPage {
    pub page: u32,
    pub url: String,
}

/// Result of a metadata-store list query. `has_data: false` means "no data
/// yet, a refresh has been triggered" and is not an error.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MangaListPage {
    pub items: Vec<MangaSummary>,
    pub total_items: usize,
    pub total_pages: usize,
    pub cache_type: String,
    pub has_data: bool,
}

impl MangaListPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_items: 0,
            total_pages: 1,
            cache_type: "metadata".to_string(),
            has_data: false,
        }
    }
}

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Query parameters accepted by the list surface.
#[derive(Debug, Deserialize, Clone)]
pub struct ListQuery {
    #[serde(default = "default_all")]
    pub source: String,
    #[serde(default = "default_all")]
    pub genre: String,
    #[serde(default = "default_all")]
    pub status: String,
    #[serde(rename = "type", default = "default_all")]
    pub kind: String,
    #[serde(default = "default_all")]
    pub language: String,
    #[serde(default = "default_sort")]
    pub sort: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_all() -> String {
    "all".to_string()
}

fn default_sort() -> String {
    "latest".to_string()
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            source: default_all(),
            genre: default_all(),
            status: default_all(),
            kind: default_all(),
            language: default_all(),
            sort: default_sort(),
            page: default_page(),
            limit: default_limit(),
        }
    }
}

/// Accepts JSON strings or numbers and normalizes both to `String`.
/// Sources disagree on whether ratings and chapter numbers are quoted.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_source_variants() {
        assert_eq!(MangaStatus::parse("Ongoing"), MangaStatus::Ongoing);
        assert_eq!(MangaStatus::parse("Publishing"), MangaStatus::Ongoing);
        assert_eq!(MangaStatus::parse("Completed"), MangaStatus::Completed);
        assert_eq!(MangaStatus::parse("On Hiatus"), MangaStatus::Hiatus);
        assert_eq!(MangaStatus::parse("cancelled"), MangaStatus::Cancelled);
        assert_eq!(MangaStatus::parse("???"), MangaStatus::Unknown);
    }

    #[test]
    fn raw_entry_tolerates_field_aliases() {
        let entry: RawMangaEntry = serde_json::from_str(
            r#"{"slug":"solo-leveling","name":"Solo Leveling","image":"c.jpg","score":9.1,"chapter":110}"#,
        )
        .unwrap();
        assert_eq!(entry.id.as_deref(), Some("solo-leveling"));
        assert_eq!(entry.title.as_deref(), Some("Solo Leveling"));
        assert_eq!(entry.cover.as_deref(), Some("c.jpg"));
        assert_eq!(entry.rating.as_deref(), Some("9.1"));
        assert_eq!(entry.latest_chapter.as_deref(), Some("110"));
    }

    #[test]
    fn detail_preserves_unknown_fields() {
        let raw: RawMangaDetail = serde_json::from_str(
            r#"{"id":"x","title":"X","author":"A","serialization":"Weekly"}"#,
        )
        .unwrap();
        assert_eq!(raw.entry.id.as_deref(), Some("x"));
        assert_eq!(raw.author.as_deref(), Some("A"));
        assert_eq!(
            raw.extra.get("serialization").and_then(|v| v.as_str()),
            Some("Weekly")
        );
    }
}
