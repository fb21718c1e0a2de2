//! Normalization of loosely-typed source payloads
//!
//! Sources disagree on field names, date formats, genre casing, and
//! whether numbers are quoted. Everything ingested by the store passes
//! through here first. The rules are deliberately explicit policies:
//! entries without an id are dropped, timestamps fall back to "now", and
//! the default language depends on the source.

use crate::helpers::normalize_tag;
use crate::models::{MangaDetail, MangaStatus, MangaSummary, RawMangaDetail, RawMangaEntry};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashSet;

/// Dedupe genres by normalized form, keeping the first-seen original casing.
pub fn sanitize_genres(genres: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for genre in genres {
        let trimmed = genre.trim();
        if trimmed.is_empty() {
            continue;
        }
        let normalized = normalize_tag(trimmed);
        if normalized.is_empty() || !seen.insert(normalized) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

/// English for the MangaDex-style API, Indonesian for the scraped sites.
pub fn default_language_for(source: &str) -> &'static str {
    if source == "mangadex" || source == "jikan" {
        "en"
    } else {
        "id"
    }
}

pub fn determine_language(source: &str, entry: &RawMangaEntry) -> String {
    if let Some(lang) = entry.language.as_deref().filter(|l| !l.is_empty()) {
        return lang.to_lowercase();
    }
    if let Some(first) = entry
        .languages
        .as_ref()
        .and_then(|list| list.first())
        .filter(|l| !l.is_empty())
    {
        return first.to_lowercase();
    }
    default_language_for(source).to_string()
}

pub fn determine_languages(source: &str, entry: &RawMangaEntry) -> Vec<String> {
    if let Some(list) = entry.languages.as_ref().filter(|list| !list.is_empty()) {
        return list.iter().map(|l| l.to_lowercase()).collect();
    }
    vec![determine_language(source, entry)]
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Pick the first parseable timestamp from the date-like fields, in
/// priority order, falling back to `now`. The fallback is intentional:
/// an entry we just saw is at least as fresh as "now" for recency sorting.
pub fn best_effort_timestamp(entry: &RawMangaEntry, now: DateTime<Utc>) -> DateTime<Utc> {
    [
        entry.updated_at.as_deref(),
        entry.last_updated.as_deref(),
        entry.date.as_deref(),
        entry.published_at.as_deref(),
        entry.created_at.as_deref(),
        entry.saved_at.as_deref(),
        entry.uploaded_at.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find_map(parse_datetime)
    .unwrap_or(now)
}

/// A raw entry after validation, before merging. Fields the payload did
/// not provide stay `None` so the merge can preserve what an earlier
/// ingestion already populated.
#[derive(Debug, Clone)]
pub struct SanitizedEntry {
    pub id: String,
    pub title: Option<String>,
    pub alt_title: Option<String>,
    pub cover: Option<String>,
    pub cover_full: Option<String>,
    pub rating: Option<String>,
    pub latest_chapter: Option<String>,
    pub status: Option<MangaStatus>,
    pub kind: Option<String>,
    pub genres: Option<Vec<String>>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub is_new: Option<bool>,
    pub updated_at: DateTime<Utc>,
    pub language: String,
    pub languages: Vec<String>,
}

/// Returns `None` for entries without any usable id.
pub fn sanitize_entry(
    entry: &RawMangaEntry,
    source: &str,
    now: DateTime<Utc>,
) -> Option<SanitizedEntry> {
    let id = entry.id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

    Some(SanitizedEntry {
        id: id.to_string(),
        title: entry.title.clone().filter(|t| !t.trim().is_empty()),
        alt_title: entry.alt_title.clone().filter(|t| !t.trim().is_empty()),
        cover: entry
            .cover
            .clone()
            .or_else(|| entry.cover_full.clone())
            .filter(|c| !c.is_empty()),
        cover_full: entry
            .cover_full
            .clone()
            .or_else(|| entry.cover.clone())
            .filter(|c| !c.is_empty()),
        rating: entry.rating.clone().filter(|r| !r.trim().is_empty()),
        latest_chapter: entry
            .latest_chapter
            .clone()
            .filter(|c| !c.trim().is_empty()),
        status: entry.status.as_deref().map(MangaStatus::parse),
        kind: entry.kind.clone().filter(|k| !k.trim().is_empty()),
        genres: entry.genres.as_deref().map(sanitize_genres),
        url: entry.url.clone().filter(|u| !u.is_empty()),
        description: entry.description.clone().filter(|d| !d.is_empty()),
        is_new: entry.is_new,
        updated_at: best_effort_timestamp(entry, now),
        language: determine_language(source, entry),
        languages: determine_languages(source, entry),
    })
}

/// Merge a sanitized entry over what is already stored for `(source, id)`.
/// Fields present in the new payload win; fields it omitted keep their
/// previous values; a brand-new record gets explicit defaults.
pub fn merge_entry(
    previous: Option<MangaSummary>,
    entry: SanitizedEntry,
    source: &str,
    now: DateTime<Utc>,
) -> MangaSummary {
    match previous {
        Some(mut existing) => {
            if let Some(title) = entry.title {
                existing.title = title;
            }
            if entry.alt_title.is_some() {
                existing.alt_title = entry.alt_title;
            }
            if let Some(cover) = entry.cover {
                existing.cover = cover;
            }
            if entry.cover_full.is_some() {
                existing.cover_full = entry.cover_full;
            }
            if let Some(rating) = entry.rating {
                existing.rating = rating;
            }
            if entry.latest_chapter.is_some() {
                existing.latest_chapter = entry.latest_chapter;
            }
            if let Some(status) = entry.status {
                existing.status = status;
            }
            if let Some(kind) = entry.kind {
                existing.kind = kind;
            }
            if let Some(genres) = entry.genres {
                if !genres.is_empty() {
                    existing.genres = genres;
                }
            }
            if let Some(url) = entry.url {
                existing.url = url;
            }
            if let Some(description) = entry.description {
                existing.description = description;
            }
            if let Some(is_new) = entry.is_new {
                existing.is_new = is_new;
            }
            existing.updated_at = entry.updated_at.to_rfc3339();
            existing.last_fetched = now.to_rfc3339();
            existing.language = entry.language;
            existing.languages = entry.languages;
            existing
        }
        None => MangaSummary {
            id: entry.id,
            source: source.to_string(),
            title: entry.title.unwrap_or_else(|| "Unknown".to_string()),
            alt_title: entry.alt_title,
            cover: entry.cover.unwrap_or_default(),
            cover_full: entry.cover_full,
            rating: entry.rating.unwrap_or_else(|| "8.0".to_string()),
            latest_chapter: entry.latest_chapter,
            status: entry.status.unwrap_or_default(),
            kind: entry.kind.unwrap_or_else(|| "Manga".to_string()),
            genres: entry.genres.unwrap_or_default(),
            url: entry.url.unwrap_or_default(),
            description: entry.description.unwrap_or_default(),
            is_new: entry.is_new.unwrap_or(false),
            updated_at: entry.updated_at.to_rfc3339(),
            last_fetched: now.to_rfc3339(),
            language: entry.language,
            languages: entry.languages,
        },
    }
}

/// Build listing summaries straight from raw entries, outside the store's
/// merge path (used for search results that are served but not persisted).
pub fn summaries_from_raw(source: &str, entries: &[RawMangaEntry]) -> Vec<MangaSummary> {
    let now = Utc::now();
    entries
        .iter()
        .filter_map(|raw| sanitize_entry(raw, source, now))
        .map(|entry| merge_entry(None, entry, source, now))
        .collect()
}

/// Validate a detail payload and stamp it. Unknown fields ride along in
/// `extra` untouched.
pub fn sanitize_detail(
    detail: &RawMangaDetail,
    source: &str,
    now: DateTime<Utc>,
) -> Option<MangaDetail> {
    let entry = sanitize_entry(&detail.entry, source, now)?;
    Some(MangaDetail {
        id: entry.id,
        source: source.to_string(),
        title: entry.title.unwrap_or_else(|| "Unknown".to_string()),
        alt_title: entry.alt_title,
        cover: entry.cover.unwrap_or_default(),
        cover_full: entry.cover_full,
        rating: entry.rating.unwrap_or_else(|| "8.0".to_string()),
        status: entry.status.unwrap_or_default(),
        kind: entry.kind.unwrap_or_else(|| "Manga".to_string()),
        genres: entry.genres.unwrap_or_default(),
        author: detail.author.clone(),
        artist: detail.artist.clone(),
        url: entry.url.unwrap_or_default(),
        description: entry.description.unwrap_or_default(),
        chapters_count: detail.chapters_count,
        language: entry.language,
        languages: entry.languages,
        saved_at: now.to_rfc3339(),
        extra: detail.extra.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_without_id_are_dropped() {
        let raw = RawMangaEntry {
            title: Some("No Id".to_string()),
            ..Default::default()
        };
        assert!(sanitize_entry(&raw, "komiku", Utc::now()).is_none());
    }

    #[test]
    fn genres_dedupe_by_normalized_form() {
        let genres = vec![
            "Action".to_string(),
            "action".to_string(),
            " Slice of Life ".to_string(),
            "slice-of-life".to_string(),
            "".to_string(),
        ];
        let sanitized = sanitize_genres(&genres);
        assert_eq!(sanitized, vec!["Action", "Slice of Life"]);
    }

    #[test]
    fn timestamp_priority_order() {
        let now = Utc::now();
        let raw = RawMangaEntry {
            id: Some("x".to_string()),
            updated_at: Some("not a date".to_string()),
            last_updated: Some("2024-03-01T12:00:00Z".to_string()),
            date: Some("2020-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let ts = best_effort_timestamp(&raw, now);
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn timestamp_falls_back_to_now() {
        let now = Utc::now();
        let raw = RawMangaEntry {
            id: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(best_effort_timestamp(&raw, now), now);
    }

    #[test]
    fn language_defaults_depend_on_source() {
        let raw = RawMangaEntry::default();
        assert_eq!(determine_language("mangadex", &raw), "en");
        assert_eq!(determine_language("komiku", &raw), "id");

        let raw = RawMangaEntry {
            language: Some("EN".to_string()),
            ..Default::default()
        };
        assert_eq!(determine_language("komiku", &raw), "en");
    }

    #[test]
    fn merge_preserves_fields_absent_in_new_payload() {
        let now = Utc::now();
        let first = sanitize_entry(
            &RawMangaEntry {
                id: Some("1".to_string()),
                title: Some("A".to_string()),
                ..Default::default()
            },
            "komiku",
            now,
        )
        .unwrap();
        let stored = merge_entry(None, first, "komiku", now);
        assert_eq!(stored.title, "A");

        let second = sanitize_entry(
            &RawMangaEntry {
                id: Some("1".to_string()),
                rating: Some("9.0".to_string()),
                ..Default::default()
            },
            "komiku",
            now,
        )
        .unwrap();
        let merged = merge_entry(Some(stored), second, "komiku", now);
        assert_eq!(merged.title, "A");
        assert_eq!(merged.rating, "9.0");
    }

    #[test]
    fn new_records_get_defaults() {
        let now = Utc::now();
        let entry = sanitize_entry(
            &RawMangaEntry {
                id: Some("1".to_string()),
                ..Default::default()
            },
            "komiku",
            now,
        )
        .unwrap();
        let stored = merge_entry(None, entry, "komiku", now);
        assert_eq!(stored.title, "Unknown");
        assert_eq!(stored.rating, "8.0");
        assert_eq!(stored.kind, "Manga");
        assert_eq!(stored.status, MangaStatus::Unknown);
        assert_eq!(stored.language, "id");
        assert_eq!(stored.languages, vec!["id"]);
    }

    #[test]
    fn detail_requires_id_and_keeps_extras() {
        let now = Utc::now();
        let mut extra = serde_json::Map::new();
        extra.insert("serialization".to_string(), "Weekly".into());
        let detail = RawMangaDetail {
            entry: RawMangaEntry {
                id: Some("abc".to_string()),
                title: Some("T".to_string()),
                ..Default::default()
            },
            author: Some("Author".to_string()),
            artist: None,
            chapters_count: Some(12),
            extra,
        };
        let sanitized = sanitize_detail(&detail, "mangadex", now).unwrap();
        assert_eq!(sanitized.id, "abc");
        assert_eq!(sanitized.source, "mangadex");
        assert_eq!(sanitized.author.as_deref(), Some("Author"));
        assert_eq!(sanitized.chapters_count, Some(12));
        assert!(sanitized.extra.contains_key("serialization"));
        assert!(!sanitized.saved_at.is_empty());

        let missing_id = RawMangaDetail::default();
        assert!(sanitize_detail(&missing_id, "mangadex", now).is_none());
    }
}
