//! Pure filter/sort/pagination helpers for manga listings
//!
//! These operate on already-normalized `MangaSummary` records and are
//! deliberately tolerant of sparse data: unparseable ratings sort as 0,
//! missing chapter numbers sort last, and empty lists still paginate to
//! one page so the UI never divides by zero.

use crate::models::MangaSummary;
use chrono::DateTime;
use regex::Regex;
use std::sync::OnceLock;

/// Lowercase a tag and collapse non-alphanumeric runs to `-` so that
/// "Slice of Life" and "slice-of-life" compare equal.
pub fn normalize_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Filter values; `"all"` or empty disables the corresponding filter.
#[derive(Debug, Clone)]
pub struct MangaFilters {
    pub genre: String,
    pub status: String,
    pub kind: String,
    pub language: String,
}

impl Default for MangaFilters {
    fn default() -> Self {
        Self {
            genre: "all".to_string(),
            status: "all".to_string(),
            kind: "all".to_string(),
            language: "all".to_string(),
        }
    }
}

fn filter_active(normalized: &str) -> bool {
    !normalized.is_empty() && normalized != "all"
}

/// Genre/status/type filters use substring containment on normalized tags
/// to tolerate compound values such as "manga-ongoing". Language matches
/// against both the `languages` list and the singular `language` field.
pub fn apply_manga_filters(list: Vec<MangaSummary>, filters: &MangaFilters) -> Vec<MangaSummary> {
    let genre = normalize_tag(&filters.genre);
    let status = normalize_tag(&filters.status);
    let kind = normalize_tag(&filters.kind);
    let language = normalize_tag(&filters.language);

    list.into_iter()
        .filter(|item| {
            if filter_active(&genre) {
                // Items with no genre data pass through rather than vanish.
                let tags: Vec<String> = item.genres.iter().map(|g| normalize_tag(g)).collect();
                if !tags.is_empty() && !tags.iter().any(|t| t.contains(&genre)) {
                    return false;
                }
            }

            if filter_active(&status) && !normalize_tag(item.status.as_str()).contains(&status) {
                return false;
            }

            if filter_active(&kind) && !normalize_tag(&item.kind).contains(&kind) {
                return false;
            }

            if filter_active(&language) {
                let in_list = item.languages.iter().any(|l| normalize_tag(l) == language);
                let primary = normalize_tag(&item.language) == language;
                if !in_list && !primary {
                    return false;
                }
            }

            true
        })
        .collect()
}

/// Ratings arrive as strings like "8.7" or junk like "N/A"; junk sorts as 0.
pub fn safe_rating(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(0.0)
}

/// Extract the leading numeric part of a chapter label ("Ch. 110.5" -> 110.5).
pub fn extract_chapter_number(value: &str) -> f64 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+\.?\d*)").expect("chapter number regex"));
    re.captures(value)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse an RFC 3339 timestamp to epoch milliseconds, 0 when absent/invalid.
fn timestamp_ms(value: &str) -> i64 {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

/// `title` sorts lexicographically, `popular`/`rating` by numeric rating
/// descending, anything else (the `latest` default) by extracted chapter
/// number descending with recency as the tie-breaker.
pub fn apply_manga_sort(mut list: Vec<MangaSummary>, sort_key: &str) -> Vec<MangaSummary> {
    match sort_key {
        "title" => {
            list.sort_by(|a, b| a.title.cmp(&b.title));
        }
        "popular" | "rating" => {
            list.sort_by(|a, b| {
                safe_rating(&b.rating)
                    .partial_cmp(&safe_rating(&a.rating))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        _ => {
            list.sort_by(|a, b| {
                let a_ch = extract_chapter_number(a.latest_chapter.as_deref().unwrap_or(""));
                let b_ch = extract_chapter_number(b.latest_chapter.as_deref().unwrap_or(""));
                b_ch.partial_cmp(&a_ch)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| timestamp_ms(&b.updated_at).cmp(&timestamp_ms(&a.updated_at)))
            });
        }
    }
    list
}

/// Page count for a list; an empty list still spans one page.
pub fn calculate_total_pages(len: usize, page_size: usize) -> usize {
    if len == 0 || page_size == 0 {
        return 1;
    }
    len.div_ceil(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MangaStatus;

    fn summary(id: &str) -> MangaSummary {
        MangaSummary {
            id: id.to_string(),
            source: "test".to_string(),
            title: id.to_string(),
            alt_title: None,
            cover: String::new(),
            cover_full: None,
            rating: "8.0".to_string(),
            latest_chapter: None,
            status: MangaStatus::Unknown,
            kind: "Manga".to_string(),
            genres: Vec::new(),
            url: String::new(),
            description: String::new(),
            is_new: false,
            updated_at: "1970-01-01T00:00:00Z".to_string(),
            last_fetched: "1970-01-01T00:00:00Z".to_string(),
            language: "en".to_string(),
            languages: vec!["en".to_string()],
        }
    }

    #[test]
    fn normalize_tag_collapses_separators() {
        assert_eq!(normalize_tag("Slice of Life"), "slice-of-life");
        assert_eq!(normalize_tag("  Sci-Fi!! "), "sci-fi");
        assert_eq!(normalize_tag("action"), "action");
        assert_eq!(normalize_tag("---"), "");
    }

    #[test]
    fn genre_filter_is_case_insensitive_substring() {
        let mut item = summary("a");
        item.genres = vec!["Action".to_string()];
        let filters = MangaFilters {
            genre: "action".to_string(),
            ..Default::default()
        };
        assert_eq!(apply_manga_filters(vec![item.clone()], &filters).len(), 1);

        let filters = MangaFilters {
            genre: "romance".to_string(),
            ..Default::default()
        };
        assert!(apply_manga_filters(vec![item], &filters).is_empty());
    }

    #[test]
    fn language_filter_checks_list_and_primary() {
        let mut item = summary("a");
        item.language = "id".to_string();
        item.languages = vec!["id".to_string(), "en".to_string()];
        let filters = MangaFilters {
            language: "en".to_string(),
            ..Default::default()
        };
        assert_eq!(apply_manga_filters(vec![item.clone()], &filters).len(), 1);

        let filters = MangaFilters {
            language: "fr".to_string(),
            ..Default::default()
        };
        assert!(apply_manga_filters(vec![item], &filters).is_empty());
    }

    #[test]
    fn latest_sort_prefers_higher_chapter_regardless_of_dates() {
        let mut a = summary("a");
        a.latest_chapter = Some("Ch. 5".to_string());
        a.updated_at = "2024-06-01T00:00:00Z".to_string();
        let mut b = summary("b");
        b.latest_chapter = Some("Ch. 10".to_string());
        b.updated_at = "2024-01-01T00:00:00Z".to_string();

        let sorted = apply_manga_sort(vec![a, b], "latest");
        assert_eq!(sorted[0].id, "b");
    }

    #[test]
    fn latest_sort_ties_broken_by_recency() {
        let mut a = summary("a");
        a.latest_chapter = Some("12".to_string());
        a.updated_at = "2024-01-01T00:00:00Z".to_string();
        let mut b = summary("b");
        b.latest_chapter = Some("12".to_string());
        b.updated_at = "2024-06-01T00:00:00Z".to_string();

        let sorted = apply_manga_sort(vec![a, b], "latest");
        assert_eq!(sorted[0].id, "b");
    }

    #[test]
    fn rating_sort_treats_junk_as_zero() {
        let mut a = summary("a");
        a.rating = "N/A".to_string();
        let mut b = summary("b");
        b.rating = "9.2".to_string();

        let sorted = apply_manga_sort(vec![a, b], "rating");
        assert_eq!(sorted[0].id, "b");
    }

    #[test]
    fn pagination_math() {
        assert_eq!(calculate_total_pages(0, 20), 1);
        assert_eq!(calculate_total_pages(41, 20), 3);
        assert_eq!(calculate_total_pages(40, 20), 2);
        assert_eq!(calculate_total_pages(1, 20), 1);
    }

    #[test]
    fn chapter_number_extraction() {
        assert_eq!(extract_chapter_number("Chapter 110.5"), 110.5);
        assert_eq!(extract_chapter_number("Ch. 7"), 7.0);
        assert_eq!(extract_chapter_number("oneshot"), 0.0);
    }
}
