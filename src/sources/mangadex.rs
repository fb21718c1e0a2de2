use super::{Capability, ListRequest, MangaSource, SourceError};
use crate::fetch::ResilientFetcher;
use crate::models::{RawChapter, RawMangaDetail, RawMangaEntry};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub const BASE_URL: &str = "https://api.mangadex.org";
const COVER_BASE: &str = "https://uploads.mangadex.org/covers";

#[derive(Deserialize)]
struct MangaList {
    #[serde(default)]
    data: Vec<MangaData>,
}

#[derive(Deserialize)]
struct MangaEnvelope {
    data: MangaData,
}

#[derive(Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    rel_type: String,
    #[serde(default)]
    attributes: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    alt_titles: Vec<HashMap<String, String>>,
    #[serde(default)]
    description: HashMap<String, String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_chapter: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    available_translated_languages: Vec<Option<String>>,
}

#[derive(Deserialize)]
struct Tag {
    attributes: TagAttributes,
}

#[derive(Deserialize)]
struct TagAttributes {
    #[serde(default)]
    name: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ChapterFeed {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// Official MangaDex API adapter. Listing is partitioned by translation
/// language, so refreshes iterate the configured language targets.
pub struct MangaDex {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
}

impl MangaDex {
    pub fn new(fetcher: Arc<ResilientFetcher>) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    pub fn with_base_url(fetcher: Arc<ResilientFetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.to_string(),
        }
    }

    fn map_entry(&self, manga: MangaData) -> RawMangaEntry {
        let title = manga
            .attributes
            .title
            .get("en")
            .cloned()
            .unwrap_or_else(|| {
                manga
                    .attributes
                    .title
                    .values()
                    .next()
                    .cloned()
                    .unwrap_or_default()
            });

        let alt_title = manga
            .attributes
            .alt_titles
            .iter()
            .flat_map(|m| m.values())
            .find(|t| !t.is_empty() && **t != title)
            .cloned();

        let description = manga
            .attributes
            .description
            .get("en")
            .cloned()
            .unwrap_or_default();

        let genres: Vec<String> = manga
            .attributes
            .tags
            .into_iter()
            .filter_map(|tag| tag.attributes.name.get("en").cloned())
            .collect();

        let cover = manga
            .relationships
            .iter()
            .find(|r| r.rel_type == "cover_art")
            .and_then(|rel| {
                rel.attributes
                    .as_ref()
                    .and_then(|attrs| attrs.get("fileName"))
                    .and_then(|f| f.as_str())
                    .map(|filename| format!("{}/{}/{}", COVER_BASE, manga.id, filename))
            });

        let languages: Vec<String> = manga
            .attributes
            .available_translated_languages
            .into_iter()
            .flatten()
            .collect();

        RawMangaEntry {
            id: Some(manga.id.clone()),
            source: Some("mangadex".to_string()),
            title: Some(title),
            alt_title,
            cover,
            latest_chapter: manga.attributes.last_chapter.filter(|c| !c.is_empty()),
            status: manga.attributes.status,
            kind: Some("Manga".to_string()),
            genres: Some(genres),
            url: Some(format!("https://mangadex.org/title/{}", manga.id)),
            description: Some(description),
            language: languages.first().cloned(),
            languages: if languages.is_empty() {
                None
            } else {
                Some(languages)
            },
            updated_at: manga.attributes.updated_at,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MangaSource for MangaDex {
    fn name(&self) -> &'static str {
        "mangadex"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::List,
            Capability::Detail,
            Capability::Chapters,
            Capability::Search,
            Capability::LanguagePartitioned,
        ]
    }

    async fn manga_list(&self, req: &ListRequest) -> Result<Vec<RawMangaEntry>, SourceError> {
        let mut url = format!(
            "{}/manga?limit={}&offset={}&includes[]=cover_art&order[latestUploadedChapter]=desc",
            self.base_url,
            req.limit,
            req.offset()
        );
        if let Some(lang) = req.language.as_deref().filter(|l| *l != "all") {
            url.push_str(&format!(
                "&availableTranslatedLanguage[]={}",
                urlencoding::encode(lang)
            ));
        }

        let list: MangaList = self.fetcher.fetch_json(&url).await?;
        Ok(list.data.into_iter().map(|m| self.map_entry(m)).collect())
    }

    async fn manga_detail(&self, id: &str) -> Result<Option<RawMangaDetail>, SourceError> {
        let url = format!(
            "{}/manga/{}?includes[]=cover_art&includes[]=author&includes[]=artist",
            self.base_url,
            urlencoding::encode(id)
        );
        let envelope: MangaEnvelope = match self.fetcher.fetch_json(&url).await {
            Ok(envelope) => envelope,
            Err(crate::fetch::FetchError::Http(e))
                if e.status() == Some(reqwest::StatusCode::NOT_FOUND) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };

        let author = envelope
            .data
            .relationships
            .iter()
            .find(|r| r.rel_type == "author")
            .and_then(|r| r.attributes.as_ref())
            .and_then(|a| a.get("name"))
            .and_then(|n| n.as_str())
            .map(|s| s.to_string());
        let artist = envelope
            .data
            .relationships
            .iter()
            .find(|r| r.rel_type == "artist")
            .and_then(|r| r.attributes.as_ref())
            .and_then(|a| a.get("name"))
            .and_then(|n| n.as_str())
            .map(|s| s.to_string());

        let entry = self.map_entry(envelope.data);
        Ok(Some(RawMangaDetail {
            entry,
            author,
            artist,
            chapters_count: None,
            extra: serde_json::Map::new(),
        }))
    }

    async fn chapters(&self, id: &str) -> Result<Vec<RawChapter>, SourceError> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        let limit = 100usize;
        loop {
            let url = format!(
                "{}/manga/{}/feed?limit={}&offset={}&order[chapter]=asc",
                self.base_url,
                urlencoding::encode(id),
                limit,
                offset
            );
            let feed: ChapterFeed = self.fetcher.fetch_json(&url).await?;
            if feed.data.is_empty() {
                break;
            }
            let count = feed.data.len();
            for chapter in feed.data {
                let number = chapter["attributes"]["chapter"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let chapter_id = chapter["id"].as_str().unwrap_or_default();
                if chapter_id.is_empty() {
                    continue;
                }
                out.push(RawChapter {
                    number,
                    title: chapter["attributes"]["title"].as_str().map(|s| s.to_string()),
                    url: format!("https://mangadex.org/chapter/{}", chapter_id),
                    date: chapter["attributes"]["publishAt"].as_str().map(|s| s.to_string()),
                });
            }
            if count < limit {
                break;
            }
            offset += limit;
        }
        Ok(out)
    }

    async fn search(&self, query: &str) -> Result<Vec<RawMangaEntry>, SourceError> {
        let url = format!(
            "{}/manga?title={}&limit=25&includes[]=cover_art",
            self.base_url,
            urlencoding::encode(query)
        );
        let list: MangaList = self.fetcher.fetch_json(&url).await?;
        Ok(list.data.into_iter().map(|m| self.map_entry(m)).collect())
    }
}
