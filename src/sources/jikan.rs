use super::{Capability, ListRequest, MangaSource, SourceError};
use crate::fetch::ResilientFetcher;
use crate::models::{RawMangaEntry, RawMangaDetail};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

pub const BASE_URL: &str = "https://api.jikan.moe/v4";

// Jikan enforces 3 req/s; space requests out on top of the shared limiters.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(350);
// The API caps page size at 25.
const MAX_PAGE_LIMIT: usize = 25;

#[derive(Deserialize)]
struct JikanList {
    #[serde(default)]
    data: Vec<JikanManga>,
}

#[derive(Deserialize)]
struct JikanEnvelope {
    data: JikanManga,
}

#[derive(Deserialize)]
struct JikanManga {
    mal_id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    title_english: Option<String>,
    #[serde(default)]
    title_japanese: Option<String>,
    #[serde(default)]
    images: Option<JikanImages>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    chapters: Option<u32>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    genres: Vec<JikanGenre>,
    #[serde(default)]
    synopsis: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published: Option<JikanPublished>,
    #[serde(default)]
    authors: Vec<JikanGenre>,
}

#[derive(Deserialize)]
struct JikanImages {
    #[serde(default)]
    jpg: Option<JikanImageSet>,
}

#[derive(Deserialize)]
struct JikanImageSet {
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    large_image_url: Option<String>,
}

#[derive(Deserialize)]
struct JikanGenre {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct JikanPublished {
    #[serde(default)]
    from: Option<String>,
}

/// Jikan v4 (unofficial MyAnimeList) adapter. Trusted JSON API with its
/// own request pacing.
pub struct Jikan {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
    last_request: Mutex<Option<Instant>>,
}

impl Jikan {
    pub fn new(fetcher: Arc<ResilientFetcher>) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    pub fn with_base_url(fetcher: Arc<ResilientFetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.to_string(),
            last_request: Mutex::new(None),
        }
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn map_entry(manga: JikanManga) -> RawMangaEntry {
        let cover = manga.images.as_ref().and_then(|i| {
            i.jpg.as_ref().and_then(|j| {
                j.large_image_url
                    .clone()
                    .or_else(|| j.image_url.clone())
            })
        });
        let cover_full = manga
            .images
            .as_ref()
            .and_then(|i| i.jpg.as_ref().and_then(|j| j.large_image_url.clone()));

        RawMangaEntry {
            id: Some(manga.mal_id.to_string()),
            source: Some("jikan".to_string()),
            title: manga
                .title
                .clone()
                .or(manga.title_english.clone())
                .or_else(|| Some("Unknown".to_string())),
            alt_title: manga.title_japanese.clone().filter(|t| !t.is_empty()),
            cover,
            cover_full,
            rating: manga.score.map(|s| s.to_string()),
            latest_chapter: manga.chapters.map(|c| c.to_string()),
            status: manga.status.clone(),
            kind: manga.kind.clone(),
            genres: Some(
                manga
                    .genres
                    .iter()
                    .filter_map(|g| g.name.clone())
                    .collect(),
            ),
            url: manga.url.clone(),
            description: manga.synopsis.clone(),
            language: Some("en".to_string()),
            published_at: manga.published.as_ref().and_then(|p| p.from.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MangaSource for Jikan {
    fn name(&self) -> &'static str {
        "jikan"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::List,
            Capability::Detail,
            Capability::Search,
            Capability::Popular,
        ]
    }

    async fn manga_list(&self, req: &ListRequest) -> Result<Vec<RawMangaEntry>, SourceError> {
        self.pace().await;
        let url = format!(
            "{}/top/manga?page={}&limit={}",
            self.base_url,
            req.page,
            req.limit.min(MAX_PAGE_LIMIT)
        );
        let list: JikanList = self.fetcher.fetch_json(&url).await?;
        Ok(list.data.into_iter().map(Self::map_entry).collect())
    }

    async fn manga_detail(&self, id: &str) -> Result<Option<RawMangaDetail>, SourceError> {
        self.pace().await;
        let url = format!("{}/manga/{}", self.base_url, urlencoding::encode(id));
        let envelope: JikanEnvelope = match self.fetcher.fetch_json(&url).await {
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
            .authors
            .iter()
            .filter_map(|a| a.name.clone())
            .next();
        let chapters_count = envelope.data.chapters;
        let entry = Self::map_entry(envelope.data);
        Ok(Some(RawMangaDetail {
            entry,
            author,
            artist: None,
            chapters_count,
            extra: serde_json::Map::new(),
        }))
    }

    async fn search(&self, query: &str) -> Result<Vec<RawMangaEntry>, SourceError> {
        self.pace().await;
        let url = format!(
            "{}/manga?q={}&limit=25",
            self.base_url,
            urlencoding::encode(query)
        );
        let list: JikanList = self.fetcher.fetch_json(&url).await?;
        Ok(list.data.into_iter().map(Self::map_entry).collect())
    }

    async fn popular(&self, limit: usize) -> Result<Vec<RawMangaEntry>, SourceError> {
        self.pace().await;
        let url = format!(
            "{}/top/manga?page=1&limit={}",
            self.base_url,
            limit.min(MAX_PAGE_LIMIT)
        );
        let list: JikanList = self.fetcher.fetch_json(&url).await?;
        Ok(list.data.into_iter().map(Self::map_entry).collect())
    }
}
