use super::{Capability, ListRequest, MangaSource, SourceError};
use crate::fetch::ResilientFetcher;
use crate::models::{ChapterPage, RawChapter, RawMangaEntry};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;

pub const BASE_URL: &str = "https://komiku.id";

/// Komiku HTML adapter. Goes through the resilient fetch layer since the
/// site sits behind anti-bot protection; selectors cover the handful of
/// listing layouts the site rotates between.
pub struct Komiku {
    fetcher: Arc<ResilientFetcher>,
    base_url: String,
}

impl Komiku {
    pub fn new(fetcher: Arc<ResilientFetcher>) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    pub fn with_base_url(fetcher: Arc<ResilientFetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.to_string(),
        }
    }

    fn resolve_url(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", self.base_url, href)
        }
    }

    // Slug after /manga/ is the stable id; fall back to the last path
    // segment for other layouts.
    fn extract_id(url: &str) -> Option<String> {
        let path = url.split("://").nth(1).unwrap_or(url);
        let segments: Vec<&str> = path
            .trim_end_matches('/')
            .split('/')
            .skip(1)
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(pos) = segments.iter().position(|s| *s == "manga") {
            return segments.get(pos + 1).map(|s| s.to_string());
        }
        segments.last().map(|s| s.to_string())
    }

    fn parse_list(&self, html: &str) -> Vec<RawMangaEntry> {
        let document = Html::parse_document(html);
        let card_selector = Selector::parse(
            "#Terbaru article.ls4, #Rekomendasi_Komik article.ls2, .ls4w article.ls4, .listupd .animepost",
        )
        .expect("card selector");
        let link_selector = Selector::parse("a").expect("link selector");
        let title_selector = Selector::parse("h3, h4").expect("title selector");
        let img_selector = Selector::parse("img").expect("img selector");
        let chapter_selector =
            Selector::parse(".ls24, .ls2l, .lsch a, .adds .lsch a").expect("chapter selector");
        let type_selector = Selector::parse(".type, .typeflag").expect("type selector");

        let mut seen = std::collections::HashSet::new();
        let mut items = Vec::new();

        for card in document.select(&card_selector) {
            let Some(link) = card.select(&link_selector).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let url = self.resolve_url(href);
            let Some(id) = Self::extract_id(&url) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }

            let title = link
                .value()
                .attr("title")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .or_else(|| {
                    card.select(&title_selector)
                        .next()
                        .map(|e| e.text().collect::<String>().trim().to_string())
                })
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }

            let cover = card.select(&img_selector).next().and_then(|img| {
                img.value()
                    .attr("data-src")
                    .or_else(|| img.value().attr("src"))
                    .map(|s| s.to_string())
            });

            let latest_chapter = card
                .select(&chapter_selector)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty());

            let kind = card
                .select(&type_selector)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty());

            items.push(RawMangaEntry {
                id: Some(id),
                source: Some("komiku".to_string()),
                title: Some(title),
                cover,
                latest_chapter,
                kind,
                url: Some(url),
                language: Some("id".to_string()),
                ..Default::default()
            });
        }
        items
    }

    fn parse_chapters(&self, html: &str) -> Vec<RawChapter> {
        let document = Html::parse_document(html);
        let row_selector =
            Selector::parse("#Daftar_Chapter tr td.judulseries a, .chapter-list a")
                .expect("chapter row selector");
        let date_selector = Selector::parse("td.tanggalseries").expect("date selector");

        let mut chapters = Vec::new();
        for link in document.select(&row_selector) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let label = link.text().collect::<String>().trim().to_string();
            if label.is_empty() {
                continue;
            }
            let date = link
                .parent()
                .and_then(|td| td.parent())
                .and_then(scraper::ElementRef::wrap)
                .and_then(|row| {
                    row.select(&date_selector)
                        .next()
                        .map(|e| e.text().collect::<String>().trim().to_string())
                });
            chapters.push(RawChapter {
                number: label.clone(),
                title: Some(label),
                url: self.resolve_url(href),
                date,
            });
        }
        chapters
    }

    fn parse_pages(&self, html: &str) -> Vec<ChapterPage> {
        let document = Html::parse_document(html);
        let img_selector = Selector::parse("#Baca_Komik img").expect("page img selector");
        document
            .select(&img_selector)
            .enumerate()
            .filter_map(|(idx, img)| {
                img.value()
                    .attr("src")
                    .or_else(|| img.value().attr("data-src"))
                    .map(|src| ChapterPage {
                        page: idx as u32 + 1,
                        url: src.to_string(),
                    })
            })
            .collect()
    }
}

#[async_trait]
impl MangaSource for Komiku {
    fn name(&self) -> &'static str {
        "komiku"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::List,
            Capability::Chapters,
            Capability::ChapterPages,
            Capability::Search,
        ]
    }

    async fn manga_list(&self, req: &ListRequest) -> Result<Vec<RawMangaEntry>, SourceError> {
        let url = if req.page <= 1 {
            self.base_url.clone()
        } else {
            format!("{}/page/{}/", self.base_url, req.page)
        };
        let html = self.fetcher.fetch_html(self.name(), &url).await?;
        Ok(self.parse_list(&html))
    }

    async fn chapters(&self, id: &str) -> Result<Vec<RawChapter>, SourceError> {
        let url = format!("{}/manga/{}/", self.base_url, id);
        let html = self.fetcher.fetch_html(self.name(), &url).await?;
        Ok(self.parse_chapters(&html))
    }

    async fn chapter_pages(&self, id: &str) -> Result<Vec<ChapterPage>, SourceError> {
        let url = format!("{}/{}/", self.base_url, id.trim_matches('/'));
        let html = self.fetcher.fetch_html(self.name(), &url).await?;
        Ok(self.parse_pages(&html))
    }

    async fn search(&self, query: &str) -> Result<Vec<RawMangaEntry>, SourceError> {
        let url = format!(
            "{}/?post_type=manga&s={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let html = self.fetcher.fetch_html(self.name(), &url).await?;
        Ok(self.parse_list(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_slug_ids_from_urls() {
        assert_eq!(
            Komiku::extract_id("https://komiku.id/manga/one-piece/"),
            Some("one-piece".to_string())
        );
        assert_eq!(Komiku::extract_id("https://komiku.id/"), None);
    }
}
