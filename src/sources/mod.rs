//! Source adapters
//!
//! Every external provider implements `MangaSource`. Optional operations
//! default to a typed `Unsupported` error and are advertised through the
//! adapter's capability set, so callers can ask up front instead of
//! probing at runtime.

use crate::fetch::FetchError;
use crate::models::{ChapterPage, RawChapter, RawMangaDetail, RawMangaEntry};
use async_trait::async_trait;
use thiserror::Error;

pub mod jikan;
pub mod komiku;
pub mod mangadex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    List,
    Detail,
    Chapters,
    ChapterPages,
    Search,
    Popular,
    /// The source's listing API is partitioned by translation language;
    /// refreshes must iterate the configured target languages.
    LanguagePartitioned,
}

/// One page of a listing request.
#[derive(Debug, Clone)]
pub struct ListRequest {
    /// 1-based page number.
    pub page: u32,
    pub limit: usize,
    /// Only meaningful for language-partitioned sources.
    pub language: Option<String>,
}

impl ListRequest {
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to parse {context}: {message}")]
    Parse { context: String, message: String },
    #[error("operation {0} is not supported by this source")]
    Unsupported(&'static str),
}

impl SourceError {
    pub fn parse(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        SourceError::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
pub trait MangaSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &'static [Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    async fn manga_list(&self, req: &ListRequest) -> Result<Vec<RawMangaEntry>, SourceError>;

    async fn manga_detail(&self, _id: &str) -> Result<Option<RawMangaDetail>, SourceError> {
        Err(SourceError::Unsupported("manga_detail"))
    }

    async fn chapters(&self, _id: &str) -> Result<Vec<RawChapter>, SourceError> {
        Err(SourceError::Unsupported("chapters"))
    }

    async fn chapter_pages(&self, _id: &str) -> Result<Vec<ChapterPage>, SourceError> {
        Err(SourceError::Unsupported("chapter_pages"))
    }

    async fn search(&self, _query: &str) -> Result<Vec<RawMangaEntry>, SourceError> {
        Err(SourceError::Unsupported("search"))
    }

    async fn popular(&self, _limit: usize) -> Result<Vec<RawMangaEntry>, SourceError> {
        Err(SourceError::Unsupported("popular"))
    }
}
