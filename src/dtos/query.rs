//! Query-string DTOs shared by the REST façade.

use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// `?page=&limit=` pagination parameters. Pages are 1-based.
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    /// Normalizes the raw parameters: page defaults to 1, limit to
    /// [`DEFAULT_PAGE_SIZE`] and is clamped to [`MAX_PAGE_SIZE`].
    pub fn normalize(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

/// `?query=` parameter of the doctor search endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
}
