pub mod admin;
pub mod cases;
pub mod health;
pub mod metrics;
pub mod policies;
pub mod statuses;

use serde::Serialize;

use crate::services::Page;

pub use health::health_check;

/// Page selected by the `page`/`page_size` query parameters.
pub fn page_of(page: Option<u32>, page_size: Option<u32>) -> Page {
    let default = Page::default();
    Page {
        page: page.unwrap_or(default.page),
        page_size: page_size.unwrap_or(default.page_size),
    }
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub count: u64,
    pub page: u32,
    pub results: Vec<T>,
}
