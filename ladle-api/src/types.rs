//! Facade request/response types

use ladle_core::{TagId, UserId};
use serde::{Deserialize, Serialize};

/// Request to list recipes shared with a requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSharedRequest {
    /// Requester identity; compared case-insensitively against grants.
    pub requester_email: String,
    /// ANY-of-set tag filter: a recipe matches if it carries at least one
    /// of these tags, not all of them.
    pub tag_filter: Option<Vec<TagId>>,
    /// Case-insensitive substring match against title OR description.
    pub search_term: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl ListSharedRequest {
    /// A request with no filters and a default page size.
    pub fn for_email(email: &str) -> Self {
        Self {
            requester_email: email.to_string(),
            tag_filter: None,
            search_term: None,
            limit: 50,
            offset: 0,
        }
    }

    pub fn with_tags(mut self, tags: Vec<TagId>) -> Self {
        self.tag_filter = Some(tags);
        self
    }

    pub fn with_search(mut self, term: &str) -> Self {
        self.search_term = Some(term.to_string());
        self
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Request to list an owner's personal recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListOwnRequest {
    pub owner_id: UserId,
    pub limit: usize,
    pub offset: usize,
}

impl ListOwnRequest {
    pub fn for_owner(owner_id: UserId) -> Self {
        Self {
            owner_id,
            limit: 50,
            offset: 0,
        }
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// One page of results.
///
/// `total_count` is computed in the same call as the page, so `has_more`
/// is consistent with it; rows may still duplicate or skip across pages if
/// writes land between fetches, and callers de-duplicate by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub rows: Vec<T>,
    pub has_more: bool,
    pub total_count: usize,
}
