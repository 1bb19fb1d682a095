//! LADLE API - Query Facade and Write Entry Points
//!
//! The surface consumed by client collaborators: paginated, filterable
//! shared-recipe queries served from the refreshed projection, plus the
//! grant/recipe/tag/profile write paths that keep it consistent. Transport
//! framing and retry/back-off wrappers live outside this crate; reads here
//! are idempotent by construction so callers can retry them freely.

pub mod facade;
pub mod types;

pub use facade::RecipeFacade;
pub use types::{ListOwnRequest, ListPage, ListSharedRequest};
