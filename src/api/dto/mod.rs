//! Data Transfer Objects for REST request/response serialization.
//!
//! Stored records and summaries are serialized as-is; the DTOs add the
//! request echo (`url`, `kind`, `window`) the dashboard keys its charts on.

pub mod common_dto;
pub mod result_dto;
pub mod scan_dto;
pub mod url_dto;

pub use common_dto::*;
pub use result_dto::*;
pub use scan_dto::*;
pub use url_dto::*;
