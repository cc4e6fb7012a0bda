// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Durable persistent tier for tierstore.
//!
//! [`FileBackend`] implements [`StorageBackend`] on top of a single JSON document on disk.
//! Values keep their [`StorageValue`] tags in the file, so dates and records read back exactly
//! as they were written. Each mutation rewrites the document through a temporary file and an
//! atomic rename; readers never observe a partially written store.
//!
//! The document layout is:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "important_progress": {
//!       "value": { "type": "number", "value": 3 },
//!       "stored_at": "2024-06-01T12:00:00Z",
//!       "expires_at": "2024-06-01T12:05:00Z"
//!     }
//!   }
//! }
//! ```
//!
//! [`StorageBackend`]: tierstore_tier::StorageBackend
//! [`StorageValue`]: tierstore_tier::StorageValue

mod document;
mod tier;

#[doc(inline)]
pub use tier::FileBackend;
