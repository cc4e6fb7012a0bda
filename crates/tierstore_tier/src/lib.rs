// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Storage backend contract shared by every tier of a tierstore.
//!
//! This crate defines the [`StorageBackend`] trait that the volatile cache tier and the
//! durable persistent tier both satisfy, along with the [`StorageValue`] payload type,
//! [`KeyPattern`] for bulk invalidation, tier statistics, and the opaque [`Error`] type.
//!
//! # Overview
//!
//! Backends only move [`StorageValue`]s around. Typed access goes through
//! [`StorageBackendExt::get_validated`], which decodes the stored value and runs a
//! caller-supplied predicate over it. A value that cannot be decoded, or that the
//! predicate rejects, is reported as absent rather than as an error.
//!
//! # Implementing a Backend
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//! use std::time::Duration;
//!
//! use tierstore_tier::{Error, StorageBackend, StorageValue};
//!
//! #[derive(Default)]
//! struct SimpleBackend(RwLock<HashMap<String, StorageValue>>);
//!
//! impl StorageBackend for SimpleBackend {
//!     fn name(&self) -> &'static str {
//!         "simple"
//!     }
//!
//!     async fn get(&self, key: &str) -> Result<Option<StorageValue>, Error> {
//!         Ok(self.0.read().unwrap().get(key).cloned())
//!     }
//!
//!     async fn set(&self, key: &str, value: StorageValue, _ttl: Option<Duration>) -> Result<(), Error> {
//!         self.0.write().unwrap().insert(key.to_string(), value);
//!         Ok(())
//!     }
//!
//!     async fn delete(&self, key: &str) -> Result<bool, Error> {
//!         Ok(self.0.write().unwrap().remove(key).is_some())
//!     }
//!
//!     async fn clear(&self) -> Result<(), Error> {
//!         self.0.write().unwrap().clear();
//!         Ok(())
//!     }
//!
//!     async fn keys(&self) -> Result<Vec<String>, Error> {
//!         Ok(self.0.read().unwrap().keys().cloned().collect())
//!     }
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Enable the `dynamic-backend` feature (on by default) for [`DynamicBackend`], which wraps
//! any backend in a type-erased, clonable container so tiers can be swapped at runtime.

mod backend;
pub mod error;
mod pattern;
mod stats;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod value;

#[cfg(any(test, feature = "dynamic-backend"))]
mod dynamic;

#[doc(inline)]
pub use backend::{StorageBackend, StorageBackendExt};
#[cfg(any(test, feature = "dynamic-backend"))]
#[doc(inline)]
pub use dynamic::{DynamicBackend, DynamicBackendExt};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use pattern::KeyPattern;
#[doc(inline)]
pub use stats::{CleanupOptions, CleanupReport, TierStats};
#[doc(inline)]
pub use value::StorageValue;
