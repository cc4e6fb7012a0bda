// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Dynamic backend wrapper for type erasure.

use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::{CleanupOptions, CleanupReport, Error, KeyPattern, StorageBackend, StorageValue, TierStats, backend::DynStorageBackend};

/// Extension trait for converting any `StorageBackend` into a `DynamicBackend`.
///
/// This trait is automatically implemented for all types that implement `StorageBackend`.
///
/// # Examples
///
/// ```
/// use tierstore_tier::{DynamicBackend, DynamicBackendExt, StorageBackend};
///
/// fn erase<B>(backend: B) -> DynamicBackend
/// where
///     B: StorageBackend + 'static,
/// {
///     backend.into_dynamic()
/// }
/// ```
pub trait DynamicBackendExt: Sized {
    /// Converts this backend into a `DynamicBackend`.
    fn into_dynamic(self) -> DynamicBackend;
}

impl<B> DynamicBackendExt for B
where
    B: StorageBackend + 'static,
{
    fn into_dynamic(self) -> DynamicBackend {
        DynamicBackend::new(self)
    }
}

/// A clonable storage backend with type erasure.
///
/// `DynamicBackend` wraps a trait object in an `Arc` so it can be cloned while keeping
/// dynamic dispatch. Use it when the concrete tier is only known at runtime, for example
/// when the persistent tier is chosen from configuration.
pub struct DynamicBackend(Arc<DynStorageBackend<'static>>);

impl DynamicBackend {
    /// Creates a new dynamic backend from any `StorageBackend` implementation.
    pub(crate) fn new<B>(backend: B) -> Self
    where
        B: StorageBackend + 'static,
    {
        Self(DynStorageBackend::new_arc(backend))
    }
}

impl Debug for DynamicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicBackend").field("name", &self.0.name()).finish()
    }
}

impl Clone for DynamicBackend {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl StorageBackend for DynamicBackend {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    async fn get(&self, key: &str) -> Result<Option<StorageValue>, Error> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: StorageValue, ttl: Option<Duration>) -> Result<(), Error> {
        self.0.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.0.delete(key).await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.0.clear().await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.0.keys().await
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.0.exists(key).await
    }

    async fn invalidate(&self, pattern: &KeyPattern) -> Result<u64, Error> {
        self.0.invalidate(pattern).await
    }

    async fn stats(&self) -> Result<TierStats, Error> {
        self.0.stats().await
    }

    async fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupReport, Error> {
        self.0.cleanup(options).await
    }
}
