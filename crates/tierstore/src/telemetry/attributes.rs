// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[cfg(any(feature = "metrics", test))]
pub(crate) const STORAGE_OPERATION_NAME: &str = "storage.operation";

#[cfg(any(feature = "metrics", test))]
pub(crate) const STORAGE_TIER_NAME: &str = "storage.tier";

#[cfg(any(feature = "metrics", test))]
pub(crate) const STORAGE_SUCCESS_NAME: &str = "storage.success";

#[cfg(test)]
pub(crate) const STORAGE_ACTIVITY_NAME: &str = "storage.activity";

#[cfg(test)]
pub(crate) const STORAGE_KEY_NAME: &str = "storage.key";

#[cfg(test)]
pub(crate) const STORAGE_DURATION_NAME: &str = "storage.duration_ms";

#[cfg(test)]
pub(crate) const STORAGE_EVENT_NAME: &str = "storage.event";

#[cfg(test)]
pub(crate) const STORAGE_DETAIL_NAME: &str = "storage.detail";
