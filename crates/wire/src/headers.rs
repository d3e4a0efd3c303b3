// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request header names and the API version constant.
//!
//! Every request carries `Accept: application/json`, a `User-Agent`, the
//! [`API_HEADER`] with [`API_VERSION`], and either `Authorization: Basic`
//! (login only) or `Authorization: Bearer`. Instance-scoped requests add
//! [`INSTANCE_HEADER`] with the instance id.

/// Header naming the API semver the client speaks.
pub const API_HEADER: &str = "Api";

/// Accepted API version; mismatches answer 426.
pub const API_VERSION: &str = "Gamekeeper.Api/1.0.0";

/// Header scoping a request to one instance.
pub const INSTANCE_HEADER: &str = "Instance";
