// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository engine error types.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RepoError {
    #[error("no repository at {0}")]
    NotCloned(PathBuf),

    #[error("repository already exists at {0}")]
    AlreadyCloned(PathBuf),

    #[error("failed to open repository at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("origin remote not configured")]
    NoOrigin,

    #[error("clone failed: {0}")]
    Clone(#[source] git2::Error),

    #[error("fetch failed: {0}")]
    Fetch(#[source] git2::Error),

    #[error("cannot resolve {0}")]
    Unresolvable(String),

    #[error("merge failed: {0}")]
    Merge(#[source] git2::Error),

    #[error("commit failed: {0}")]
    Commit(#[source] git2::Error),

    #[error("reset failed: {0}")]
    Reset(#[source] git2::Error),

    #[error("checkout failed: {0}")]
    Checkout(#[source] git2::Error),

    #[error("working tree cleanup failed on {path}: {source}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal failure: {0}")]
    Internal(String),

    #[error(transparent)]
    Git(#[from] git2::Error),
}
