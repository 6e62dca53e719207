/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use thiserror::Error;

use crate::context::ContextError;

/// Terminal error of a walk.  The first error observed wins; later ones are
/// discarded.
#[derive(Debug, Error)]
pub enum WalkError {
    /// The governing context was cancelled or its deadline expired.
    #[error("walk aborted: {0}")]
    Aborted(#[from] ContextError),

    /// Listing the children of `path` failed.
    #[error("failed to fetch children of {path}")]
    Fetch {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// The caller's visitor returned an error for `path`.
    #[error("visitor failed at {path}")]
    Visitor {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Nobody is reading results any more.
    #[error("walk results receiver was dropped")]
    Closed,

    #[error("Programming error at {file}:{line}: {desc}")]
    ProgrammingError {
        desc: String,
        file: &'static str,
        line: u32,
    },
}

impl WalkError {
    /// Whether the walk stopped because its context was cancelled or timed
    /// out, rather than because something failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WalkError::Aborted(_))
    }

    /// The node the error is attributed to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            WalkError::Fetch { path, .. } | WalkError::Visitor { path, .. } => Some(path),
            _ => None,
        }
    }
}

macro_rules! programming_error {
    ( $( $args:tt )* ) => {
        $crate::error::WalkError::ProgrammingError {
            desc: format!( $( $args )* ),
            file: file!(),
            line: line!(),
        }
    };
}
