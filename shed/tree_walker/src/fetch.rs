/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::sync::Arc;

use anyhow::Error;
use futures::future::BoxFuture;

use crate::context::Context;

/// Outcome of a successful children listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Children<S> {
    /// Child names (not full paths), in the order the store returned them.
    pub names: Vec<String>,
    /// Metadata of the node that was listed.
    pub stat: S,
}

/// The single capability the walker needs from a coordination-service
/// client: list the children of a path together with its metadata.
///
/// Implementations must tolerate concurrent calls, and should return
/// promptly with an error once `ctx` is done.
pub trait ChildrenFetch: Send + Sync {
    /// Opaque per-node metadata handed back to the caller untouched.
    type Stat: Send + 'static;

    fn children<'a>(
        &'a self,
        ctx: &'a Context,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Children<Self::Stat>, Error>>;
}

impl<T: ChildrenFetch + ?Sized> ChildrenFetch for Arc<T> {
    type Stat = T::Stat;

    fn children<'a>(
        &'a self,
        ctx: &'a Context,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Children<Self::Stat>, Error>> {
        (**self).children(ctx, path)
    }
}
