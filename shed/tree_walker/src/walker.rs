/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use tracing::debug_span;

use crate::context::Context;
use crate::engine::Engine;
use crate::error::WalkError;
use crate::fetch::ChildrenFetch;

/// Order in which a walk emits nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalOrder {
    /// Post-order: every node is emitted after all of its descendants, so
    /// the root comes last.
    #[default]
    DepthFirst,
    /// Level order: the root first, then nodes in non-decreasing depth.
    BreadthFirst,
}

/// Everything that shapes a walk apart from the fetcher and the root path.
///
/// Deserializable so that it can be embedded in a caller's configuration;
/// missing fields take their default values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkOptions {
    pub order: TraversalOrder,
    /// Whether the root itself may be emitted.  It is fetched either way.
    pub include_root: bool,
    /// Only emit nodes with no children.
    pub leaves_only: bool,
    /// Maximum number of fetches in flight.  Values below one act as one.
    pub concurrency: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            order: TraversalOrder::DepthFirst,
            include_root: true,
            leaves_only: false,
            concurrency: 1,
        }
    }
}

/// A node emitted by a walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkEntry<S> {
    /// Absolute path of the node.
    pub path: String,
    pub stat: S,
}

/// One item of a streaming walk.  A failed walk ends with exactly one `Err`.
pub type WalkResult<S> = Result<WalkEntry<S>, WalkError>;

/// Walks the namespace below a root path.
///
/// Configure it with the chainable setters, then call [`TreeWalker::walk`],
/// [`TreeWalker::walk_chan`] or [`TreeWalker::walk_stream`] as many times as
/// needed; each call starts from scratch.
pub struct TreeWalker<F> {
    fetcher: Arc<F>,
    root: String,
    options: WalkOptions,
}

impl<F> Clone for TreeWalker<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            root: self.root.clone(),
            options: self.options,
        }
    }
}

impl<F> fmt::Debug for TreeWalker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeWalker")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<F: ChildrenFetch> TreeWalker<F> {
    /// Walk the tree below `root` (inclusive) using `fetcher`, depth-first,
    /// including the root, one fetch at a time.
    pub fn new(fetcher: F, root: impl Into<String>) -> Self {
        Self::from_arc(Arc::new(fetcher), root)
    }

    /// Like [`TreeWalker::new`], for a fetcher that is shared with other
    /// users.
    pub fn from_arc(fetcher: Arc<F>, root: impl Into<String>) -> Self {
        Self {
            fetcher,
            root: root.into(),
            options: WalkOptions::default(),
        }
    }

    pub fn depth_first(self) -> Self {
        self.order(TraversalOrder::DepthFirst)
    }

    pub fn breadth_first(self) -> Self {
        self.order(TraversalOrder::BreadthFirst)
    }

    pub fn order(mut self, order: TraversalOrder) -> Self {
        self.options.order = order;
        self
    }

    pub fn include_root(mut self, include_root: bool) -> Self {
        self.options.include_root = include_root;
        self
    }

    /// Only emit nodes that turn out to have no children.
    pub fn leaves_only(mut self) -> Self {
        self.options.leaves_only = true;
        self
    }

    /// Allow up to `concurrency` fetches in flight at once.  Emission order
    /// is only deterministic with a concurrency of one.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = concurrency.max(1);
        self
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = WalkOptions {
            concurrency: options.concurrency.max(1),
            ..options
        };
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn options(&self) -> WalkOptions {
        self.options
    }

    fn engine(&self) -> Engine<F> {
        Engine::new(self.fetcher.clone(), self.root.clone(), self.options)
    }

    /// Walk the tree, calling `visitor` for every emitted node in the order
    /// the walk produces them.
    ///
    /// Returns `Ok(())` once the whole tree has been visited, or the first
    /// error observed: a failed fetch, an error returned by `visitor`, or
    /// the cancellation of `ctx`.  Nodes emitted before the walk failed are
    /// still visited; an error the visitor returns for one of them is
    /// dropped in favour of the walk's own.  The visitor is never called again after it has
    /// returned an error.  Calls are made one at a time from the calling
    /// task, even with a concurrency above one.
    pub async fn walk<V>(&self, ctx: &Context, mut visitor: V) -> Result<(), WalkError>
    where
        V: FnMut(&Context, &str, &F::Stat) -> anyhow::Result<()>,
    {
        let walk_ctx = ctx.child();
        let engine = self.engine();
        let (tx, mut rx) = mpsc::channel(1);
        // Set once the walk itself has failed; from then on its error wins.
        let walk_failed = AtomicBool::new(false);

        let produce = {
            let walk_ctx = &walk_ctx;
            let walk_failed = &walk_failed;
            async move {
                engine
                    .run_with(walk_ctx, &tx, |_| {
                        walk_failed.store(true, Ordering::SeqCst);
                        walk_ctx.cancel();
                    })
                    .await
            }
        };

        let consume = async {
            while let Some(result) = rx.recv().await {
                let WalkEntry { path, stat } = result?;
                if let Err(source) = visitor(&walk_ctx, &path, &stat) {
                    if walk_failed.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    walk_ctx.cancel();
                    return Err(WalkError::Visitor { path, source });
                }
            }
            Ok(())
        };

        let (walked, visited) = async { futures::join!(produce, consume) }
            .instrument(debug_span!("walk", root = %self.root))
            .await;
        visited.and(walked)
    }
}

impl<F: ChildrenFetch + 'static> TreeWalker<F> {
    /// Walk the tree in the background, delivering results through a channel
    /// holding up to `capacity` unread results (at least one).
    ///
    /// Every emitted node arrives as `Ok`.  If the walk fails or `ctx` is
    /// cancelled, exactly one `Err` follows.  The channel is closed when the
    /// walk ends.  A full channel suspends the walk until the receiver catches
    /// up or `ctx` is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn walk_chan(&self, ctx: &Context, capacity: usize) -> mpsc::Receiver<WalkResult<F::Stat>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let engine = self.engine();
        let ctx = ctx.clone();

        tokio::spawn(
            async move {
                if let Err(err) = engine.run(&ctx, &tx).await {
                    // Fails only if the receiver is gone, and then nobody cares.
                    let _ = tx.send(Err(err)).await;
                }
            }
            .instrument(debug_span!("walk_chan", root = %self.root, capacity)),
        );
        rx
    }

    /// [`TreeWalker::walk_chan`] as a [`futures::Stream`].
    pub fn walk_stream(&self, ctx: &Context, capacity: usize) -> ReceiverStream<WalkResult<F::Stat>> {
        ReceiverStream::new(self.walk_chan(ctx, capacity))
    }
}
