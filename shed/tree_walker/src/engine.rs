/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

use std::collections::HashMap;
use std::collections::VecDeque;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::trace;

use crate::context::Context;
use crate::context::ContextError;
use crate::error::WalkError;
use crate::fetch::Children;
use crate::fetch::ChildrenFetch;
use crate::walker::TraversalOrder;
use crate::walker::WalkEntry;
use crate::walker::WalkOptions;
use crate::walker::WalkResult;

type NodeId = usize;

type FetchFuture<'a, S> = BoxFuture<'a, (FrontierItem, Result<Children<S>, anyhow::Error>)>;

/// Join a child name onto its parent path with exactly one separator.
pub fn join_path(parent: &str, child: &str) -> String {
    let mut path = String::with_capacity(parent.len() + child.len() + 1);
    path.push_str(parent);
    if !parent.ends_with('/') {
        path.push('/');
    }
    path.push_str(child);
    path
}

/// A node waiting for its children to be fetched.
#[derive(Debug)]
struct FrontierItem {
    id: NodeId,
    parent: Option<NodeId>,
    path: String,
}

impl FrontierItem {
    fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A fetched node whose descendants are still being processed.  Only used
/// by depth-first walks, where a node is emitted after its last child.
struct Unfinished<S> {
    parent: Option<NodeId>,
    path: String,
    stat: S,
    remaining: usize,
}

/// Per-walk state; created fresh for every invocation.
struct WalkState<S> {
    frontier: VecDeque<FrontierItem>,
    unfinished: HashMap<NodeId, Unfinished<S>>,
    next_id: NodeId,
    fetched: usize,
    emitted: usize,
}

impl<S> WalkState<S> {
    fn new(root: String) -> Self {
        let mut frontier = VecDeque::new();
        frontier.push_back(FrontierItem {
            id: 0,
            parent: None,
            path: root,
        });
        Self {
            frontier,
            unfinished: HashMap::new(),
            next_id: 1,
            fetched: 0,
            emitted: 0,
        }
    }

    fn pop(&mut self, order: TraversalOrder) -> Option<FrontierItem> {
        match order {
            TraversalOrder::DepthFirst => self.frontier.pop_back(),
            TraversalOrder::BreadthFirst => self.frontier.pop_front(),
        }
    }

    /// Queue the children of `parent` so that, with a concurrency of one,
    /// they are fetched in the order the store returned them.
    fn push_children(&mut self, order: TraversalOrder, parent: &FrontierItem, names: Vec<String>) {
        let first_id = self.next_id;
        self.next_id += names.len();
        let children = names
            .into_iter()
            .enumerate()
            .map(|(offset, name)| FrontierItem {
                id: first_id + offset,
                parent: Some(parent.id),
                path: join_path(&parent.path, &name),
            });
        match order {
            TraversalOrder::DepthFirst => {
                let children: Vec<_> = children.collect();
                self.frontier.extend(children.into_iter().rev());
            }
            TraversalOrder::BreadthFirst => self.frontier.extend(children),
        }
    }
}

/// Drives one walk: discovers the tree through the fetcher and sends every
/// qualifying node to `tx`.
pub(crate) struct Engine<F> {
    fetcher: Arc<F>,
    root: String,
    options: WalkOptions,
}

impl<F: ChildrenFetch> Engine<F> {
    pub(crate) fn new(fetcher: Arc<F>, root: String, options: WalkOptions) -> Self {
        Self {
            fetcher,
            root,
            options,
        }
    }

    /// Run the walk to completion.  Returns the first error observed; fetches
    /// still in flight at that point are drained and their results dropped.
    pub(crate) async fn run(
        &self,
        ctx: &Context,
        tx: &mpsc::Sender<WalkResult<F::Stat>>,
    ) -> Result<(), WalkError> {
        self.run_with(ctx, tx, |_| {}).await
    }

    /// Like [`Engine::run`], calling `on_error` as soon as the walk fails,
    /// before the in-flight fetches are drained.
    pub(crate) async fn run_with(
        &self,
        ctx: &Context,
        tx: &mpsc::Sender<WalkResult<F::Stat>>,
        on_error: impl FnOnce(&WalkError),
    ) -> Result<(), WalkError> {
        debug!(
            root = %self.root,
            order = ?self.options.order,
            include_root = self.options.include_root,
            leaves_only = self.options.leaves_only,
            concurrency = self.options.concurrency,
            "starting walk"
        );
        let mut state = WalkState::new(self.root.clone());
        let mut in_flight = FuturesUnordered::new();

        let result = self.drive(ctx, tx, &mut state, &mut in_flight).await;
        match &result {
            Ok(()) => debug!(
                root = %self.root,
                fetched = state.fetched,
                emitted = state.emitted,
                "walk complete"
            ),
            Err(err) => {
                debug!(
                    root = %self.root,
                    fetched = state.fetched,
                    emitted = state.emitted,
                    in_flight = in_flight.len(),
                    error = %err,
                    "walk aborted"
                );
                on_error(err);
                while in_flight.next().await.is_some() {}
            }
        }
        result
    }

    async fn drive<'a>(
        &'a self,
        ctx: &'a Context,
        tx: &mpsc::Sender<WalkResult<F::Stat>>,
        state: &mut WalkState<F::Stat>,
        in_flight: &mut FuturesUnordered<FetchFuture<'a, F::Stat>>,
    ) -> Result<(), WalkError> {
        let order = self.options.order;
        let concurrency = self.options.concurrency.max(1);

        loop {
            while in_flight.len() < concurrency {
                let Some(item) = state.pop(order) else {
                    break;
                };
                if let Some(err) = ctx.err() {
                    return Err(err.into());
                }
                trace!(path = %item.path, "fetching children");
                in_flight.push(self.fetch(ctx, item));
            }

            if in_flight.is_empty() {
                return Ok(());
            }

            let (item, outcome) = tokio::select! {
                biased;
                err = ctx.done() => return Err(err.into()),
                Some(done) = in_flight.next() => done,
                else => return Err(programming_error!("no fetch in flight for {}", self.root)),
            };
            state.fetched += 1;

            let children = outcome.map_err(|source| match source.downcast::<ContextError>() {
                Ok(err) => WalkError::Aborted(err),
                Err(source) => WalkError::Fetch {
                    path: item.path.clone(),
                    source,
                },
            })?;
            self.complete(ctx, tx, state, item, children).await?;
        }
    }

    fn fetch<'a>(&'a self, ctx: &'a Context, item: FrontierItem) -> FetchFuture<'a, F::Stat> {
        let fetcher = &self.fetcher;
        async move {
            let outcome = fetcher.children(ctx, &item.path).await;
            (item, outcome)
        }
        .boxed()
    }

    async fn complete(
        &self,
        ctx: &Context,
        tx: &mpsc::Sender<WalkResult<F::Stat>>,
        state: &mut WalkState<F::Stat>,
        item: FrontierItem,
        children: Children<F::Stat>,
    ) -> Result<(), WalkError> {
        let order = self.options.order;
        let Children { names, stat } = children;
        let is_leaf = names.is_empty();

        match order {
            TraversalOrder::BreadthFirst => {
                state.push_children(order, &item, names);
                let is_root = item.is_root();
                self.emit(ctx, tx, state, is_root, is_leaf, item.path, stat)
                    .await
            }
            TraversalOrder::DepthFirst if !is_leaf => {
                state.unfinished.insert(
                    item.id,
                    Unfinished {
                        parent: item.parent,
                        path: item.path.clone(),
                        stat,
                        remaining: names.len(),
                    },
                );
                state.push_children(order, &item, names);
                Ok(())
            }
            TraversalOrder::DepthFirst => {
                let is_root = item.is_root();
                self.emit(ctx, tx, state, is_root, true, item.path, stat)
                    .await?;

                // Finishing a leaf may finish its ancestors in turn.
                let mut parent = item.parent;
                while let Some(id) = parent {
                    let Entry::Occupied(mut entry) = state.unfinished.entry(id) else {
                        return Err(programming_error!("unknown parent node {}", id));
                    };
                    entry.get_mut().remaining -= 1;
                    if entry.get().remaining > 0 {
                        break;
                    }
                    let node = entry.remove();
                    parent = node.parent;
                    self.emit(ctx, tx, state, node.parent.is_none(), false, node.path, node.stat)
                        .await?;
                }
                Ok(())
            }
        }
    }

    fn wants(&self, is_root: bool, is_leaf: bool) -> bool {
        (self.options.include_root || !is_root) && (!self.options.leaves_only || is_leaf)
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit(
        &self,
        ctx: &Context,
        tx: &mpsc::Sender<WalkResult<F::Stat>>,
        state: &mut WalkState<F::Stat>,
        is_root: bool,
        is_leaf: bool,
        path: String,
        stat: F::Stat,
    ) -> Result<(), WalkError> {
        if !self.wants(is_root, is_leaf) {
            return Ok(());
        }
        tokio::select! {
            biased;
            err = ctx.done() => return Err(err.into()),
            sent = tx.send(Ok(WalkEntry { path, stat })) => sent.map_err(|_| WalkError::Closed)?,
        }
        state.emitted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn join_path_uses_single_separator() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(join_path("/a/", "b"), "/a/b");
    }

    #[test]
    fn depth_first_frontier_pops_first_child() {
        let mut state = WalkState::<()>::new("/r".to_owned());
        let root = state.pop(TraversalOrder::DepthFirst).unwrap();
        state.push_children(
            TraversalOrder::DepthFirst,
            &root,
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
        );
        let paths: Vec<_> = std::iter::from_fn(|| state.pop(TraversalOrder::DepthFirst))
            .map(|item| item.path)
            .collect();
        assert_eq!(paths, vec!["/r/a", "/r/b", "/r/c"]);
    }

    #[test]
    fn breadth_first_frontier_is_fifo() {
        let mut state = WalkState::<()>::new("/".to_owned());
        let root = state.pop(TraversalOrder::BreadthFirst).unwrap();
        state.push_children(
            TraversalOrder::BreadthFirst,
            &root,
            vec!["a".to_owned(), "b".to_owned()],
        );
        let a = state.pop(TraversalOrder::BreadthFirst).unwrap();
        state.push_children(TraversalOrder::BreadthFirst, &a, vec!["x".to_owned()]);
        let paths: Vec<_> = std::iter::from_fn(|| state.pop(TraversalOrder::BreadthFirst))
            .map(|item| item.path)
            .collect();
        assert_eq!(paths, vec!["/b", "/a/x"]);
        assert_eq!(state.next_id, 4);
    }
}
