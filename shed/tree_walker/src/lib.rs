/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! Bounded traversal of hierarchical coordination-service namespaces.
//!
//! A ZooKeeper-style store only reveals the children of a node one remote
//! call at a time.  This crate discovers such a tree lazily through a
//! [`ChildrenFetch`] implementation, limiting the number of fetches in
//! flight, and reports every qualifying node exactly once.
//!
//! Use [`TreeWalker::depth_first`] to visit nodes in post-order (every node
//! after all of its descendants), or [`TreeWalker::breadth_first`] to visit
//! them level by level.  With a concurrency of one the order is fully
//! deterministic; with more, only the set of visited nodes is.
//!
//! Results are delivered either to a visitor closure via
//! [`TreeWalker::walk`], or through a bounded channel via
//! [`TreeWalker::walk_chan`] and [`TreeWalker::walk_stream`].
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use tree_walker::{Context, MemoryTree, TreeWalker};
//!
//! let mut tree = MemoryTree::new();
//! tree.create("/app", b"")?;
//! tree.create("/app/config", b"{}")?;
//!
//! let mut visited = Vec::new();
//! TreeWalker::new(tree, "/app")
//!     .depth_first()
//!     .walk(&Context::background(), |_ctx, path, _stat| {
//!         visited.push(path.to_owned());
//!         Ok(())
//!     })
//!     .await?;
//! assert_eq!(visited, vec!["/app/config", "/app"]);
//! # Ok::<(), anyhow::Error>(()) }).unwrap();
//! ```

#[macro_use]
mod error;
pub use error::WalkError;

mod context;
pub use context::Context;
pub use context::ContextError;

mod fetch;
pub use fetch::Children;
pub use fetch::ChildrenFetch;

mod stat;
pub use stat::Stat;

mod memory;
pub use memory::MemoryTree;
pub use memory::MemoryTreeError;

mod engine;
pub use engine::join_path;

mod walker;
pub use walker::TraversalOrder;
pub use walker::TreeWalker;
pub use walker::WalkEntry;
pub use walker::WalkOptions;
pub use walker::WalkResult;
