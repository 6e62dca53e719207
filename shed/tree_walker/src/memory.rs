/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is dual-licensed under either the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree or the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree. You may select, at your option, one of the
 * above-listed licenses.
 */

//! An in-memory namespace with ZooKeeper-like creation semantics.

use std::collections::HashMap;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::context::Context;
use crate::fetch::Children;
use crate::fetch::ChildrenFetch;
use crate::stat::Stat;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MemoryTreeError {
    #[error("node does not exist: {path}")]
    NoNode { path: String },
    #[error("node already exists: {path}")]
    NodeExists { path: String },
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("data for {path} is too large: {len} bytes")]
    DataTooLarge { path: String, len: usize },
}

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    stat: Stat,
    children: Vec<String>,
}

/// A namespace held entirely in memory.  Children are listed in the order
/// they were created.
#[derive(Debug)]
pub struct MemoryTree {
    nodes: HashMap<String, Node>,
    last_zxid: i64,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// Create a namespace containing only `/`.
    pub fn new() -> Self {
        let root = Node {
            data: Vec::new(),
            stat: Stat::default(),
            children: Vec::new(),
        };
        Self {
            nodes: HashMap::from([("/".to_owned(), root)]),
            last_zxid: 0,
        }
    }

    /// Create `path` holding `data`.  The parent must already exist.
    pub fn create(&mut self, path: &str, data: &[u8]) -> Result<String, MemoryTreeError> {
        let (parent, name) = split_path(path)?;
        if self.nodes.contains_key(path) {
            return Err(MemoryTreeError::NodeExists {
                path: path.to_owned(),
            });
        }

        let data_length = data_length(path, data.len())?;
        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| MemoryTreeError::NoNode {
                path: parent.to_owned(),
            })?;
        self.last_zxid += 1;
        let zxid = self.last_zxid;
        let now = now_millis();

        parent_node.children.push(name.to_owned());
        parent_node.stat.num_children += 1;
        parent_node.stat.cversion += 1;
        parent_node.stat.pzxid = zxid;

        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            ctime: now,
            mtime: now,
            data_length,
            pzxid: zxid,
            ..Stat::default()
        };
        self.nodes.insert(
            path.to_owned(),
            Node {
                data: data.to_vec(),
                stat,
                children: Vec::new(),
            },
        );
        Ok(path.to_owned())
    }

    pub fn get(&self, path: &str) -> Option<(&[u8], &Stat)> {
        self.nodes
            .get(path)
            .map(|node| (node.data.as_slice(), &node.stat))
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl ChildrenFetch for MemoryTree {
    type Stat = Stat;

    fn children<'a>(
        &'a self,
        ctx: &'a Context,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Children<Stat>, anyhow::Error>> {
        async move {
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }
            let node = self.nodes.get(path).ok_or_else(|| MemoryTreeError::NoNode {
                path: path.to_owned(),
            })?;
            Ok(Children {
                names: node.children.clone(),
                stat: node.stat.clone(),
            })
        }
        .boxed()
    }
}

fn split_path(path: &str) -> Result<(&str, &str), MemoryTreeError> {
    let invalid = |reason| MemoryTreeError::InvalidPath {
        path: path.to_owned(),
        reason,
    };
    if !path.starts_with('/') {
        return Err(invalid("path must be absolute"));
    }
    if path == "/" {
        return Err(invalid("the root always exists"));
    }
    if path.ends_with('/') {
        return Err(invalid("path must not end with '/'"));
    }
    if path
        .split('/')
        .skip(1)
        .any(|component| component.is_empty() || component == "." || component == "..")
    {
        return Err(invalid("empty or relative path component"));
    }
    match path.rsplit_once('/') {
        Some(("", name)) => Ok(("/", name)),
        Some((parent, name)) => Ok((parent, name)),
        None => Err(invalid("path must be absolute")),
    }
}

fn data_length(path: &str, len: usize) -> Result<i32, MemoryTreeError> {
    i32::try_from(len).map_err(|_| MemoryTreeError::DataTooLarge {
        path: path.to_owned(),
        len,
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn create_tracks_children_and_stats() {
        let mut tree = MemoryTree::new();
        assert_eq!(tree.create("/a", b"1234").unwrap(), "/a");
        tree.create("/a/b", b"").unwrap();
        tree.create("/a/c", b"").unwrap();

        let (data, stat) = tree.get("/a").unwrap();
        assert_eq!(data, b"1234");
        assert_eq!(stat.data_length, 4);
        assert_eq!(stat.num_children, 2);
        assert_eq!(stat.cversion, 2);
        assert!(!stat.is_ephemeral());

        let (_, c) = tree.get("/a/c").unwrap();
        assert_eq!(stat.pzxid, c.czxid);
        assert_eq!(tree.len(), 4);
        assert!(!tree.is_empty());
    }

    #[test]
    fn create_rejects_bad_paths() {
        let mut tree = MemoryTree::new();
        assert_matches!(tree.create("a", b""), Err(MemoryTreeError::InvalidPath { .. }));
        assert_matches!(tree.create("/", b""), Err(MemoryTreeError::InvalidPath { .. }));
        assert_matches!(tree.create("/a/", b""), Err(MemoryTreeError::InvalidPath { .. }));
        assert_matches!(tree.create("/a//b", b""), Err(MemoryTreeError::InvalidPath { .. }));
        assert_matches!(tree.create("/a/..", b""), Err(MemoryTreeError::InvalidPath { .. }));
        assert_eq!(
            tree.create("/a/b", b""),
            Err(MemoryTreeError::NoNode {
                path: "/a".to_owned()
            })
        );
        tree.create("/a", b"").unwrap();
        assert_eq!(
            tree.create("/a", b""),
            Err(MemoryTreeError::NodeExists {
                path: "/a".to_owned()
            })
        );
    }

    #[test]
    fn data_length_must_fit_stat() {
        assert_eq!(data_length("/a", 4), Ok(4));
        assert_eq!(data_length("/a", i32::MAX as usize), Ok(i32::MAX));
        assert_eq!(
            data_length("/a", i32::MAX as usize + 1),
            Err(MemoryTreeError::DataTooLarge {
                path: "/a".to_owned(),
                len: i32::MAX as usize + 1,
            })
        );
    }

    #[tokio::test]
    async fn children_in_creation_order() {
        let mut tree = MemoryTree::new();
        for path in ["/z", "/a", "/m"] {
            tree.create(path, b"").unwrap();
        }
        let ctx = Context::background();
        let children = tree.children(&ctx, "/").await.unwrap();
        assert_eq!(children.names, vec!["z", "a", "m"]);
        assert_eq!(children.stat.num_children, 3);
    }

    #[tokio::test]
    async fn children_errors() {
        let tree = MemoryTree::new();
        let ctx = Context::background();
        let err = tree.children(&ctx, "/missing").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<MemoryTreeError>(),
            Some(&MemoryTreeError::NoNode {
                path: "/missing".to_owned()
            })
        );

        ctx.cancel();
        let err = tree.children(&ctx, "/").await.unwrap_err();
        assert_eq!(err.to_string(), "context canceled");
    }
}
