//! Recursive descendant listing over repeated child listings.
//!
//! Every level is listed once; the children of a level are resolved
//! concurrently and the level completes when all of them have. Absolute
//! paths already visited during the current walk are skipped, and a child
//! whose name is empty or `/` fails the walk with [`Error::PathRecursion`].

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::trace;

use crate::error::{Error, Result};
use crate::path::{join_path, remove_trailing_slash, sanitize_path};

/// Something that can list the immediate children of a virtual path.
#[async_trait]
pub trait ChildLister: Sync {
    async fn list_children(&self, path: &str) -> Result<Vec<String>>;
}

/// All paths below `root`, relative to it.
///
/// Immediate children come first, followed by each child's subtree in
/// child-list order.
pub async fn list_descendants<L>(lister: &L, root: &str) -> Result<Vec<String>>
where
    L: ChildLister + ?Sized,
{
    let sanitized = sanitize_path(root);
    let root = match remove_trailing_slash(&sanitized) {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    };
    let seen = Mutex::new(HashSet::from([root.clone()]));
    resolve(lister, root, String::new(), &seen).await
}

fn first_visit(seen: &Mutex<HashSet<String>>, absolute: &str) -> bool {
    seen.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(absolute.to_string())
}

fn resolve<'a, L>(
    lister: &'a L,
    dir: String,
    prefix: String,
    seen: &'a Mutex<HashSet<String>>,
) -> BoxFuture<'a, Result<Vec<String>>>
where
    L: ChildLister + ?Sized,
{
    async move {
        let children = lister.list_children(&dir).await?;

        let mut fresh: Vec<(String, String)> = Vec::with_capacity(children.len());
        for child in &children {
            let name = child.trim_matches('/');
            if name.is_empty() {
                return Err(Error::PathRecursion(format!("{dir}/{child}")));
            }
            let absolute = remove_trailing_slash(&join_path(&dir, name)).to_string();
            if !first_visit(seen, &absolute) {
                continue;
            }
            let relative = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            };
            fresh.push((absolute, relative));
        }
        trace!(dir = %dir, children = fresh.len(), "descending");

        let branches = fresh
            .iter()
            .map(|(absolute, relative)| resolve(lister, absolute.clone(), relative.clone(), seen));
        let nested = join_all(branches).await;

        let mut out: Vec<String> = fresh.into_iter().map(|(_, relative)| relative).collect();
        for subtree in nested {
            out.extend(subtree?);
        }
        Ok(out)
    }
    .boxed()
}
