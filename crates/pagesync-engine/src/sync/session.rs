use std::collections::VecDeque;

use log::{debug, info, warn};
use pagesync_config::{Config, ConfirmPolicy};
use tokio_util::sync::CancellationToken;

use super::executor::{Executor, SyncReport};
use super::plan::{Planner, SyncPlan};
use crate::blocks::{BlockId, BlockIndex, BlockTree, Registry};
use crate::buffer::EditorBuffer;
use crate::cache::{FileCache, PageCache, content_hash};
use crate::error::{Result, SyncError};
use crate::mapping::{OrphanDetector, PositionTracker, RefreshReport};
use crate::remote::{Page, RemoteStore};

/// Rows above the first block: the title line and a blank separator.
pub const HEADER_ROWS: usize = 2;

/// How a call to [`SyncSession::sync`] ended.
#[derive(Debug)]
pub enum SyncOutcome {
    NoChanges,
    /// The plan needed confirmation and did not get it.
    Declined(SyncPlan),
    Applied(SyncReport),
}

/// Options for opening a [`SyncSession`].
pub struct SessionBuilder {
    registry: Registry,
    cache: Option<Box<dyn PageCache>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            registry: Registry::default(),
            cache: None,
        }
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn cache(mut self, cache: impl PageCache + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    /// Fetches the page and its blocks, renders them into `buffer` and binds
    /// a marker to every block.
    pub async fn open<B: EditorBuffer>(
        self,
        remote: &dyn RemoteStore,
        page_id: &BlockId,
        mut buffer: B,
        config: &Config,
    ) -> Result<SyncSession<B>> {
        let page = remote.get_page(page_id).await?;
        let mut tree = load_tree(remote, &self.registry, page_id).await?;
        let mut tracker = PositionTracker::new(config.indent_size);

        let mut lines = vec![format!("# {}", page.title), String::new()];
        lines.extend(tracker.render(&tree, &self.registry));
        let line_count = buffer.line_count();
        buffer.set_lines(0, line_count, &lines);
        tracker.bind(&mut tree, &self.registry, &mut buffer, HEADER_ROWS);
        info!("opened page {} with {} blocks", page.id, tree.len());

        let mut session = SyncSession {
            page,
            tree,
            tracker,
            registry: self.registry,
            buffer,
            cache: self.cache,
            policy: config.confirm_sync,
            remote_changed: false,
        };
        session.remote_changed = session.check_cache(&lines);
        Ok(session)
    }
}

/// Breadth-first fetch of the block tree under `page_id`.
async fn load_tree(
    remote: &dyn RemoteStore,
    registry: &Registry,
    page_id: &BlockId,
) -> Result<BlockTree> {
    let mut tree = BlockTree::new();
    let mut queue: VecDeque<(BlockId, Option<BlockIndex>)> = VecDeque::new();
    queue.push_back((page_id.clone(), None));

    while let Some((parent_id, parent)) = queue.pop_front() {
        for raw in remote.get_children(&parent_id).await? {
            let block = registry.deserialize(raw)?;
            let descend = block.has_children && block.supports_children();
            let id = block.id.clone();
            let index = match parent {
                None => tree.push_root(block),
                Some(p) => tree.add_child(p, block, None).ok_or_else(|| {
                    SyncError::MalformedResponse(format!("parent of {id} vanished during load"))
                })?,
            };
            if descend {
                queue.push_back((id, Some(index)));
            }
        }
    }
    debug!("loaded {} blocks under {page_id}", tree.len());
    Ok(tree)
}

/// Everything needed to keep one buffer in sync with one page.
pub struct SyncSession<B> {
    page: Page,
    tree: BlockTree,
    tracker: PositionTracker,
    registry: Registry,
    buffer: B,
    cache: Option<Box<dyn PageCache>>,
    policy: ConfirmPolicy,
    remote_changed: bool,
}

impl<B: EditorBuffer> SyncSession<B> {
    /// Opens a session with the default registry, caching under
    /// `config.cache_dir` when it is set.
    pub async fn open(
        remote: &dyn RemoteStore,
        page_id: &BlockId,
        buffer: B,
        config: &Config,
    ) -> Result<Self> {
        let mut builder = SessionBuilder::new();
        if let Some(dir) = &config.cache_dir {
            builder = builder.cache(FileCache::new(dir));
        }
        builder.open(remote, page_id, buffer, config).await
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn tree(&self) -> &BlockTree {
        &self.tree
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Edits made through this reference are picked up by the next
    /// [`prepare`](Self::prepare).
    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    /// Whether the page rendered differently from the cached copy at open.
    pub fn remote_changed(&self) -> bool {
        self.remote_changed
    }

    /// Recomputes spans and reads every surviving block's text back from the
    /// buffer.
    pub fn refresh(&mut self) -> RefreshReport {
        let report = self.tracker.refresh(&mut self.tree, &mut self.buffer);
        for index in self.tree.indices() {
            let Some(block) = self.tree.get(index).filter(|b| b.span.is_some()) else {
                continue;
            };
            let lines = self.tracker.lines_of(block, &self.buffer);
            if let Some(block) = self.tree.get_mut(index) {
                self.registry.update_from_lines(block, &lines);
            }
        }
        debug!(
            "refresh: {} intact, {} moved, {} deleted",
            report.intact.len(),
            report.moved.len(),
            report.deleted.len()
        );
        report
    }

    pub fn prepare(&mut self) -> SyncPlan {
        self.refresh();
        let orphans = OrphanDetector::new(&self.tree, self.tracker.indent_size())
            .detect(&self.buffer, HEADER_ROWS);
        Planner::new(&self.tree, &self.registry, self.policy).plan(orphans)
    }

    pub async fn execute(
        &mut self,
        remote: &dyn RemoteStore,
        plan: SyncPlan,
        cancel: &CancellationToken,
    ) -> SyncReport {
        let mut executor = Executor {
            page_id: &self.page.id,
            tree: &mut self.tree,
            tracker: &mut self.tracker,
            registry: &self.registry,
            buffer: &mut self.buffer,
        };
        let report = executor.execute(remote, plan, cancel).await;
        if report.is_success() {
            self.save_content();
        }
        report
    }

    /// Prepares a plan, asks `confirm` when the policy requires it, and
    /// executes.
    pub async fn sync<F>(
        &mut self,
        remote: &dyn RemoteStore,
        cancel: &CancellationToken,
        confirm: F,
    ) -> SyncOutcome
    where
        F: FnOnce(&SyncPlan) -> bool,
    {
        let plan = self.prepare();
        if plan.is_empty() && plan.unmatched.is_empty() {
            debug!("nothing to sync on page {}", self.page.id);
            return SyncOutcome::NoChanges;
        }
        if plan.needs_confirmation && !confirm(&plan) {
            info!("sync of page {} declined", self.page.id);
            return SyncOutcome::Declined(plan);
        }
        SyncOutcome::Applied(self.execute(remote, plan, cancel).await)
    }

    fn current_lines(&self) -> Vec<String> {
        self.buffer.get_lines(0, self.buffer.line_count())
    }

    /// Stores page and content, returning whether the content differs from
    /// the previous cached copy. Cache failures only warn.
    fn check_cache(&self, lines: &[String]) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        if let Err(e) = cache.save_page(&self.page) {
            warn!("failed to cache page {}: {e}", self.page.id);
        }
        let changed = match cache.get_content(&self.page.id) {
            Ok(Some(cached)) => cached.hash != content_hash(lines),
            Ok(None) => false,
            Err(e) => {
                warn!("ignoring unreadable cache entry for {}: {e}", self.page.id);
                false
            }
        };
        if changed {
            info!("page {} changed remotely since it was last cached", self.page.id);
        }
        self.save_content();
        changed
    }

    fn save_content(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save_content(&self.page.id, &self.current_lines()) {
                warn!("failed to cache content of {}: {e}", self.page.id);
            }
        }
    }
}
