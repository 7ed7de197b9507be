//! Applies a finished generation to the host tree.

use std::rc::Rc;

use crate::error::FiberError;
use crate::fiber::{EffectTag, FiberId};
use crate::hooks::{dispose_cells, flush_effects, queue_effects};
use crate::host::HostAdapter;
use crate::scheduler::Scheduler;
use crate::NodeId;

/// One fiber touched by a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitEntry {
    pub tag: EffectTag,
    pub label: String,
    pub node: Option<NodeId>,
}

/// What the last commit did, in the order it did it. Deletions come first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub generation: u64,
    pub entries: Vec<CommitEntry>,
}

impl CommitSummary {
    pub fn count(&self, tag: EffectTag) -> usize {
        self.entries.iter().filter(|e| e.tag == tag).count()
    }

    pub fn labels(&self, tag: EffectTag) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.tag == tag)
            .map(|e| e.label.as_str())
            .collect()
    }
}

impl<A: HostAdapter> Scheduler<A> {
    /// Applies the finished generation.
    ///
    /// On an adapter error the fiber tree is brought back in line with what
    /// the host actually holds: a failed deletion keeps the committed tree
    /// minus whatever was already removed, and a failure after the deletions
    /// commits the work-in-progress tree without the fibers the host never
    /// received.
    pub(crate) fn commit_root(&mut self) -> Result<(), FiberError> {
        let Some(root) = self.wip_root else {
            return Ok(());
        };
        let mut summary = CommitSummary {
            generation: self.generation,
            entries: Vec::new(),
        };

        let deletions = std::mem::take(&mut self.deletions);
        for fiber in deletions {
            if let Err(err) = self.commit_deletion(fiber, &mut summary) {
                tracing::error!(%err, generation = self.generation, "commit aborted during deletions");
                self.discard_work_in_progress();
                return Err(err);
            }
        }

        for child in self.fibers.children(root) {
            if let Err(err) = self.commit_work(child, &mut summary) {
                tracing::error!(
                    %err,
                    generation = self.generation,
                    "commit aborted, keeping the mutations already applied"
                );
                self.prune_unapplied(root);
                self.finish_commit(root, summary);
                return Err(err);
            }
        }
        self.finish_commit(root, summary);
        Ok(())
    }

    /// Removes `fiber` from the committed tree. Host roots are removed one at
    /// a time and each is dropped from the tree as soon as the host lets it
    /// go, so a failure leaves exactly the still-attached part behind.
    fn commit_deletion(
        &mut self,
        fiber: FiberId,
        summary: &mut CommitSummary,
    ) -> Result<(), FiberError> {
        let parent = self
            .fibers
            .host_parent(fiber)
            .ok_or_else(|| FiberError::MissingHostParent {
                fiber: self.fibers[fiber].label(),
            })?;
        let (label, node) = {
            let deleted = &self.fibers[fiber];
            (deleted.label(), deleted.state_node)
        };
        self.dispose_subtree(fiber);
        for host in self.fibers.host_fibers(fiber) {
            if let Some(node) = self.fibers[host].state_node {
                self.adapter.remove_node(parent, node)?;
            }
            self.fibers.detach(host);
            self.fibers.remove_subtree(host);
        }
        if self.fibers.contains(fiber) {
            self.fibers.detach(fiber);
            self.fibers.remove_subtree(fiber);
        }
        summary.entries.push(CommitEntry {
            tag: EffectTag::Delete,
            label,
            node,
        });
        Ok(())
    }

    /// Cleans up effects and clears refs for `fiber` and its descendants.
    fn dispose_subtree(&self, fiber: FiberId) {
        let Some(current) = self.fibers.get(fiber) else {
            return;
        };
        dispose_cells(&current.hooks);
        if let Some(node_ref) = current.node_ref.clone() {
            node_ref.resolve(None);
        }
        for child in self.fibers.children(fiber) {
            self.dispose_subtree(child);
        }
    }

    /// Commits `id` and its subtree in pre-order. A fiber's tag is cleared
    /// once its own mutation has reached the host.
    fn commit_work(&mut self, id: FiberId, summary: &mut CommitSummary) -> Result<(), FiberError> {
        let (tag, node, alternate) = {
            let fiber = &self.fibers[id];
            (fiber.effect_tag, fiber.state_node, fiber.alternate)
        };

        match (tag, node) {
            (EffectTag::Placement, Some(node)) => {
                let parent = self.fibers.host_parent(id).ok_or_else(|| {
                    FiberError::MissingHostParent {
                        fiber: self.fibers[id].label(),
                    }
                })?;
                let anchor = self.host_anchor(id);
                self.adapter.insert_node(parent, node, anchor)?;
            }
            (EffectTag::Update, Some(node)) => {
                if let Some(alternate) = alternate {
                    let old = self.fibers[alternate].props.clone();
                    let new = self.fibers[id].props.clone();
                    if !Rc::ptr_eq(&old, &new) {
                        self.adapter.patch_node(node, &old, &new)?;
                    }
                }
            }
            _ => {}
        }
        if tag != EffectTag::None {
            let fiber = &mut self.fibers[id];
            fiber.effect_tag = EffectTag::None;
            summary.entries.push(CommitEntry {
                tag,
                label: fiber.label(),
                node,
            });
        }

        for child in self.fibers.children(id) {
            self.commit_work(child, summary)?;
        }

        if self.fibers[id].kind.is_component() {
            let effects = queue_effects(&self.fibers[id].hooks);
            if !effects.is_empty() {
                self.runtime.defer(move || flush_effects(&effects));
            }
        }

        self.commit_ref(id, alternate);
        Ok(())
    }

    /// Drops placements that never reached the host and points unapplied
    /// updates back at the props the host still shows.
    fn prune_unapplied(&mut self, id: FiberId) {
        for child in self.fibers.children(id) {
            match self.fibers[child].effect_tag {
                EffectTag::Placement => {
                    self.fibers.detach(child);
                    self.fibers.remove_subtree(child);
                }
                EffectTag::Update => {
                    if let Some(alternate) = self.fibers[child].alternate {
                        let shown = self.fibers[alternate].props.clone();
                        self.fibers[child].props = shown;
                    }
                    self.prune_unapplied(child);
                }
                _ => self.prune_unapplied(child),
            }
        }
    }

    fn commit_ref(&self, id: FiberId, alternate: Option<FiberId>) {
        let fiber = &self.fibers[id];
        let previous = alternate.and_then(|alt| self.fibers[alt].node_ref.clone());
        if let Some(previous) = previous {
            if fiber.node_ref.as_ref() != Some(&previous) {
                previous.resolve(None);
            }
        }
        if let Some(node_ref) = fiber.node_ref.clone() {
            let target = fiber
                .state_node
                .or_else(|| self.fibers.host_nodes(id).first().copied());
            node_ref.resolve(target);
        }
    }

    /// Host node that `id` must be inserted before: the first node of a later
    /// sibling that is already attached. Component parents own no node, so
    /// the search continues after them.
    fn host_anchor(&self, id: FiberId) -> Option<NodeId> {
        let mut cursor = id;
        loop {
            let mut sibling = self.fibers[cursor].sibling;
            while let Some(candidate) = sibling {
                if let Some(node) = self.first_attached_node(candidate) {
                    return Some(node);
                }
                sibling = self.fibers[candidate].sibling;
            }
            let parent = self.fibers[cursor].parent?;
            if self.fibers[parent].state_node.is_some() {
                return None;
            }
            cursor = parent;
        }
    }

    fn first_attached_node(&self, id: FiberId) -> Option<NodeId> {
        let fiber = &self.fibers[id];
        if fiber.effect_tag != EffectTag::Update {
            return None;
        }
        if let Some(node) = fiber.state_node {
            return Some(node);
        }
        self.fibers
            .children(id)
            .into_iter()
            .find_map(|child| self.first_attached_node(child))
    }

    fn finish_commit(&mut self, root: FiberId, summary: CommitSummary) {
        let generation = self.generation;
        self.fibers.retain(|_, fiber| fiber.generation == generation);
        for (_, fiber) in self.fibers.iter_mut() {
            fiber.alternate = None;
            fiber.effect_tag = EffectTag::None;
        }
        self.committed_generation = generation;
        self.current_root = Some(root);
        self.wip_root = None;
        tracing::debug!(
            generation,
            placed = summary.count(EffectTag::Placement),
            updated = summary.count(EffectTag::Update),
            deleted = summary.count(EffectTag::Delete),
            "generation committed"
        );
        self.last_commit = Some(summary);
    }
}
