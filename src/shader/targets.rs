//! Off-screen render targets for every chain stage but the last.

use super::GraphicsContext;
use crate::error::Result;
use crate::frame::Resolution;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct RenderTargetManager<T> {
    size: Resolution,
    targets: HashMap<String, T>,
    /// Running order seen by the last rebuild.
    order: Vec<String>,
}

impl<T> RenderTargetManager<T> {
    pub fn new(size: Resolution) -> Self {
        Self {
            size,
            targets: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn size(&self) -> Resolution {
        self.size
    }

    /// Makes the pool hold exactly one target per identifier except the last.
    ///
    /// Targets of identifiers that stay in the chain are reused; the rest are
    /// released or allocated.
    pub fn rebuild<G>(&mut self, gfx: &mut G, order: &[&str]) -> Result<()>
    where
        G: GraphicsContext<Target = T>,
    {
        self.order = order.iter().map(|id| id.to_string()).collect();
        let wanted = order.split_last().map(|(_, rest)| rest).unwrap_or_default();

        let stale: Vec<String> = self
            .targets
            .keys()
            .filter(|id| !wanted.contains(&id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if let Some(target) = self.targets.remove(&id) {
                gfx.release_target(target);
                debug!("Released render target '{}'", id);
            }
        }

        for id in wanted {
            if self.targets.contains_key(*id) {
                continue;
            }
            let target = gfx.create_target(id, self.size)?;
            info!(
                "Allocated render target '{}' ({}x{})",
                id, self.size.width, self.size.height
            );
            self.targets.insert(id.to_string(), target);
        }

        Ok(())
    }

    /// Whether every stage but the last of the recorded order has a target.
    ///
    /// False after a rebuild that failed partway.
    pub fn is_complete(&self) -> bool {
        self.targets.len() == self.order.len().saturating_sub(1)
    }

    /// Retries the last rebuild if it left the pool short.
    pub fn ensure_complete<G>(&mut self, gfx: &mut G) -> Result<()>
    where
        G: GraphicsContext<Target = T>,
    {
        if self.is_complete() {
            return Ok(());
        }
        debug!("Render target pool incomplete, rebuilding for {:?}", self.order);
        let order = std::mem::take(&mut self.order);
        let ids: Vec<&str> = order.iter().map(String::as_str).collect();
        self.rebuild(gfx, &ids)
    }

    /// Reallocates every target at a new size.
    pub fn resize<G>(&mut self, gfx: &mut G, size: Resolution) -> Result<()>
    where
        G: GraphicsContext<Target = T>,
    {
        if size == self.size {
            return Ok(());
        }
        self.size = size;
        self.release_all(gfx);

        let order = std::mem::take(&mut self.order);
        let ids: Vec<&str> = order.iter().map(String::as_str).collect();
        self.rebuild(gfx, &ids)
    }

    pub fn release_all<G>(&mut self, gfx: &mut G)
    where
        G: GraphicsContext<Target = T>,
    {
        for (_, target) in self.targets.drain() {
            gfx.release_target(target);
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&T> {
        self.targets.get(identifier)
    }

    /// Identifiers with a live target, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.targets.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
