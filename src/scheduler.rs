//! Effect lifecycle: future → running → past, keyed by driving time.
//!
//! The scheduler knows nothing about the GPU. Every transition that creates or
//! tears down resources is reported through [`TransitionHooks`]; see
//! [`crate::pipeline::EffectPipeline`] for the implementation that owns the
//! programs and render targets.

use crate::effect::Effect;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

/// Resource side effects of lifecycle transitions.
pub trait TransitionHooks {
    /// An effect is being added. Failing aborts the add.
    fn register(&mut self, effect: &Effect) -> Result<()>;

    /// The effect left future or running and no longer needs its program.
    fn release(&mut self, identifier: &str);

    /// Running set membership changed; `running` is in render order.
    fn running_changed(&mut self, running: &[RunningEffect]) -> Result<()>;
}

/// An effect in the running set, stamped with when it activated.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningEffect {
    pub effect: Effect,
    /// Position in activation order; larger activated later.
    pub activation: u64,
}

impl RunningEffect {
    pub fn identifier(&self) -> &str {
        &self.effect.identifier
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    Future,
    Running,
    Past,
}

/// Identifiers that changed state during one `advance` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transitions {
    pub activated: Vec<String>,
    pub expired: Vec<String>,
}

impl Transitions {
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.expired.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct EffectScheduler {
    /// Ascending by start time, stable on ties.
    future: VecDeque<Effect>,
    /// Ascending by activation.
    running: Vec<RunningEffect>,
    past: BTreeMap<String, Effect>,
    next_activation: u64,
    last_time: Option<f64>,
}

fn keep_first(slot: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        if slot.is_none() {
            *slot = Some(e);
        } else {
            warn!("Suppressed follow-up transition error: {}", e);
        }
    }
}

impl EffectScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an effect and queues it by start time.
    pub fn add_effect(&mut self, effect: Effect, hooks: &mut impl TransitionHooks) -> Result<()> {
        effect.validate()?;
        if self.contains(&effect.identifier) {
            return Err(Error::DuplicateIdentifier {
                id: effect.identifier,
            });
        }

        hooks.register(&effect)?;

        let index = self.future.partition_point(|queued| queued.start_time <= effect.start_time);
        debug!(
            "Queued effect '{}' ({}) at {}s",
            effect.identifier,
            effect.shader_name(),
            effect.start_time
        );
        self.future.insert(index, effect);
        Ok(())
    }

    /// Moves effects between partitions for driving time `now`.
    ///
    /// Activations run before expiries, so an effect that starts and ends
    /// within the same call is still reported as running once.
    pub fn advance(&mut self, now: f64, hooks: &mut impl TransitionHooks) -> Result<Transitions> {
        if let Some(previous) = self.last_time {
            if now.is_nan() || now < previous {
                return Err(Error::NonMonotonicTime { previous, current: now });
            }
        } else if now.is_nan() {
            return Err(Error::NonMonotonicTime {
                previous: f64::NEG_INFINITY,
                current: now,
            });
        }
        self.last_time = Some(now);

        let mut transitions = Transitions::default();
        let mut failure = None;

        while self.future.front().is_some_and(|effect| effect.has_started_at(now)) {
            let Some(effect) = self.future.pop_front() else {
                break;
            };
            debug!("Effect '{}' started at {}s", effect.identifier, now);
            transitions.activated.push(effect.identifier.clone());

            let activation = self.next_activation;
            self.next_activation += 1;
            self.running.push(RunningEffect { effect, activation });
            keep_first(&mut failure, hooks.running_changed(&self.running));
        }

        let mut index = 0;
        while index < self.running.len() {
            if !self.running[index].effect.has_expired_at(now) {
                index += 1;
                continue;
            }
            let finished = self.running.remove(index).effect;
            debug!("Effect '{}' ended at {}s", finished.identifier, now);
            transitions.expired.push(finished.identifier.clone());

            hooks.release(&finished.identifier);
            keep_first(&mut failure, hooks.running_changed(&self.running));
            self.past.insert(finished.identifier.clone(), finished);
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(transitions),
        }
    }

    /// Removes an effect from whichever partition holds it.
    ///
    /// Returns `false` if the identifier is unknown. The removal stands even
    /// when rebuilding the running set fails; that failure is only logged.
    pub fn remove_effect(&mut self, identifier: &str, hooks: &mut impl TransitionHooks) -> Result<bool> {
        if let Some(index) = self.future.iter().position(|e| e.identifier == identifier) {
            self.future.remove(index);
            hooks.release(identifier);
            debug!("Removed future effect '{}'", identifier);
            return Ok(true);
        }

        if let Some(index) = self.running.iter().position(|r| r.identifier() == identifier) {
            self.running.remove(index);
            hooks.release(identifier);
            debug!("Removed running effect '{}'", identifier);
            if let Err(e) = hooks.running_changed(&self.running) {
                warn!("Running set rebuild after removing '{}' failed: {}", identifier, e);
            }
            return Ok(true);
        }

        Ok(self.past.remove(identifier).is_some())
    }

    /// Drops every effect and releases their resources.
    pub fn clear(&mut self, hooks: &mut impl TransitionHooks) -> Result<()> {
        for effect in self.future.drain(..) {
            hooks.release(&effect.identifier);
        }
        for entry in self.running.drain(..) {
            hooks.release(&entry.effect.identifier);
        }
        self.past.clear();
        debug!("Cleared all effects");
        hooks.running_changed(&[])
    }

    /// Tears everything down and re-adds future and running effects unchanged.
    ///
    /// Past effects are dropped and the last observed time is forgotten, so
    /// the driving clock may restart from zero.
    pub fn reset(&mut self, hooks: &mut impl TransitionHooks) -> Result<()> {
        let captured: Vec<Effect> = self
            .running
            .drain(..)
            .map(|entry| entry.effect)
            .chain(self.future.drain(..))
            .collect();

        for effect in &captured {
            hooks.release(&effect.identifier);
        }
        self.past.clear();
        self.last_time = None;

        let mut failure = None;
        keep_first(&mut failure, hooks.running_changed(&[]));

        debug!("Resetting {} effect(s)", captured.len());
        for effect in captured {
            let identifier = effect.identifier.clone();
            if let Err(e) = self.add_effect(effect, hooks) {
                warn!("Effect '{}' could not be re-added after reset: {}", identifier, e);
                keep_first(&mut failure, Err(e));
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Running effects in render order.
    pub fn running_effects(&self) -> Vec<&Effect> {
        self.running.iter().map(|entry| &entry.effect).collect()
    }

    pub fn running(&self) -> &[RunningEffect] {
        &self.running
    }

    /// Queued effects, earliest first.
    pub fn future_effects(&self) -> Vec<&Effect> {
        self.future.iter().collect()
    }

    /// Finished effects, by identifier.
    pub fn past_effects(&self) -> Vec<&Effect> {
        self.past.values().collect()
    }

    pub fn state_of(&self, identifier: &str) -> Option<EffectState> {
        if self.future.iter().any(|e| e.identifier == identifier) {
            Some(EffectState::Future)
        } else if self.running.iter().any(|r| r.identifier() == identifier) {
            Some(EffectState::Running)
        } else if self.past.contains_key(identifier) {
            Some(EffectState::Past)
        } else {
            None
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.state_of(identifier).is_some()
    }

    /// Last driving time accepted by `advance`.
    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    pub fn len(&self) -> usize {
        self.future.len() + self.running.len() + self.past.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
