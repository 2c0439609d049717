//! Process-wide model registry.
//!
//! The resident collaborators (LLM client, TTS model, face animator) have
//! nontrivial init cost and are not reentrant on a single accelerator.
//! Each lives in a slot that lazy-initialises on first acquisition and
//! serialises access with its own async mutex. Callers receive a lease
//! that keeps the slot locked until dropped; no global singletons are
//! exposed.

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use lumen_media::{FrameRenderer, MotionProposer, SpeechSynthesizer};

use crate::llm::LlmTransport;

/// Both animation stages behind one resident model.
pub trait Animator: MotionProposer + FrameRenderer {}

impl<T: MotionProposer + FrameRenderer> Animator for T {}

/// One resident model slot: lazily initialised, mutex-serialised.
pub struct ModelSlot<M: ?Sized> {
    slot: Arc<Mutex<Option<Arc<M>>>>,
}

impl<M: ?Sized> Clone for ModelSlot<M> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<M: ?Sized> Default for ModelSlot<M> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<M: ?Sized> ModelSlot<M> {
    /// An empty slot; the model is built on first acquisition.
    pub fn empty() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// A slot seeded with an existing model (dependency injection).
    pub fn preloaded(model: Arc<M>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(model))),
        }
    }

    /// Acquire the model, building it with `init` if the slot is empty.
    /// The returned lease holds the slot's mutex until dropped.
    pub async fn acquire_with<F>(&self, init: F) -> ModelLease<M>
    where
        F: FnOnce() -> Arc<M>,
    {
        let mut guard = Arc::clone(&self.slot).lock_owned().await;
        let model = match guard.as_ref() {
            Some(model) => Arc::clone(model),
            None => {
                debug!("Initialising resident model");
                let model = init();
                *guard = Some(Arc::clone(&model));
                model
            }
        };
        ModelLease {
            model,
            _guard: guard,
        }
    }

    /// Drop the resident model; the next acquisition re-initialises.
    pub async fn clear(&self) {
        let mut guard = self.slot.lock().await;
        *guard = None;
    }
}

/// Scoped access to a resident model. Release happens on drop; callers
/// must not stash the inner reference beyond the lease's lifetime.
pub struct ModelLease<M: ?Sized> {
    model: Arc<M>,
    _guard: OwnedMutexGuard<Option<Arc<M>>>,
}

impl<M: ?Sized> ModelLease<M> {
    /// Shared handle to the leased model, for APIs that take `Arc`s. The
    /// lease must stay alive while the handle is in use.
    pub fn shared(&self) -> Arc<M> {
        Arc::clone(&self.model)
    }
}

impl<M: ?Sized> Deref for ModelLease<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.model
    }
}

/// Registry of all resident models.
pub struct ModelRegistry {
    pub llm: ModelSlot<dyn LlmTransport>,
    pub synthesizer: ModelSlot<dyn SpeechSynthesizer>,
    pub animator: ModelSlot<dyn Animator>,
}

impl ModelRegistry {
    /// Empty registry; models load lazily on first use.
    pub fn new() -> Self {
        Self {
            llm: ModelSlot::empty(),
            synthesizer: ModelSlot::empty(),
            animator: ModelSlot::empty(),
        }
    }

    /// Registry seeded with explicit collaborators.
    pub fn with_collaborators(
        llm: Arc<dyn LlmTransport>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        animator: Arc<dyn Animator>,
    ) -> Self {
        Self {
            llm: ModelSlot::preloaded(llm),
            synthesizer: ModelSlot::preloaded(synthesizer),
            animator: ModelSlot::preloaded(animator),
        }
    }

    /// Release every resident model.
    pub async fn shutdown(&self) {
        self.llm.clear().await;
        self.synthesizer.clear().await;
        self.animator.clear().await;
        info!("Model registry shut down");
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
