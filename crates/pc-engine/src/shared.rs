//! Lock shared by the audio callback and the control plane.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::mixer::Engine;

struct Shared {
    engine: Mutex<Engine>,
    soft_lock: AtomicBool,
    skipped: AtomicU64,
}

/// An [`Engine`] behind a single mutex.
///
/// Block rendering and every control operation take the same lock, so a
/// reset can never land in the middle of a block. With soft locking the
/// audio side never waits: a busy engine yields a silent block instead.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Shared>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Shared {
                engine: Mutex::new(engine),
                soft_lock: AtomicBool::new(false),
                skipped: AtomicU64::new(0),
            }),
        }
    }

    /// Render one block, or silence if soft locking is on and the engine is busy.
    pub fn render(&self, out_l: &mut [f32], out_r: &mut [f32]) {
        if self.inner.soft_lock.load(Ordering::Relaxed) {
            match self.inner.engine.try_lock() {
                Some(mut engine) => engine.render_block(out_l, out_r),
                None => {
                    out_l.fill(0.0);
                    out_r.fill(0.0);
                    self.inner.skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
        } else {
            self.inner.engine.lock().render_block(out_l, out_r);
        }
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        f(&mut self.inner.engine.lock())
    }

    pub fn set_soft_lock(&self, enabled: bool) {
        self.inner.soft_lock.store(enabled, Ordering::Relaxed);
    }

    pub fn soft_lock(&self) -> bool {
        self.inner.soft_lock.load(Ordering::Relaxed)
    }

    /// Blocks replaced by silence because the engine was busy.
    pub fn skipped_blocks(&self) -> u64 {
        self.inner.skipped.load(Ordering::Relaxed)
    }
}

impl core::fmt::Debug for SharedEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedEngine")
            .field("soft_lock", &self.soft_lock())
            .field("skipped", &self.skipped_blocks())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use pc_ir::{ChipFamily, Song};

    fn shared() -> SharedEngine {
        let song = Song::with_systems("s", &[ChipFamily::Sms]);
        SharedEngine::new(Engine::new(song, 0, 44100, &BackendRegistry::with_builtin()).unwrap())
    }

    #[test]
    fn soft_lock_skips_busy_blocks() {
        let shared = shared();
        shared.set_soft_lock(true);
        let other = shared.clone();
        let mut l = [1.0f32; 64];
        let mut r = [1.0f32; 64];
        shared.with(|_| other.render(&mut l, &mut r));
        assert!(l.iter().all(|&s| s == 0.0));
        assert_eq!(shared.skipped_blocks(), 1);
    }

    #[test]
    fn control_goes_through_lock() {
        let shared = shared();
        shared.with(|engine| engine.play());
        let mut l = [0.0f32; 1024];
        let mut r = [0.0f32; 1024];
        shared.render(&mut l, &mut r);
        assert!(shared.with(|engine| engine.elapsed().ticks) > 0);
    }
}
