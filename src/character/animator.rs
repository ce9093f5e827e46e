//! Threaded mascot driver
//!
//! The render thread shows the current frame and waits out its duration; the
//! behavior thread ticks the ambient behavior. Neither touches UI state: both
//! post through the [`UiQueue`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{Character, CharacterSignal};
use crate::ui::UiQueue;
use crate::Result;

/// Interval between ambient behavior steps
pub const BEHAVIOR_TICK: Duration = Duration::from_secs(1);

/// Granularity of cooperative waits
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// UI state that can display the mascot
///
/// Every call carries the `session` the animator was spawned with, so a view
/// can ignore work still queued by an animator it has since replaced.
pub trait MascotView {
    /// Show the frame image at `path`
    fn show_frame(&mut self, session: u64, path: &Path);

    /// Handle a request from the mascot
    fn mascot_signal(&mut self, session: u64, signal: CharacterSignal);
}

/// Runs a [`Character`] on background threads
pub struct Animator {
    character: Arc<Mutex<Character>>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Animator {
    /// Start the render and behavior threads
    ///
    /// # Errors
    ///
    /// Returns error if a thread cannot be spawned
    pub fn spawn<S: MascotView + 'static>(
        character: Character,
        assets_dir: PathBuf,
        behavior_tick: Duration,
        session: u64,
        queue: UiQueue<S>,
    ) -> Result<Self> {
        let mut animator = Self {
            character: Arc::new(Mutex::new(character)),
            running: Arc::new(AtomicBool::new(true)),
            threads: Vec::with_capacity(2),
        };

        let character = Arc::clone(&animator.character);
        let running = Arc::clone(&animator.running);
        let render = spawn_thread(
            std::thread::Builder::new().name("mascot-render".to_string()),
            move || render_loop(&character, &running, &assets_dir, session, &queue),
        )?;
        animator.threads.push(render);

        let character = Arc::clone(&animator.character);
        let running = Arc::clone(&animator.running);
        let behavior = spawn_thread(
            std::thread::Builder::new().name("mascot-behavior".to_string()),
            move || behavior_loop(&character, &running, behavior_tick),
        )?;
        animator.threads.push(behavior);

        tracing::debug!("animator started");
        Ok(animator)
    }

    /// Shared handle to the driven character
    #[must_use]
    pub fn character(&self) -> Arc<Mutex<Character>> {
        Arc::clone(&self.character)
    }

    pub fn wake_up(&self) {
        lock(&self.character).wake_up();
    }

    pub fn tap(&self) {
        lock(&self.character).tap();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Halt both threads and wait for them
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("animator thread panicked");
            }
        }
        tracing::debug!("animator stopped");
    }
}

impl Drop for Animator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop<S: MascotView + 'static>(
    character: &Mutex<Character>,
    running: &AtomicBool,
    assets_dir: &Path,
    session: u64,
    queue: &UiQueue<S>,
) {
    while running.load(Ordering::Acquire) {
        let frame = {
            let mut c = lock(character);
            c.take_restart();
            *c.current_frame()
        };

        let path = assets_dir.join(frame.image);
        if !queue.post(move |ui: &mut S| ui.show_frame(session, &path)) {
            tracing::debug!("ui gone, render loop exiting");
            running.store(false, Ordering::Release);
            break;
        }

        if frame.duration_ms > 0 {
            wait(Duration::from_millis(frame.duration_ms), running, || {
                lock(character).restart_pending()
            });
        }

        let signal = {
            let mut c = lock(character);
            // A state change during the wait already reset the frame
            if c.restart_pending() {
                None
            } else {
                c.finish_frame()
            }
        };

        if let Some(signal) = signal {
            queue.post(move |ui: &mut S| ui.mascot_signal(session, signal));
        }
    }
}

fn behavior_loop(character: &Mutex<Character>, running: &AtomicBool, tick: Duration) {
    let mut rng = rand::thread_rng();
    while running.load(Ordering::Acquire) {
        wait(tick, running, || false);
        if !running.load(Ordering::Acquire) {
            break;
        }
        lock(character).behavior_tick(&mut rng);
    }
}

/// Sleep for `duration` in short slices, returning early on stop or interrupt
fn wait(duration: Duration, running: &AtomicBool, interrupted: impl Fn() -> bool) {
    let deadline = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= deadline || !running.load(Ordering::Acquire) || interrupted() {
            return;
        }
        std::thread::sleep(WAIT_SLICE.min(deadline - now));
    }
}

fn spawn_thread(
    builder: std::thread::Builder,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    Ok(builder.spawn(f)?)
}

fn lock(character: &Mutex<Character>) -> MutexGuard<'_, Character> {
    character.lock().unwrap_or_else(PoisonError::into_inner)
}
