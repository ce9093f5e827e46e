//! UI task queue
//!
//! Background threads and tasks never touch UI state directly. They post
//! closures through a [`UiQueue`], and the UI loop runs them in order on its
//! own thread via [`UiLoop::drain`].

use tokio::sync::mpsc;

type Task<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Cloneable posting handle
pub struct UiQueue<S> {
    tx: mpsc::UnboundedSender<Task<S>>,
}

impl<S> Clone for UiQueue<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> std::fmt::Debug for UiQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiQueue")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<S: 'static> UiQueue<S> {
    /// Schedule `task` on the UI thread
    ///
    /// Returns false when the UI loop is gone; the task is dropped.
    pub fn post(&self, task: impl FnOnce(&mut S) + Send + 'static) -> bool {
        if self.tx.send(Box::new(task)).is_err() {
            tracing::trace!("ui loop gone, task dropped");
            return false;
        }
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end, owned by the UI thread
pub struct UiLoop<S> {
    rx: mpsc::UnboundedReceiver<Task<S>>,
}

impl<S> UiLoop<S> {
    /// Run every pending task against `state`, returning how many ran
    pub fn drain(&mut self, state: &mut S) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(state);
            ran += 1;
        }
        ran
    }
}

/// Create a connected queue and loop
#[must_use]
pub fn channel<S>() -> (UiQueue<S>, UiLoop<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiQueue { tx }, UiLoop { rx })
}
