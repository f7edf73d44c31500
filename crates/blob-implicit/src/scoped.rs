use std::cell::RefCell;
use std::marker::PhantomData;
use std::thread::LocalKey;

/// The frames of one [`FrameStack`], each tagged with the id of the guard
/// that owns it.
#[derive(Debug)]
pub struct Frames<T> {
    entries: Vec<(u64, T)>,
    next_id: u64,
}

impl<T> Frames<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Frames<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread-local stack of override frames.
pub type FrameStack<T> = LocalKey<RefCell<Frames<T>>>;

/// Pops its frame off a [`FrameStack`] when dropped.
///
/// The guard is `!Send`: a frame belongs to the thread that
/// pushed it, and frames on one thread are strictly nested.
#[must_use = "the override is popped as soon as the guard is dropped"]
pub struct FrameGuard<T: 'static> {
    stack: &'static FrameStack<T>,
    id: u64,
    _not_send: PhantomData<*const ()>,
}

/// Push `frame` on top of `stack`, returning the guard that pops it.
pub fn push<T: 'static>(stack: &'static FrameStack<T>, frame: T) -> FrameGuard<T> {
    let id = stack.with(|frames| {
        let mut frames = frames.borrow_mut();
        let id = frames.next_id;
        frames.next_id += 1;
        frames.entries.push((id, frame));
        id
    });
    FrameGuard {
        stack,
        id,
        _not_send: PhantomData,
    }
}

/// Search the frames of `stack` from innermost to outermost and return the
/// first value produced by `f`.
pub fn find_map<T: 'static, R>(
    stack: &'static FrameStack<T>,
    mut f: impl FnMut(&T) -> Option<R>,
) -> Option<R> {
    stack.with(|frames| frames.borrow().entries.iter().rev().find_map(|(_, t)| f(t)))
}

/// Number of frames currently pushed on `stack`.
pub fn depth<T: 'static>(stack: &'static FrameStack<T>) -> usize {
    stack.with(|frames| frames.borrow().len())
}

impl<T: 'static> Drop for FrameGuard<T> {
    fn drop(&mut self) {
        let _ = self.stack.try_with(|frames| {
            let mut frames = frames.borrow_mut();
            let Some(pos) = frames.entries.iter().position(|(id, _)| *id == self.id) else {
                // Already discarded along with an outer frame.
                return;
            };
            if pos + 1 != frames.len() {
                tracing::warn!(
                    discarded = frames.len() - pos - 1,
                    "override frames released out of order"
                );
            }
            frames.entries.truncate(pos);
        });
    }
}

impl<T: 'static> std::fmt::Debug for FrameGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGuard").field("id", &self.id).finish()
    }
}
