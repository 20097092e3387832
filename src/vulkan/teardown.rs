//! Ordered destruction of Vulkan objects.

use std::fmt;

type Destroy = Box<dyn FnOnce()>;

/// A stack of labelled destroy actions, run newest first.
///
/// Every object the environment creates pushes its destroy action right after
/// creation succeeds. Dropping the stack, whether at the end of a normal
/// lifetime or halfway through a failed construction, destroys exactly the
/// objects that exist, in reverse creation order.
#[derive(Default)]
pub struct TeardownStack {
    entries: Vec<(&'static str, Destroy)>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: &'static str, destroy: impl FnOnce() + 'static) {
        log::trace!("registered {label} for teardown");
        self.entries.push((label, Box::new(destroy)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in creation order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(label, _)| *label).collect()
    }

    /// Runs every destroy action, newest first. The stack is empty afterwards.
    pub fn unwind(&mut self) {
        while let Some((label, destroy)) = self.entries.pop() {
            log::debug!("destroying {label}");
            destroy();
        }
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        self.unwind();
    }
}

impl fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}
