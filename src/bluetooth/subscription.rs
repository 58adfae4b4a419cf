// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scoped event-stream handles.
//!
//! A [`Subscription`] is what a module hands out when a listener is
//! registered. Dropping it unregisters the listener.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Receiving end of a module event stream.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    release: Option<ReleaseHook>,
}

impl<T> Subscription<T> {
    /// Wrap a receiver, running `release` when the handle is dropped.
    pub fn new(rx: mpsc::UnboundedReceiver<T>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next event. `None` once the module side has gone away.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take an already delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

struct ListenerSet<T> {
    next_id: u64,
    senders: Vec<(u64, mpsc::UnboundedSender<T>)>,
}

/// Registry of listeners for one event kind.
///
/// Backends keep one of these per stream and call [`Listeners::emit`] when
/// the underlying stack reports something.
pub struct Listeners<T> {
    name: &'static str,
    inner: Arc<Mutex<ListenerSet<T>>>,
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Listeners<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(ListenerSet {
                next_id: 0,
                senders: Vec::new(),
            })),
        }
    }

    /// Register a new listener.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut set = self.inner.lock();
            let id = set.next_id;
            set.next_id += 1;
            set.senders.push((id, tx));
            id
        };
        debug!("{} listener {} registered", self.name, id);

        let inner = self.inner.clone();
        let name = self.name;
        Subscription::new(rx, move || {
            inner.lock().senders.retain(|(sid, _)| *sid != id);
            debug!("{} listener {} released", name, id);
        })
    }

    /// Deliver an event to every live listener.
    pub fn emit(&self, value: T) {
        let mut set = self.inner.lock();
        set.senders.retain(|(_, tx)| tx.send(value.clone()).is_ok());
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_listeners() {
        let listeners = Listeners::<u32>::new("test");
        let mut a = listeners.subscribe();
        let mut b = listeners.subscribe();

        listeners.emit(7);

        assert_eq!(a.try_recv(), Some(7));
        assert_eq!(b.try_recv(), Some(7));
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_drop_releases_listener() {
        let listeners = Listeners::<u32>::new("test");
        let first = listeners.subscribe();
        let _second = listeners.subscribe();
        assert_eq!(listeners.len(), 2);

        drop(first);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_release_hook_runs_once() {
        let (_tx, rx) = mpsc::unbounded_channel::<()>();
        let count = Arc::new(Mutex::new(0));
        let hook_count = count.clone();
        let sub = Subscription::new(rx, move || *hook_count.lock() += 1);

        drop(sub);
        assert_eq!(*count.lock(), 1);
    }
}
