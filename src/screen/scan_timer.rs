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

//! Cancellable stop timer for the current scan window.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::ScreenEvent;

/// Stop timer tied to one scan invocation.
///
/// Arming replaces (and aborts) whatever timer was running, so only the
/// latest scan can close the window.
#[derive(Debug, Default)]
pub struct ScanTimer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl ScanTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer that delivers `ScanTimerFired` after `duration`.
    /// Returns the generation of the new timer.
    pub fn arm(&mut self, duration: Duration, tx: mpsc::UnboundedSender<ScreenEvent>) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;

        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(ScreenEvent::ScanTimerFired { generation });
        }));
        debug!("Scan timer {} armed for {:?}", generation, duration);
        generation
    }

    /// Abort the running timer, if any.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Scan timer {} cancelled", self.generation);
        }
    }

    /// Consume a fired timer. True only for the armed generation.
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.task.is_some() && generation == self.generation {
            self.task = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for ScanTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ScanTimer::new();

        let generation = timer.arm(Duration::from_secs(5), tx);
        tokio::time::sleep(Duration::from_secs(6)).await;

        match rx.try_recv() {
            Ok(ScreenEvent::ScanTimerFired { generation: fired }) => assert_eq!(fired, generation),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(timer.expire(generation));
        assert!(!timer.expire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_cancels_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ScanTimer::new();

        let first = timer.arm(Duration::from_secs(5), tx.clone());
        tokio::time::sleep(Duration::from_secs(3)).await;
        let second = timer.arm(Duration::from_secs(5), tx);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(rx.try_recv().is_err());
        assert!(!timer.expire(first));

        tokio::time::sleep(Duration::from_secs(3)).await;
        match rx.try_recv() {
            Ok(ScreenEvent::ScanTimerFired { generation }) => assert_eq!(generation, second),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_delivery() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = ScanTimer::new();

        timer.arm(Duration::from_secs(5), tx);
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(rx.try_recv().is_err());
        assert!(!timer.is_armed());
    }
}
