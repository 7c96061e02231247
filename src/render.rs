//! Streaming render queue.
//!
//! Generated text arrives in bursts of arbitrary size; the queue reveals it
//! one character per display frame so the output reads as steady typing.
//! [`RenderQueue`] is the synchronous core; [`spawn_render_queue`] wraps it
//! in a task that owns the queue, so at most one unit moves per tick.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};

/// Pending units plus the text revealed so far.
#[derive(Debug, Default, Clone)]
pub struct RenderQueue {
    pending: VecDeque<char>,
    visible: String,
}

impl RenderQueue {
    /// Empty queue with nothing visible.
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `fragment` into characters and queues them in order.
    pub fn push(&mut self, fragment: &str) {
        self.pending.extend(fragment.chars());
    }

    /// Moves one unit to the visible buffer.
    pub fn tick(&mut self) -> Option<char> {
        let unit = self.pending.pop_front()?;
        self.visible.push(unit);
        Some(unit)
    }

    /// Text revealed so far.
    pub fn visible(&self) -> &str {
        &self.visible
    }

    /// Units still waiting for a frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is waiting.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Progress published by the render task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// One more unit became visible.
    Frame {
        /// Full visible text after this frame.
        visible: String,
    },
    /// The input closed and every queued unit is visible.
    Drained {
        /// Final visible text.
        visible: String,
    },
}

/// Owner of a running render task. Dropping it cancels the task.
pub struct RenderHandle {
    events_tx: broadcast::Sender<RenderEvent>,
    visible_rx: watch::Receiver<String>,
    task: Option<JoinHandle<()>>,
}

/// Spawns a render task ticking every `frame_interval`.
///
/// Fragments go in through the returned sender. Dropping every clone of it
/// marks the end of the stream: remaining units are still revealed, then a
/// [`RenderEvent::Drained`] is published and the task exits.
pub fn spawn_render_queue(
    frame_interval: Duration,
    event_capacity: usize,
) -> (mpsc::UnboundedSender<String>, RenderHandle) {
    let (fragment_tx, mut fragment_rx) = mpsc::unbounded_channel::<String>();
    let (events_tx, _) = broadcast::channel::<RenderEvent>(event_capacity.max(1));
    let (visible_tx, visible_rx) = watch::channel(String::new());
    let events_loop = events_tx.clone();

    let task = tokio::spawn(async move {
        let mut queue = RenderQueue::new();
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut input_open = true;

        loop {
            tokio::select! {
                fragment = fragment_rx.recv(), if input_open => {
                    match fragment {
                        Some(fragment) => queue.push(&fragment),
                        None => input_open = false,
                    }
                }
                _ = ticker.tick(), if !queue.is_idle() => {
                    if queue.tick().is_some() {
                        let visible = queue.visible().to_string();
                        visible_tx.send_replace(visible.clone());
                        let _ = events_loop.send(RenderEvent::Frame { visible });
                    }
                }
            }

            if !input_open && queue.is_idle() {
                let _ = events_loop.send(RenderEvent::Drained {
                    visible: queue.visible().to_string(),
                });
                break;
            }
        }
    });

    (
        fragment_tx,
        RenderHandle {
            events_tx,
            visible_rx,
            task: Some(task),
        },
    )
}

impl RenderHandle {
    /// Receiver for frame and drain events.
    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.events_tx.subscribe()
    }

    /// Text revealed so far.
    pub fn visible(&self) -> String {
        self.visible_rx.borrow().clone()
    }

    /// Watch channel over the visible text, for views that only need the
    /// latest value.
    pub fn watch(&self) -> watch::Receiver<String> {
        self.visible_rx.clone()
    }

    /// True once the task drained, was cancelled or was joined.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stops revealing immediately. Queued units are discarded.
    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Waits for the task to drain or be cancelled and returns the visible
    /// text.
    pub async fn join(&mut self) -> String {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.visible()
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_reveals_one_unit_per_tick_in_order() {
        let mut queue = RenderQueue::new();
        let mut states = vec![queue.visible().to_string()];

        queue.push("ab");
        states.push({
            queue.tick();
            queue.visible().to_string()
        });
        queue.push("");
        queue.push("cde");
        while queue.tick().is_some() {
            states.push(queue.visible().to_string());
        }

        assert_eq!(states, vec!["", "a", "ab", "abc", "abcd", "abcde"]);
        assert!(queue.is_idle());
    }

    #[test]
    fn multibyte_units_stay_whole() {
        let mut queue = RenderQueue::new();
        queue.push("夜é");
        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.tick(), Some('夜'));
        assert_eq!(queue.tick(), Some('é'));
        assert_eq!(queue.tick(), None);
    }
}
