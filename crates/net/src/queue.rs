//! Ordered outbound frame queue
//!
//! The head of a non-empty queue is the frame currently being written. Only
//! the connection task touches the queue.

use std::collections::VecDeque;

use wirechat_core::MessageFrame;

#[derive(Debug, Default)]
pub struct WriteQueue {
    frames: VecDeque<MessageFrame>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. Returns `true` if the queue was idle, meaning the
    /// caller has to start writing the new head.
    pub fn push_back(&mut self, frame: MessageFrame) -> bool {
        let was_idle = self.frames.is_empty();
        self.frames.push_back(frame);
        was_idle
    }

    /// Put a frame ahead of everything queued. Only valid while no write is
    /// in flight, since the in-flight frame must stay at the head.
    pub fn push_front(&mut self, frame: MessageFrame) {
        self.frames.push_front(frame);
    }

    /// Frame currently being written
    pub fn head(&self) -> Option<&MessageFrame> {
        self.frames.front()
    }

    /// Pop the written head and return the next frame to write, if any
    pub fn complete_head(&mut self) -> Option<&MessageFrame> {
        self.frames.pop_front();
        self.frames.front()
    }

    /// Drop every queued frame, returning how many were abandoned
    pub fn clear(&mut self) -> usize {
        let count = self.frames.len();
        self.frames.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
