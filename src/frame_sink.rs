use crate::dmx_frame::{Dmx512Frame, FramePool};

/// The consumer side of a [crate::dmx_port::DmxPort].
///
/// It hands out buffers for receptions, takes completed frames, feeds the next frame to send
/// and takes buffers back once they are no longer needed.
pub trait FrameSink {
    /// Buffer for a new reception. `None` drops that reception.
    fn acquire(&mut self, port: u8) -> Option<Dmx512Frame>;
    /// A completed reception. Ownership passes to the sink.
    fn push_received(&mut self, frame: Dmx512Frame);
    /// Next queued frame to transmit once the port is idle.
    fn next_to_transmit(&mut self) -> Option<Dmx512Frame>;
    /// A buffer that is not needed anymore.
    fn release(&mut self, frame: Dmx512Frame);
}

/// A `no_std` sink: a [FramePool] plus receive and transmit queues.
pub struct FrameQueue<const POOL: usize, const QUEUE: usize> {
    pool: FramePool<POOL>,
    received: heapless::Deque<Dmx512Frame, QUEUE>,
    transmit: heapless::Deque<Dmx512Frame, QUEUE>,
    dropped: usize,
}

impl<const POOL: usize, const QUEUE: usize> Default for FrameQueue<POOL, QUEUE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const POOL: usize, const QUEUE: usize> FrameQueue<POOL, QUEUE> {
    pub fn new() -> Self {
        Self {
            pool: FramePool::new(),
            received: heapless::Deque::new(),
            transmit: heapless::Deque::new(),
            dropped: 0,
        }
    }

    /// Oldest completed reception.
    pub fn pop_received(&mut self) -> Option<Dmx512Frame> {
        self.received.pop_front()
    }

    pub fn received_len(&self) -> usize {
        self.received.len()
    }

    /// Queues a frame for the port. Returns the frame if the queue is full.
    pub fn queue_transmit(&mut self, frame: Dmx512Frame) -> Result<(), Dmx512Frame> {
        self.transmit.push_back(frame)
    }

    /// Receptions that were discarded because the receive queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn pool(&mut self) -> &mut FramePool<POOL> {
        &mut self.pool
    }
}

impl<const POOL: usize, const QUEUE: usize> FrameSink for FrameQueue<POOL, QUEUE> {
    fn acquire(&mut self, port: u8) -> Option<Dmx512Frame> {
        self.pool.acquire(port)
    }

    fn push_received(&mut self, frame: Dmx512Frame) {
        if let Err(frame) = self.received.push_back(frame) {
            log::warn!("receive queue full, dropping frame");
            self.dropped += 1;
            self.pool.release(frame);
        }
    }

    fn next_to_transmit(&mut self) -> Option<Dmx512Frame> {
        self.transmit.pop_front()
    }

    fn release(&mut self, frame: Dmx512Frame) {
        self.pool.release(frame);
    }
}
