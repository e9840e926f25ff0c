// Sample FIFO between the decoder thread and the output callback

use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-capacity ring of interleaved f32 samples.
/// One slot stays empty so full and empty are distinguishable.
pub struct SampleRing {
    buffer: Vec<f32>,
    write_pos: usize,
    read_pos: usize,
}

impl SampleRing {
    /// Ring holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1) + 1],
            write_pos: 0,
            read_pos: 0,
        }
    }

    fn slots(&self) -> usize {
        self.buffer.len()
    }

    /// Copy as much of `data` as fits; returns the count written
    pub fn write(&mut self, data: &[f32]) -> usize {
        let n = data.len().min(self.free());
        if n == 0 {
            return 0;
        }

        let first = n.min(self.slots() - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        self.buffer[..n - first].copy_from_slice(&data[first..n]);
        self.write_pos = (self.write_pos + n) % self.slots();
        n
    }

    /// Fill `output` from the ring; returns the count read
    pub fn read(&mut self, output: &mut [f32]) -> usize {
        let n = output.len().min(self.len());
        if n == 0 {
            return 0;
        }

        let first = n.min(self.slots() - self.read_pos);
        output[..first].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + first]);
        output[first..n].copy_from_slice(&self.buffer[..n - first]);
        self.read_pos = (self.read_pos + n) % self.slots();
        n
    }

    /// Samples waiting to be read
    pub fn len(&self) -> usize {
        (self.write_pos + self.slots() - self.read_pos) % self.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == self.read_pos
    }

    /// Room left for writing
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots() - 1
    }

    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
    }
}

/// `SampleRing` shared between threads
#[derive(Clone)]
pub struct SharedRing {
    inner: Arc<Mutex<SampleRing>>,
}

impl SharedRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SampleRing::new(capacity))),
        }
    }

    pub fn write(&self, data: &[f32]) -> usize {
        self.inner.lock().write(data)
    }

    pub fn read(&self, output: &mut [f32]) -> usize {
        self.inner.lock().read(output)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn free(&self) -> usize {
        self.inner.lock().free()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
