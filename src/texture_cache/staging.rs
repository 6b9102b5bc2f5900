/// Reusable CPU buffers for guest <-> host transfers.
///
/// Buffer 0 holds host-layout data; buffer 1 holds raw guest bytes. Buffers
/// only ever grow, so steady-state loads and flushes do not allocate.
#[derive(Debug, Default)]
pub struct StagingCache {
    buffers: Vec<Vec<u8>>,
}

/// Index of the host-layout buffer.
pub const HOST_BUFFER: usize = 0;
/// Index of the guest-layout buffer.
pub const GUEST_BUFFER: usize = 1;

impl StagingCache {
    #[must_use]
    pub fn new(count: usize) -> Self {
        let mut cache = Self::default();
        cache.set_size(count);
        cache
    }

    /// Keeps at least two buffers around; the transfer paths need both.
    pub fn set_size(&mut self, count: usize) {
        self.buffers.resize_with(count.max(2), Vec::new);
    }

    /// Buffer `index`, resized to exactly `len` bytes.
    pub fn buffer(&mut self, index: usize, len: usize) -> &mut Vec<u8> {
        let buffer = &mut self.buffers[index];
        buffer.resize(len, 0);
        buffer
    }

    /// Host and guest buffers at once, resized to `host_len` and `guest_len`.
    pub fn host_and_guest(&mut self, host_len: usize, guest_len: usize) -> (&mut [u8], &mut [u8]) {
        let (head, tail) = self.buffers.split_at_mut(GUEST_BUFFER);
        let host = &mut head[HOST_BUFFER];
        let guest = &mut tail[0];
        host.resize(host_len, 0);
        guest.resize(guest_len, 0);
        (host.as_mut_slice(), guest.as_mut_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Total capacity currently held, in bytes.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.buffers.iter().map(Vec::capacity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_keeps_host_and_guest_buffers() {
        let mut cache = StagingCache::new(0);
        assert_eq!(cache.len(), 2);
        let (host, guest) = cache.host_and_guest(16, 32);
        assert_eq!((host.len(), guest.len()), (16, 32));
    }

    #[test]
    fn buffers_are_reused() {
        let mut cache = StagingCache::new(2);
        cache.buffer(HOST_BUFFER, 4096);
        let capacity = cache.capacity_bytes();
        cache.buffer(HOST_BUFFER, 1024);
        assert_eq!(cache.capacity_bytes(), capacity);
        assert_eq!(cache.buffer(HOST_BUFFER, 1024).len(), 1024);
    }
}
