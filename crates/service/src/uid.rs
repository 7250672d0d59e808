use parking_lot::Mutex;

/// Hands out and recycles 64-bit session identifiers (C1).
///
/// Freed ids are pushed onto a LIFO free list and preferred over minting a
/// fresh one. Exhaustion (free list empty, counter at `u64::MAX`) is a
/// fatal error for the allocating request, not a panic — the caller turns
/// it into a `ServerSideError` close.
pub struct UidAllocator(Mutex<Inner>);

struct Inner {
    next: u64,
    free: Vec<u64>,
}

impl Default for UidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl UidAllocator {
    pub fn new() -> Self {
        Self(Mutex::new(Inner {
            next: 0,
            free: Vec::new(),
        }))
    }

    /// Allocate the next id, preferring a recycled one.
    pub fn get(&self) -> Option<u64> {
        let mut inner = self.0.lock();
        if let Some(id) = inner.free.pop() {
            return Some(id);
        }

        if inner.next == u64::MAX {
            return None;
        }

        let id = inner.next;
        inner.next += 1;
        Some(id)
    }

    /// Return an id to the free list for reuse.
    pub fn release(&self, id: u64) {
        self.0.lock().free.push(id);
    }

    /// Number of ids currently checked out, for `/stats`.
    pub fn len(&self) -> usize {
        let inner = self.0.lock();
        (inner.next as usize).saturating_sub(inner.free.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_monotonically() {
        let alloc = UidAllocator::new();
        assert_eq!(alloc.get(), Some(0));
        assert_eq!(alloc.get(), Some(1));
        assert_eq!(alloc.get(), Some(2));
        assert_eq!(alloc.len(), 3);
    }

    #[test]
    fn prefers_freed_ids() {
        let alloc = UidAllocator::new();
        let a = alloc.get().unwrap();
        let b = alloc.get().unwrap();
        alloc.release(a);
        // LIFO: the just-freed id comes back before a fresh one.
        assert_eq!(alloc.get(), Some(a));
        assert_eq!(alloc.get(), Some(b + 1));
    }

    #[test]
    fn exhaustion_returns_none() {
        let alloc = UidAllocator::new();
        alloc.0.lock().next = u64::MAX;
        assert_eq!(alloc.get(), None);
    }
}
