//! Streaming filters.
//!
//! A filter is a transform attached to a stream that observes byte windows
//! as they cross the buffer boundary: on every refill of the get area or
//! flush of the put area, the engine walks the filter list in insertion
//! order and hands each filter exactly the bytes added since that filter's
//! last offset.  The in-tree filters are checksum taps; the contract also
//! admits transforms that rewrite the byte stream, which declare themselves
//! via [`StreamFilter::is_mutating`] so the engine can refuse them where the
//! backing storage is read-only (memory-mapped input).
//!
//! Filters are not re-entrant; the engine guarantees serial invocation per
//! stream.

/// One streaming filter.
pub trait StreamFilter {
    /// Label used for removal and diagnostics.
    fn name(&self) -> &'static str;

    /// Last absolute stream offset this filter has consumed up to.
    fn offset(&self) -> u64;

    /// Point the filter at `offset`: filtering (re)starts there.  Called on
    /// install with the stream's current position.
    fn begin_offset(&mut self, offset: u64);

    /// Process a contiguous window whose first byte sits at absolute stream
    /// offset `begin`.  The engine guarantees `begin == self.offset()`.
    fn pubfilter(&mut self, begin: u64, window: &[u8]);

    /// True when the filter rewrites the byte stream rather than observing
    /// it.  Mutating filters cannot be installed on memory-mapped streams.
    fn is_mutating(&self) -> bool {
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter chain
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered list of installed filters plus the bytes-filtered counter.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn StreamFilter>>,
    bytes_filtered: u64,
}

impl FilterChain {
    pub fn new() -> Self {
        FilterChain::default()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Total bytes delivered to filters since the chain was created.
    pub fn bytes_filtered(&self) -> u64 {
        self.bytes_filtered
    }

    /// Install a filter, pointing it at `position` (the stream's current
    /// read/write position).
    pub fn add(&mut self, mut filter: Box<dyn StreamFilter>, position: u64) {
        filter.begin_offset(position);
        self.filters.push(filter);
    }

    /// Uninstall the first filter with the given name, first flushing it
    /// with the pending tail window `[filter.offset(), window_end)` taken
    /// from `tail` (whose first byte sits at `tail_begin`).  Returns the
    /// removed filter so the caller can extract its result.
    pub fn remove(
        &mut self,
        name: &str,
        tail_begin: u64,
        tail: &[u8],
    ) -> Option<Box<dyn StreamFilter>> {
        let idx = self.filters.iter().position(|f| f.name() == name)?;
        let mut filter = self.filters.remove(idx);
        let window_end = tail_begin + tail.len() as u64;
        if filter.offset() < window_end {
            let skip = (filter.offset() - tail_begin) as usize;
            filter.pubfilter(filter.offset(), &tail[skip..]);
        }
        Some(filter)
    }

    /// True when any installed filter mutates the byte stream.
    pub fn any_mutating(&self) -> bool {
        self.filters.iter().any(|f| f.is_mutating())
    }

    /// Deliver the window `[begin, begin + window.len())` to every filter
    /// whose offset lies inside it.  Window boundaries are buffer-flush
    /// boundaries: the engine calls this once per refill or flush with the
    /// bytes added since the previous call.
    pub fn run(&mut self, begin: u64, window: &[u8]) {
        if window.is_empty() {
            return;
        }
        let window_end = begin + window.len() as u64;
        self.bytes_filtered += window.len() as u64;
        for filter in &mut self.filters {
            let at = filter.offset();
            if at >= window_end {
                continue;
            }
            // A filter installed mid-window starts partway through it.
            let skip = at.saturating_sub(begin) as usize;
            filter.pubfilter(begin + skip as u64, &window[skip..]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every (begin, len) window it receives.
    struct Recorder {
        seen: Rc<RefCell<Vec<(u64, usize)>>>,
        offset: u64,
    }

    impl StreamFilter for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn offset(&self) -> u64 {
            self.offset
        }
        fn begin_offset(&mut self, offset: u64) {
            self.offset = offset;
        }
        fn pubfilter(&mut self, begin: u64, window: &[u8]) {
            assert_eq!(begin, self.offset);
            self.seen.borrow_mut().push((begin, window.len()));
            self.offset = begin + window.len() as u64;
        }
    }

    fn recorder() -> (Box<Recorder>, Rc<RefCell<Vec<(u64, usize)>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (
            Box::new(Recorder {
                seen: seen.clone(),
                offset: 0,
            }),
            seen,
        )
    }

    #[test]
    fn windows_are_contiguous() {
        let mut chain = FilterChain::new();
        let (f, seen) = recorder();
        chain.add(f, 0);
        chain.run(0, &[0u8; 100]);
        chain.run(100, &[0u8; 50]);
        assert_eq!(*seen.borrow(), vec![(0, 100), (100, 50)]);
        assert_eq!(chain.bytes_filtered(), 150);
    }

    #[test]
    fn filter_installed_mid_stream_starts_at_install_point() {
        let mut chain = FilterChain::new();
        let (f, seen) = recorder();
        // Installed at offset 60, inside the next window.
        chain.add(f, 60);
        chain.run(40, &[0u8; 100]);
        assert_eq!(*seen.borrow(), vec![(60, 80)]);
    }

    #[test]
    fn remove_flushes_pending_tail() {
        let mut chain = FilterChain::new();
        let (f, seen) = recorder();
        chain.add(f, 0);
        chain.run(0, &[0u8; 10]);
        // 6 more bytes pending in the put area, not yet flushed.
        let removed = chain.remove("recorder", 10, &[0u8; 6]);
        assert!(removed.is_some());
        assert_eq!(*seen.borrow(), vec![(0, 10), (10, 6)]);
        assert!(chain.is_empty());
    }

    #[test]
    fn remove_unknown_name_is_none() {
        let mut chain = FilterChain::new();
        assert!(chain.remove("nope", 0, &[]).is_none());
    }
}
