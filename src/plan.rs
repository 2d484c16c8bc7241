//! Read plans: reusable TOC bundles for opening runs of structurally
//! identical files.
//!
//! A plan wraps one file's parsed TOC together with its channel-position
//! caches.  Opening the next file in a sequence with
//! [`crate::stream::IFrameStream::open_with_plan`] reads only that file's
//! end-of-file record; when the frame count and run list match the seed,
//! the seed's TOC is adopted outright and the TOC parse skipped.  The
//! channel-position tables are recorded as distances from end-of-file, so
//! they stay valid across files whose payload bytes differ; the adopted
//! caches are merely marked stale and refresh from the new file on first
//! use.
//!
//! Plans are immutable once extracted.  Sharing one across concurrently
//! open streams is safe exactly because each stream takes its own copy at
//! open; extract the plan only after the queries of interest have run at
//! least once if the position caches should come along pre-warmed.

use crate::toc::{ChannelKind, FrToc};

/// A cached TOC plus its channel-position tables, scoped to the file it
/// was extracted from but reusable as a seed for structurally compatible
/// files.
#[derive(Debug, Clone)]
pub struct ReadPlan {
    toc: FrToc,
}

impl ReadPlan {
    pub(crate) fn new(toc: FrToc) -> Self {
        ReadPlan { toc }
    }

    pub fn n_frames(&self) -> usize {
        self.toc.n_frames()
    }

    /// Run numbers in frame order; the compatibility key alongside the
    /// frame count.
    pub fn runs(&self) -> Vec<i32> {
        self.toc.runs()
    }

    pub fn channel_names(&self, kind: ChannelKind) -> &[String] {
        self.toc.channel_names(kind)
    }

    pub(crate) fn clone_toc(&self) -> FrToc {
        self.toc.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::{TocBuilder, TocFrame};

    fn toc_with_runs(runs: &[i32]) -> FrToc {
        let mut b = TocBuilder::new();
        for (i, &run) in runs.iter().enumerate() {
            b.add_frame(TocFrame {
                frame: i as u32,
                run,
                ..TocFrame::default()
            });
            b.record_channel(ChannelKind::Adc, "X", 1000 + i as u64, 0, 0);
        }
        b.build()
    }

    #[test]
    fn plan_reports_seed_shape() {
        let plan = ReadPlan::new(toc_with_runs(&[42, 42, 42]));
        assert_eq!(plan.n_frames(), 3);
        assert_eq!(plan.runs(), vec![42, 42, 42]);
        assert_eq!(plan.channel_names(ChannelKind::Adc), ["X".to_string()]);
    }

    #[test]
    fn cloned_toc_is_independent() {
        let plan = ReadPlan::new(toc_with_runs(&[1]));
        let mut toc = plan.clone_toc();
        toc.reset_caches();
        // The plan's own copy is untouched by the reset.
        assert_eq!(plan.n_frames(), 1);
    }
}
