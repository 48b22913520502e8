// Deferred-merge segmenter: holds at most one short utterance per session
// and joins it with its successor, or flushes it, within a bounded window.
//
// The pending segment and its timeout are a single owned resource: starting
// a new pending segment always replaces (and implicitly cancels, via the
// generation counter) whatever was there before.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// A segment ready to hand to the transcription dispatcher.
#[derive(Debug, Clone)]
pub struct Segment {
    pub segment_id: u64,
    pub pcm: Vec<u8>,
}

/// Sent by a background timer task when a held segment's merge window
/// elapses. `generation` lets the merger ignore timers for segments that
/// were already merged or flushed by other means.
#[derive(Debug, Clone, Copy)]
pub struct MergerTimeout {
    pub generation: u64,
}

#[derive(Debug)]
struct Pending {
    segment_id: u64,
    pcm: Vec<u8>,
    received_at: Instant,
    duration: Duration,
    generation: u64,
}

#[derive(Debug, PartialEq)]
pub enum OfferOutcome {
    /// The offered utterance (possibly merged with a prior pending one) was
    /// handed to `on_ready` immediately.
    Immediate,
    /// The offered utterance (possibly merged) is now held, awaiting a
    /// successor or timeout.
    Held,
}

pub struct SegmentMerger {
    pending: Option<Pending>,
    next_generation: u64,
    min_merge_duration: Duration,
    merge_timeout: Duration,
    timer_tx: mpsc::UnboundedSender<MergerTimeout>,
}

impl SegmentMerger {
    pub fn new(
        min_merge_duration_secs: f32,
        merge_timeout_secs: f32,
        timer_tx: mpsc::UnboundedSender<MergerTimeout>,
    ) -> Self {
        Self {
            pending: None,
            next_generation: 0,
            min_merge_duration: Duration::from_secs_f32(min_merge_duration_secs),
            merge_timeout: Duration::from_secs_f32(merge_timeout_secs),
            timer_tx,
        }
    }

    fn pcm_duration(pcm_len: usize, sample_rate: u32) -> Duration {
        let samples = pcm_len / 2;
        Duration::from_secs_f64(samples as f64 / sample_rate as f64)
    }

    fn start_pending(&mut self, segment_id: u64, pcm: Vec<u8>, received_at: Instant, duration: Duration) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.pending = Some(Pending {
            segment_id,
            pcm,
            received_at,
            duration,
            generation,
        });
        let tx = self.timer_tx.clone();
        let timeout = self.merge_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // The receiving side may already be gone if the session tore
            // down; a closed channel here is not an error.
            let _ = tx.send(MergerTimeout { generation });
        });
    }

    /// Offer a freshly sealed utterance. `on_ready` is invoked synchronously,
    /// possibly twice: once for a non-merge-eligible predecessor being
    /// flushed, once for the offered segment itself if it's deliverable
    /// immediately.
    pub fn offer(
        &mut self,
        segment_id: u64,
        pcm: Vec<u8>,
        sample_rate: u32,
        mut on_ready: impl FnMut(Segment),
    ) -> OfferOutcome {
        let now = Instant::now();
        let duration = Self::pcm_duration(pcm.len(), sample_rate);

        if let Some(pending) = self.pending.take() {
            let gap = now.saturating_duration_since(pending.received_at);
            if pending.duration < self.min_merge_duration && gap < self.merge_timeout {
                let mut merged_pcm = pending.pcm;
                merged_pcm.extend_from_slice(&pcm);
                let merged_duration = Self::pcm_duration(merged_pcm.len(), sample_rate);
                if merged_duration < self.min_merge_duration {
                    self.start_pending(pending.segment_id, merged_pcm, pending.received_at, merged_duration);
                    return OfferOutcome::Held;
                } else {
                    on_ready(Segment {
                        segment_id: pending.segment_id,
                        pcm: merged_pcm,
                    });
                    return OfferOutcome::Immediate;
                }
            } else {
                on_ready(Segment {
                    segment_id: pending.segment_id,
                    pcm: pending.pcm,
                });
            }
        }

        if duration < self.min_merge_duration {
            self.start_pending(segment_id, pcm, now, duration);
            OfferOutcome::Held
        } else {
            on_ready(Segment { segment_id, pcm });
            OfferOutcome::Immediate
        }
    }

    /// Handle a timer firing. No-op if the pending segment it refers to was
    /// already merged or flushed (generation mismatch), or if there is no
    /// pending segment at all (disconnect raced the timer).
    pub fn handle_timeout(&mut self, timeout: MergerTimeout, mut on_ready: impl FnMut(Segment)) {
        if let Some(pending) = &self.pending {
            if pending.generation == timeout.generation {
                let pending = self.pending.take().unwrap();
                on_ready(Segment {
                    segment_id: pending.segment_id,
                    pcm: pending.pcm,
                });
            }
        }
    }

    /// Flush any pending segment. Safe to call multiple times; idempotent.
    pub fn flush_client(&mut self, mut on_ready: impl FnMut(Segment)) {
        if let Some(pending) = self.pending.take() {
            on_ready(Segment {
                segment_id: pending.segment_id,
                pcm: pending.pcm,
            });
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merger() -> (SegmentMerger, mpsc::UnboundedReceiver<MergerTimeout>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SegmentMerger::new(0.8, 2.0, tx), rx)
    }

    fn pcm_of_duration(secs: f64, sample_rate: u32) -> Vec<u8> {
        let samples = (secs * sample_rate as f64) as usize;
        vec![0u8; samples * 2]
    }

    #[tokio::test]
    async fn long_utterance_delivers_immediately() {
        let (mut merger, _rx) = merger();
        let mut delivered = Vec::new();
        let outcome = merger.offer(1, pcm_of_duration(1.0, 16_000), 16_000, |s| delivered.push(s));
        assert_eq!(outcome, OfferOutcome::Immediate);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].segment_id, 1);
        assert!(!merger.has_pending());
    }

    #[tokio::test]
    async fn short_utterance_is_held() {
        let (mut merger, _rx) = merger();
        let mut delivered = Vec::new();
        let outcome = merger.offer(1, pcm_of_duration(0.2, 16_000), 16_000, |s| delivered.push(s));
        assert_eq!(outcome, OfferOutcome::Held);
        assert!(delivered.is_empty());
        assert!(merger.has_pending());
    }

    #[tokio::test]
    async fn merges_short_utterance_with_prompt_successor() {
        let (mut merger, _rx) = merger();
        let mut delivered = Vec::new();
        merger.offer(1, pcm_of_duration(0.2, 16_000), 16_000, |s| delivered.push(s));
        let outcome = merger.offer(2, pcm_of_duration(1.0, 16_000), 16_000, |s| delivered.push(s));
        assert_eq!(outcome, OfferOutcome::Immediate);
        assert_eq!(delivered.len(), 1);
        // merged segment inherits the earlier id
        assert_eq!(delivered[0].segment_id, 1);
        assert_eq!(
            delivered[0].pcm.len(),
            pcm_of_duration(0.2, 16_000).len() + pcm_of_duration(1.0, 16_000).len()
        );
    }

    #[tokio::test]
    async fn non_merge_eligible_successor_flushes_pending_first() {
        tokio::time::pause();
        let (mut merger, _rx) = merger();
        let mut delivered = Vec::new();
        merger.offer(1, pcm_of_duration(0.2, 16_000), 16_000, |s| delivered.push(s));
        tokio::time::advance(Duration::from_secs(3)).await;
        let outcome = merger.offer(2, pcm_of_duration(1.0, 16_000), 16_000, |s| delivered.push(s));
        assert_eq!(outcome, OfferOutcome::Immediate);
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].segment_id, 1);
        assert_eq!(delivered[1].segment_id, 2);
    }

    #[tokio::test]
    async fn timer_flushes_held_segment() {
        tokio::time::pause();
        let (mut merger, mut rx) = merger();
        let mut delivered = Vec::new();
        merger.offer(1, pcm_of_duration(0.2, 16_000), 16_000, |s| delivered.push(s));
        tokio::time::advance(Duration::from_secs(3)).await;
        let timeout = rx.recv().await.expect("timer should fire");
        merger.handle_timeout(timeout, |s| delivered.push(s));
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].segment_id, 1);
        assert!(!merger.has_pending());
    }

    #[tokio::test]
    async fn stale_timer_after_merge_is_a_no_op() {
        tokio::time::pause();
        let (mut merger, mut rx) = merger();
        let mut delivered = Vec::new();
        merger.offer(1, pcm_of_duration(0.2, 16_000), 16_000, |s| delivered.push(s));
        let stale = rx.try_recv();
        assert!(stale.is_err(), "timer has not fired yet");
        merger.offer(2, pcm_of_duration(1.0, 16_000), 16_000, |s| delivered.push(s));
        tokio::time::advance(Duration::from_secs(3)).await;
        if let Ok(timeout) = rx.try_recv() {
            merger.handle_timeout(timeout, |s| delivered.push(s));
        }
        // only the merged delivery, no duplicate from the stale timer
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn flush_client_is_idempotent() {
        let (mut merger, _rx) = merger();
        let mut delivered = Vec::new();
        merger.offer(1, pcm_of_duration(0.2, 16_000), 16_000, |s| delivered.push(s));
        merger.flush_client(|s| delivered.push(s));
        merger.flush_client(|s| delivered.push(s));
        assert_eq!(delivered.len(), 1);
    }
}
