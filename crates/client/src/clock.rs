//! Server clock estimation from round-trip `ClockSyncRequest`/`ClockSyncReply`
//! exchanges, grounded on the teacher's `AckTracker` RTT smoothing but using
//! a sample ring plus median/stddev outlier rejection instead of an EWMA,
//! since a single bad sample must not drag the offset around.

use std::collections::VecDeque;

const SAMPLE_RING_SIZE: usize = 16;
const MIN_SAMPLES_FOR_MEDIAN: usize = 3;

#[derive(Debug, Clone, Copy)]
struct Sample {
    rtt_ms: f64,
    offset_ms: f64,
}

/// Tracks the offset between the client's monotonic clock and the server's,
/// so the client can ask "what time is it on the server right now".
#[derive(Debug, Clone)]
pub struct ClockSync {
    samples: VecDeque<Sample>,
    smoothed_offset_ms: f64,
    last_rtt_ms: f64,
    pending_send_time_ms: Option<u32>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(SAMPLE_RING_SIZE),
            smoothed_offset_ms: 0.0,
            last_rtt_ms: 0.0,
            pending_send_time_ms: None,
        }
    }

    /// Call when sending a `ClockSyncRequest`; records the send time so the
    /// matching reply can be turned into a sample.
    pub fn on_request_sent(&mut self, client_send_time_ms: u32) {
        self.pending_send_time_ms = Some(client_send_time_ms);
    }

    /// Feed a `ClockSyncReply`. `client_receive_time_ms` is the client's own
    /// monotonic clock at the moment the reply arrived. Replies whose
    /// `client_send_time_ms` doesn't match the last request we sent are
    /// ignored (stale reply from a request we've since given up on).
    pub fn on_reply(
        &mut self,
        client_send_time_ms: u32,
        server_receive_time_ms: u32,
        server_send_time_ms: u32,
        client_receive_time_ms: u32,
    ) {
        if self.pending_send_time_ms != Some(client_send_time_ms) {
            return;
        }
        self.pending_send_time_ms = None;

        let client_send = client_send_time_ms as f64;
        let client_receive = client_receive_time_ms as f64;
        let server_receive = server_receive_time_ms as f64;
        let server_send = server_send_time_ms as f64;

        let rtt = (client_receive - client_send) - (server_send - server_receive);
        let server_time_at_receive = server_send + rtt / 2.0;
        let offset = server_time_at_receive - client_receive;

        self.last_rtt_ms = rtt;
        if self.samples.len() == SAMPLE_RING_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { rtt_ms: rtt, offset_ms: offset });

        self.recompute();
    }

    fn recompute(&mut self) {
        if self.samples.is_empty() {
            return;
        }
        if self.samples.len() < MIN_SAMPLES_FOR_MEDIAN {
            let sum: f64 = self.samples.iter().map(|s| s.offset_ms).sum();
            self.smoothed_offset_ms = sum / self.samples.len() as f64;
            return;
        }

        let mut offsets: Vec<f64> = self.samples.iter().map(|s| s.offset_ms).collect();
        offsets.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = median_of_sorted(&offsets);

        let variance = offsets.iter().map(|x| (x - median).powi(2)).sum::<f64>() / offsets.len() as f64;
        let stddev = variance.sqrt();
        let threshold = (1.5 * stddev).max(1.0);

        let survivors: Vec<f64> = offsets
            .iter()
            .copied()
            .filter(|x| (x - median).abs() <= threshold)
            .collect();

        self.smoothed_offset_ms = if survivors.is_empty() {
            median
        } else {
            survivors.iter().sum::<f64>() / survivors.len() as f64
        };
    }

    pub fn smoothed_offset_ms(&self) -> f64 {
        self.smoothed_offset_ms
    }

    pub fn last_rtt_ms(&self) -> f64 {
        self.last_rtt_ms
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Best estimate of the server's current monotonic clock, given the
    /// client's own monotonic clock right now.
    pub fn server_time_now_ms(&self, client_now_ms: u32) -> f64 {
        client_now_ms as f64 + self.smoothed_offset_ms
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_uses_mean_fallback() {
        let mut clock = ClockSync::new();
        clock.on_request_sent(1000);
        clock.on_reply(1000, 1050, 1055, 1100);
        assert_eq!(clock.sample_count(), 1);
        // rtt = (1100-1000) - (1055-1050) = 95; server_time_at_receive = 1055+47.5=1102.5; offset=2.5
        assert!((clock.smoothed_offset_ms() - 2.5).abs() < 0.001);
    }

    #[test]
    fn stale_reply_is_ignored() {
        let mut clock = ClockSync::new();
        clock.on_request_sent(1000);
        clock.on_reply(999, 1050, 1055, 1100);
        assert_eq!(clock.sample_count(), 0);
    }

    #[test]
    fn outlier_sample_is_rejected_once_enough_samples_exist() {
        let mut clock = ClockSync::new();
        for i in 0..5 {
            let t = 1000 + i * 100;
            clock.on_request_sent(t);
            clock.on_reply(t, t + 10, t + 12, t + 30);
        }
        let before = clock.smoothed_offset_ms();

        clock.on_request_sent(2000);
        clock.on_reply(2000, 2010, 2012, 3000);

        let after = clock.smoothed_offset_ms();
        assert!((before - after).abs() < (before.abs() + 1.0));
    }

    #[test]
    fn server_time_now_applies_offset() {
        let mut clock = ClockSync::new();
        clock.on_request_sent(0);
        clock.on_reply(0, 50, 50, 100);
        let server_now = clock.server_time_now_ms(1000);
        assert!((server_now - (1000.0 + clock.smoothed_offset_ms())).abs() < 0.001);
    }
}
