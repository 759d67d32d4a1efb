//! Simulated analog record source for running without hardware.

use crate::constants::DwfState;
use crate::dwf::DwfError;
use crate::source::{RecordSource, RecordStatus};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{f64::consts::TAU, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Lost(usize),
    Corrupted(usize),
}

/// Sine wave plus uniform noise, delivered in fixed chunks.
#[derive(Debug)]
pub struct SimSource {
    rate: f64,
    amplitude: f64,
    signal_hz: f64,
    noise: f64,
    chunk: usize,
    limit: Option<u64>,
    fault: Option<(usize, Fault)>,
    polls: usize,
    base: u64,
    pending: usize,
    started: Option<Instant>,
    rng: StdRng,
}

impl SimSource {
    pub fn new(rate: f64, amplitude: f64) -> Self {
        Self {
            rate,
            amplitude,
            signal_hz: rate / 100.0,
            noise: 0.0,
            chunk: 1024,
            limit: None,
            fault: None,
            polls: 0,
            base: 0,
            pending: 0,
            started: None,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn with_signal(mut self, hz: f64) -> Self {
        self.signal_hz = hz;
        self
    }

    pub fn with_noise(mut self, volts: f64) -> Self {
        self.noise = volts.abs();
        self
    }

    /// Report `Done` after `samples` samples.
    pub fn with_limit(mut self, samples: u64) -> Self {
        self.limit = Some(samples);
        self
    }

    /// Deliver no more samples than `rate` allows since this call.
    pub fn paced(mut self) -> Self {
        self.started = Some(Instant::now());
        self
    }

    /// Inject a fault on poll number `poll` (1-based).
    pub fn with_fault(mut self, poll: usize, fault: Fault) -> Self {
        self.fault = Some((poll, fault));
        self
    }

    fn clean_sample(&self, index: u64) -> f64 {
        self.amplitude * (TAU * self.signal_hz * index as f64 / self.rate).sin()
    }
}

impl RecordSource for SimSource {
    type Sample = f64;

    fn poll(&mut self) -> Result<RecordStatus, DwfError> {
        self.polls += 1;
        self.base += self.pending as u64;
        let remaining = self.limit.map_or(u64::MAX, |l| l.saturating_sub(self.base));
        let due = self.started.map_or(u64::MAX, |t| {
            ((t.elapsed().as_secs_f64() * self.rate) as u64).saturating_sub(self.base)
        });
        self.pending = (self.chunk as u64).min(remaining).min(due) as usize;

        let (lost, corrupted) = match self.fault {
            Some((poll, Fault::Lost(n))) if poll == self.polls => (n, 0),
            Some((poll, Fault::Corrupted(n))) if poll == self.polls => (0, n),
            _ => (0, 0),
        };
        let state = if remaining == 0 {
            DwfState::Done
        } else {
            DwfState::Running
        };
        Ok(RecordStatus {
            state,
            available: self.pending,
            lost,
            corrupted,
        })
    }

    fn read(&mut self, dst: &mut [f64], offset: usize) -> Result<(), DwfError> {
        let first = self.base + offset as u64;
        for (i, slot) in dst.iter_mut().enumerate() {
            let noise = if self.noise > 0.0 {
                self.rng.random_range(-self.noise..=self.noise)
            } else {
                0.0
            };
            *slot = self.clean_sample(first + i as u64) + noise;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{run_record, RecordStream, StopCondition, StopReason};
    use crate::ring::{OverflowPolicy, RecordError};
    use std::sync::atomic::AtomicBool;

    #[test]
    fn wrapped_ring_holds_contiguous_signal() {
        let sim = SimSource::new(1000.0, 1.0).with_chunk(37).with_limit(500);
        let reference = SimSource::new(1000.0, 1.0);
        let mut stream = RecordStream::new("sim", sim, 128, OverflowPolicy::Abort);
        let shutdown = AtomicBool::new(false);
        let summary =
            run_record(&mut [&mut stream], &StopCondition::default(), &shutdown, |_| {}).unwrap();
        assert_eq!(summary.reason, StopReason::Done);
        assert_eq!(summary.streams[0].total, 500);
        assert_eq!(summary.streams[0].wraps, 3);
        assert_eq!(summary.streams[0].cursor, 500 % 128);

        let ordered = stream.ring().ordered();
        assert_eq!(ordered.len(), 128);
        for (i, v) in ordered.iter().enumerate() {
            let expected = reference.clean_sample(500 - 128 + i as u64);
            assert!((v - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn injected_loss_is_fatal() {
        let sim = SimSource::new(1000.0, 1.0)
            .with_chunk(10)
            .with_fault(3, Fault::Lost(5));
        let mut stream = RecordStream::new("sim", sim, 64, OverflowPolicy::Abort);
        let shutdown = AtomicBool::new(false);
        let err = run_record(&mut [&mut stream], &StopCondition::default(), &shutdown, |_| {})
            .unwrap_err();
        assert!(matches!(err, RecordError::Lost { count: 5, .. }));
        assert_eq!(stream.ring().total(), 20);
    }

    #[test]
    fn noise_stays_in_band() {
        let mut sim = SimSource::new(1000.0, 0.0).with_noise(0.25);
        sim.poll().unwrap();
        let mut buffer = vec![0.0; 256];
        sim.read(&mut buffer, 0).unwrap();
        assert!(buffer.iter().all(|v| v.abs() <= 0.25));
        assert!(buffer.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn oversized_chunk_overflows_small_ring() {
        let sim = SimSource::new(1000.0, 1.0).with_chunk(100);
        let mut stream = RecordStream::new("sim", sim, 64, OverflowPolicy::Abort);
        assert!(matches!(stream.step(), Err(RecordError::Overflow { available: 100, .. })));
    }

    #[test]
    fn paced_source_follows_the_clock() {
        let mut sim = SimSource::new(1.0, 1.0).with_chunk(16).paced();
        let status = sim.poll().unwrap();
        assert_eq!(status.available, 0);
        assert_eq!(status.state, DwfState::Running);
    }
}
