use crate::constants::DwfState;
use crate::ring::{OverflowPolicy, RecordError, RingBuffer};
use crate::source::RecordSource;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

/// A record source paired with the host ring it fills.
pub struct RecordStream<S: RecordSource> {
    name: String,
    source: S,
    ring: RingBuffer<S::Sample>,
    policy: OverflowPolicy,
    last_state: DwfState,
}

impl<S: RecordSource> RecordStream<S> {
    pub fn new(name: &str, source: S, capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            name: name.to_string(),
            source,
            ring: RingBuffer::with_capacity(capacity),
            policy,
            last_state: DwfState::Ready,
        }
    }

    pub fn ring(&self) -> &RingBuffer<S::Sample> {
        &self.ring
    }

    pub fn into_ring(self) -> RingBuffer<S::Sample> {
        self.ring
    }

    /// One poll cycle. Returns the number of samples copied.
    pub fn step(&mut self) -> Result<usize, RecordError> {
        let status = self.source.poll()?;
        self.last_state = status.state;
        if status.lost > 0 {
            return Err(RecordError::Lost {
                stream: self.name.clone(),
                count: status.lost,
            });
        }
        if status.corrupted > 0 {
            return Err(RecordError::Corrupted {
                stream: self.name.clone(),
                count: status.corrupted,
            });
        }
        if status.available == 0 {
            return Ok(0);
        }
        let source = &mut self.source;
        let plan = self
            .ring
            .ingest(&self.name, status.available, self.policy, |dst, offset| {
                source.read(dst, offset)
            })?;
        Ok(plan.len())
    }
}

/// Object-safe view of a stream so analog and digital streams share one loop.
pub trait Stream {
    fn name(&self) -> &str;
    fn step(&mut self) -> Result<usize, RecordError>;
    fn summary(&self) -> StreamSummary;
    fn state(&self) -> DwfState;
    /// Newest samples converted to `f64` for display.
    fn preview(&self, n: usize) -> Vec<f64>;
}

/// Lossy conversion of a sample for charts and CSV dumps.
pub trait PreviewSample: Copy {
    fn to_f64(self) -> f64;
}

impl PreviewSample for f64 {
    fn to_f64(self) -> f64 {
        self
    }
}

macro_rules! preview_word {
    ($($t:ty),*) => {
        $(impl PreviewSample for $t {
            fn to_f64(self) -> f64 {
                self as f64
            }
        })*
    };
}

preview_word!(u8, u16, u32, u64);

impl<S> Stream for RecordStream<S>
where
    S: RecordSource,
    S::Sample: PreviewSample,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self) -> Result<usize, RecordError> {
        RecordStream::step(self)
    }

    fn summary(&self) -> StreamSummary {
        StreamSummary {
            name: self.name.clone(),
            total: self.ring.total(),
            cursor: self.ring.cursor(),
            wraps: self.ring.wraps(),
        }
    }

    fn state(&self) -> DwfState {
        self.last_state
    }

    fn preview(&self, n: usize) -> Vec<f64> {
        self.ring.latest(n).into_iter().map(PreviewSample::to_f64).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub name: String,
    pub total: u64,
    pub cursor: usize,
    pub wraps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every stream collected the requested number of samples.
    SampleTarget,
    Timeout,
    Interrupted,
    /// The device finished a finite record.
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StopCondition {
    pub samples: Option<u64>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RecordSummary {
    pub reason: StopReason,
    pub elapsed: Duration,
    pub streams: Vec<StreamSummary>,
}

/// Sleep between polls that returned no data.
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Drives all streams until the stop condition, an interrupt or an error.
/// `on_progress` sees the streams after every cycle that copied data.
pub fn run_record<F>(
    streams: &mut [&mut dyn Stream],
    stop: &StopCondition,
    shutdown: &AtomicBool,
    mut on_progress: F,
) -> Result<RecordSummary, RecordError>
where
    F: FnMut(&[&mut dyn Stream]),
{
    let t_begin = Instant::now();
    let reason = loop {
        if shutdown.load(Ordering::SeqCst) {
            break StopReason::Interrupted;
        }
        if let Some(limit) = stop.duration {
            if t_begin.elapsed() >= limit {
                break StopReason::Timeout;
            }
        }

        let mut copied = 0;
        let mut finished = true;
        for stream in streams.iter_mut() {
            let n = stream.step()?;
            copied += n;
            finished &= n == 0 && stream.state().is_done();
        }

        if copied > 0 {
            on_progress(streams);
        }
        if let Some(target) = stop.samples {
            if streams.iter().all(|s| s.summary().total >= target) {
                break StopReason::SampleTarget;
            }
        }
        if finished && !streams.is_empty() {
            break StopReason::Done;
        }
        if copied == 0 {
            thread::sleep(IDLE_POLL);
        }
    };

    let summary = RecordSummary {
        reason,
        elapsed: t_begin.elapsed(),
        streams: streams.iter().map(|s| s.summary()).collect(),
    };
    for s in &summary.streams {
        log::info!(
            "{}: {} samples, {} wraps, cursor {}",
            s.name,
            s.total,
            s.wraps,
            s.cursor
        );
    }
    log::info!("Record stopped: {:?} after {:?}", reason, summary.elapsed);
    Ok(summary)
}

/// Delay in samples between the first rising edge of the digital trace
/// (bits in `mask`) and the first analog crossing from below `low` to above
/// `high`. Positive when the analog edge comes later.
pub fn analog_digital_delay(
    analog: &[f64],
    digital: &[u64],
    low: f64,
    high: f64,
    mask: u64,
) -> Option<i64> {
    let d_low = digital.iter().position(|&v| v & mask == 0)?;
    let d = d_low + digital[d_low..].iter().position(|&v| v & mask != 0)?;
    let a_low = analog.iter().position(|&v| v < low)?;
    let a = a_low + analog[a_low..].iter().position(|&v| v > high)?;
    Some(a as i64 - d as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwf::DwfError;
    use crate::sim::SimSource;
    use crate::source::RecordStatus;
    use std::collections::VecDeque;

    /// Replays scripted polls; every read fills with the absolute sample index.
    struct Scripted {
        polls: VecDeque<RecordStatus>,
        produced: u64,
        reads: Vec<(usize, usize)>,
    }

    impl Scripted {
        fn new(chunks: &[(usize, usize, usize)]) -> Self {
            Self {
                polls: chunks
                    .iter()
                    .map(|&(available, lost, corrupted)| RecordStatus {
                        state: DwfState::Running,
                        available,
                        lost,
                        corrupted,
                    })
                    .collect(),
                produced: 0,
                reads: Vec::new(),
            }
        }
    }

    impl RecordSource for Scripted {
        type Sample = u32;

        fn poll(&mut self) -> Result<RecordStatus, DwfError> {
            Ok(self.polls.pop_front().unwrap_or(RecordStatus {
                state: DwfState::Done,
                available: 0,
                lost: 0,
                corrupted: 0,
            }))
        }

        fn read(&mut self, dst: &mut [u32], offset: usize) -> Result<(), DwfError> {
            self.reads.push((dst.len(), offset));
            for slot in dst.iter_mut() {
                *slot = self.produced as u32;
                self.produced += 1;
            }
            Ok(())
        }
    }

    #[test]
    fn scripted_record_runs_to_done() {
        let mut stream = RecordStream::new(
            "digital",
            Scripted::new(&[(40, 0, 0), (0, 0, 0), (50, 0, 0), (30, 0, 0)]),
            100,
            OverflowPolicy::Abort,
        );
        let shutdown = AtomicBool::new(false);
        let mut progress = 0;
        let summary = run_record(
            &mut [&mut stream],
            &StopCondition::default(),
            &shutdown,
            |_| progress += 1,
        )
        .unwrap();
        assert_eq!(summary.reason, StopReason::Done);
        assert_eq!(progress, 3);
        assert_eq!(
            summary.streams[0],
            StreamSummary {
                name: "digital".into(),
                total: 120,
                cursor: 20,
                wraps: 1
            }
        );
        assert_eq!(stream.source.reads, vec![(40, 0), (50, 0), (10, 0), (20, 10)]);
        assert_eq!(stream.ring().ordered(), (20..120).collect::<Vec<u32>>());
    }

    #[test]
    fn lost_samples_end_the_run() {
        let mut stream = RecordStream::new(
            "analog",
            Scripted::new(&[(10, 0, 0), (10, 4, 0), (10, 0, 0)]),
            64,
            OverflowPolicy::Abort,
        );
        let shutdown = AtomicBool::new(false);
        let err = run_record(&mut [&mut stream], &StopCondition::default(), &shutdown, |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            RecordError::Lost {
                stream: "analog".into(),
                count: 4
            }
        );
        assert_eq!(stream.ring().total(), 10);
    }

    #[test]
    fn corrupted_samples_end_the_run() {
        let mut stream = RecordStream::new(
            "analog",
            Scripted::new(&[(0, 0, 2)]),
            64,
            OverflowPolicy::KeepNewest,
        );
        let err = stream.step().unwrap_err();
        assert!(matches!(err, RecordError::Corrupted { count: 2, .. }));
    }

    #[test]
    fn sample_target_waits_for_every_stream() {
        let mut fast = RecordStream::new(
            "fast",
            Scripted::new(&[(60, 0, 0), (60, 0, 0)]),
            1000,
            OverflowPolicy::Abort,
        );
        let mut slow = RecordStream::new(
            "slow",
            Scripted::new(&[(20, 0, 0), (20, 0, 0), (20, 0, 0), (20, 0, 0), (20, 0, 0)]),
            1000,
            OverflowPolicy::Abort,
        );
        let stop = StopCondition {
            samples: Some(100),
            duration: None,
        };
        let shutdown = AtomicBool::new(false);
        let summary = run_record(&mut [&mut fast, &mut slow], &stop, &shutdown, |_| {}).unwrap();
        assert_eq!(summary.reason, StopReason::SampleTarget);
        assert_eq!(summary.streams[0].total, 120);
        assert_eq!(summary.streams[1].total, 100);
    }

    #[test]
    fn interrupt_flag_stops_before_polling() {
        let mut stream = RecordStream::new("a", Scripted::new(&[(5, 0, 0)]), 8, OverflowPolicy::Abort);
        let shutdown = AtomicBool::new(true);
        let summary =
            run_record(&mut [&mut stream], &StopCondition::default(), &shutdown, |_| {}).unwrap();
        assert_eq!(summary.reason, StopReason::Interrupted);
        assert_eq!(summary.streams[0].total, 0);
    }

    #[test]
    fn timeout_stops_endless_source() {
        let mut stream = RecordStream::new(
            "sim",
            SimSource::new(1e3, 1.0).with_chunk(16),
            256,
            OverflowPolicy::Abort,
        );
        let stop = StopCondition {
            samples: None,
            duration: Some(Duration::from_millis(30)),
        };
        let shutdown = AtomicBool::new(false);
        let summary = run_record(&mut [&mut stream], &stop, &shutdown, |_| {}).unwrap();
        assert_eq!(summary.reason, StopReason::Timeout);
        assert!(summary.streams[0].total > 0);
    }

    #[test]
    fn delay_between_edges() {
        let digital: Vec<u64> = vec![1, 1, 0, 0, 1, 1, 1, 1, 1, 1];
        let analog = vec![2.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.5, 2.0, 2.0, 2.0];
        assert_eq!(analog_digital_delay(&analog, &digital, 1.3, 1.4, 1), Some(2));
        assert_eq!(analog_digital_delay(&[0.0; 4], &digital, 1.3, 1.4, 1), None);
    }
}
