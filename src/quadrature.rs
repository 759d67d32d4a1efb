//! Quadrature encoder decoding over the logic analyzer's compressed record
//! stream. A background thread polls the device and updates the counts
//! under a mutex; the caller reads them whenever it likes.

use crate::constants::{AcquisitionMode, DwfState};
use crate::device::Device;
use crate::dwf::DwfError;
use crate::source::{digital_divider, RecordStatus};
use serde::Deserialize;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Edges counted per encoder cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum QuadMode {
    /// Rising edges of A.
    X1,
    /// Both edges of A.
    X2,
    /// Every edge of A and B.
    #[default]
    X4,
}

impl QuadMode {
    pub fn factor(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuadCounts {
    pub mode: QuadMode,
    pub position: i64,
    pub forward: u64,
    pub reverse: u64,
    /// Samples between the last two counted edges, negative in reverse.
    /// 0 once taken.
    pub last_period: i64,
    pub lost: u64,
    pub warned: u64,
}

impl QuadCounts {
    /// Signed revolutions per minute from the last period.
    pub fn rpm(&self, rate: f64) -> Option<f64> {
        self.frequency(rate).map(|hz| hz * 60.0)
    }

    /// Signed cycle frequency from the last period.
    pub fn frequency(&self, rate: f64) -> Option<f64> {
        (self.last_period != 0)
            .then(|| rate / self.last_period as f64 / self.mode.factor() as f64)
    }
}

#[derive(Debug, Clone)]
pub struct QuadratureDecoder {
    pin_a: u32,
    pin_b: u32,
    /// Edges closer than this many samples to the previous one are ignored.
    filter: u64,
    since_edge: u64,
    prev_a: bool,
    prev_b: bool,
    counts: QuadCounts,
}

impl QuadratureDecoder {
    pub fn new(pin_a: u32, pin_b: u32, mode: QuadMode, filter: u64) -> Self {
        Self {
            pin_a,
            pin_b,
            filter,
            since_edge: 0,
            prev_a: false,
            prev_b: false,
            counts: QuadCounts {
                mode,
                ..Default::default()
            },
        }
    }

    pub fn mask(&self) -> u32 {
        (1 << self.pin_a) | (1 << self.pin_b)
    }

    pub fn counts(&self) -> &QuadCounts {
        &self.counts
    }

    /// One compressed sample: the pin word and how long it stayed, minus one.
    pub fn feed(&mut self, value: u32, stable_minus_one: u32) {
        let a = (value >> self.pin_a) & 1 != 0;
        let b = (value >> self.pin_b) & 1 != 0;
        if self.since_edge > self.filter {
            let direction = match self.counts.mode {
                QuadMode::X1 if !self.prev_a && a => Some(!b),
                QuadMode::X1 => None,
                QuadMode::X2 | QuadMode::X4 if self.prev_a != a => Some(a != b),
                QuadMode::X4 if self.prev_b != b => Some(a == b),
                _ => None,
            };
            match direction {
                Some(true) => {
                    self.counts.last_period = self.since_edge as i64;
                    self.counts.position += 1;
                    self.counts.forward += 1;
                    self.since_edge = 0;
                }
                Some(false) => {
                    self.counts.last_period = -(self.since_edge as i64);
                    self.counts.position -= 1;
                    self.counts.reverse += 1;
                    self.since_edge = 0;
                }
                None => {}
            }
        }
        self.prev_a = a;
        self.prev_b = b;
        self.since_edge += 1 + stable_minus_one as u64;
    }

    /// Feeds `(value, stable - 1)` word pairs. A trailing odd word is ignored.
    pub fn feed_pairs(&mut self, words: &[u32]) {
        for pair in words.chunks_exact(2) {
            self.feed(pair[0], pair[1]);
        }
    }
}

/// Compressed digital record stream.
pub trait CompressedSource {
    fn start(&mut self) -> Result<(), DwfError>;
    /// `available` counts 32-bit words.
    fn poll(&mut self) -> Result<RecordStatus, DwfError>;
    fn read(&mut self, dst: &mut [u32]) -> Result<(), DwfError>;
}

/// Logic analyzer in compressed record mode, sampling only `mask` pins.
pub struct DigitalInCompressed {
    device: Arc<Device>,
}

impl DigitalInCompressed {
    /// Configures the logic analyzer. Returns the effective sample rate.
    pub fn configure(device: Arc<Device>, rate: f64, mask: u32) -> Result<(Self, f64), DwfError> {
        let base = device.digital_in_internal_clock_info()?;
        let divider = digital_divider(base, rate);
        device.digital_in_divider_set(divider)?;
        device.digital_in_sample_format_set(32)?;
        device.digital_in_input_order_set(true)?;
        device.digital_in_acquisition_mode_set(AcquisitionMode::Record)?;
        device.digital_in_sample_sensible_set(mask)?;
        let rate = base / divider as f64;
        log::debug!("Quadrature input: mask {mask:#x}, rate {rate} Hz");
        Ok((Self { device }, rate))
    }
}

impl CompressedSource for DigitalInCompressed {
    fn start(&mut self) -> Result<(), DwfError> {
        self.device.digital_in_configure(false, true)
    }

    fn poll(&mut self) -> Result<RecordStatus, DwfError> {
        let state = self.device.digital_in_status(true)?;
        let (available, lost, corrupted) = self.device.digital_in_status_compress()?;
        Ok(RecordStatus {
            state,
            available: available.max(0) as usize,
            lost: lost.max(0) as usize,
            corrupted: corrupted.max(0) as usize,
        })
    }

    fn read(&mut self, dst: &mut [u32]) -> Result<(), DwfError> {
        self.device.digital_in_status_compressed(dst)
    }
}

/// Words read per poll at most.
pub const COMPRESSED_BUFFER: usize = 1 << 20;

const IDLE_POLL: Duration = Duration::from_millis(1);

pub struct QuadMonitor {
    decoder: Arc<Mutex<QuadratureDecoder>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), DwfError>>>,
}

impl QuadMonitor {
    pub fn spawn<S>(source: S, decoder: QuadratureDecoder) -> Self
    where
        S: CompressedSource + Send + 'static,
    {
        Self::spawn_with_buffer(source, decoder, COMPRESSED_BUFFER)
    }

    pub fn spawn_with_buffer<S>(mut source: S, decoder: QuadratureDecoder, words: usize) -> Self
    where
        S: CompressedSource + Send + 'static,
    {
        let decoder = Arc::new(Mutex::new(decoder));
        let running = Arc::new(AtomicBool::new(true));
        let shared = Arc::clone(&decoder);
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            let result = receive(&mut source, &shared, &flag, words.max(2));
            flag.store(false, Ordering::SeqCst);
            if let Err(e) = &result {
                log::error!("Quadrature receive stopped: {e}");
            }
            result
        });
        Self {
            decoder,
            running,
            handle: Some(handle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QuadratureDecoder> {
        self.decoder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> QuadCounts {
        *self.lock().counts()
    }

    /// The last period, cleared so each edge is reported once.
    pub fn take_period(&self) -> Option<QuadCounts> {
        let mut decoder = self.lock();
        if decoder.counts.last_period == 0 {
            return None;
        }
        let counts = decoder.counts;
        decoder.counts.last_period = 0;
        Some(counts)
    }

    /// False once the receive thread ended, normally or on error.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(mut self) -> Result<QuadCounts, DwfError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => log::error!("Quadrature receive thread panicked"),
            }
        }
        Ok(self.snapshot())
    }
}

impl Drop for QuadMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn receive<S: CompressedSource>(
    source: &mut S,
    decoder: &Mutex<QuadratureDecoder>,
    running: &AtomicBool,
    words: usize,
) -> Result<(), DwfError> {
    let mut buffer = vec![0u32; words];
    source.start()?;
    while running.load(Ordering::SeqCst) {
        let status = source.poll()?;
        if status.available == 0 {
            if status.state == DwfState::Done {
                break;
            }
            thread::sleep(IDLE_POLL);
            continue;
        }
        let n = status.available.min(buffer.len()) & !1;
        source.read(&mut buffer[..n])?;

        let mut decoder = decoder.lock().unwrap_or_else(|p| p.into_inner());
        let counts = &mut decoder.counts;
        counts.lost += (status.available - n + status.lost) as u64;
        counts.warned += status.corrupted as u64;
        decoder.feed_pairs(&buffer[..n]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::VecDeque, time::Instant};

    const A: u32 = 1 << 0;
    const B: u32 = 1 << 1;
    const FORWARD: [u32; 4] = [A, A | B, B, 0];

    fn run(decoder: &mut QuadratureDecoder, values: &[u32], stable: u32) {
        for &v in values {
            decoder.feed(v, stable);
        }
    }

    fn forward_cycles(n: usize) -> Vec<u32> {
        let mut v = vec![0];
        for _ in 0..n {
            v.extend_from_slice(&FORWARD);
        }
        v
    }

    #[test]
    fn x4_counts_every_edge() {
        let mut d = QuadratureDecoder::new(0, 1, QuadMode::X4, 2);
        run(&mut d, &forward_cycles(3), 9);
        assert_eq!(d.counts().position, 12);
        assert_eq!(d.counts().forward, 12);
        assert_eq!(d.counts().last_period, 10);
    }

    #[test]
    fn x2_and_x1_count_fewer_edges() {
        let mut d = QuadratureDecoder::new(0, 1, QuadMode::X2, 2);
        run(&mut d, &forward_cycles(3), 9);
        assert_eq!(d.counts().position, 6);
        assert_eq!(d.counts().last_period, 20);

        let mut d = QuadratureDecoder::new(0, 1, QuadMode::X1, 2);
        run(&mut d, &forward_cycles(3), 9);
        assert_eq!(d.counts().position, 3);
        assert_eq!(d.counts().last_period, 40);
    }

    #[test]
    fn reverse_rotation_counts_down() {
        let mut d = QuadratureDecoder::new(0, 1, QuadMode::X4, 2);
        let mut values = forward_cycles(2);
        values.reverse();
        run(&mut d, &values, 9);
        assert_eq!(d.counts().position, -8);
        assert_eq!(d.counts().reverse, 8);
        assert_eq!(d.counts().forward, 0);
        assert_eq!(d.counts().last_period, -10);
    }

    #[test]
    fn short_pulses_are_filtered() {
        let mut d = QuadratureDecoder::new(0, 1, QuadMode::X4, 2);
        d.feed(0, 99);
        // A glitch of one sample
        d.feed(A, 0);
        d.feed(0, 99);
        assert_eq!(d.counts().forward, 1);
        assert_eq!(d.counts().reverse, 0);
        assert_eq!(d.counts().position, 1);
    }

    #[test]
    fn speed_from_period() {
        let counts = QuadCounts {
            mode: QuadMode::X4,
            last_period: 25_000,
            ..Default::default()
        };
        assert_eq!(counts.frequency(100e6), Some(1000.0));
        assert_eq!(counts.rpm(100e6), Some(60_000.0));

        let reverse = QuadCounts {
            last_period: -25_000,
            ..counts
        };
        assert_eq!(reverse.frequency(100e6), Some(-1000.0));
        assert_eq!(QuadCounts::default().rpm(100e6), None);
    }

    #[test]
    fn odd_word_counts_ignore_the_tail() {
        let mut d = QuadratureDecoder::new(0, 1, QuadMode::X4, 0);
        d.feed_pairs(&[0, 9, A, 9, A | B]);
        assert_eq!(d.counts().position, 1);
    }

    struct Fake {
        chunks: VecDeque<(Vec<u32>, usize, usize, usize)>,
        pending: Vec<u32>,
    }

    impl CompressedSource for Fake {
        fn start(&mut self) -> Result<(), DwfError> {
            Ok(())
        }

        fn poll(&mut self) -> Result<RecordStatus, DwfError> {
            let (words, extra, lost, corrupted) = match self.chunks.pop_front() {
                Some(chunk) => chunk,
                None => {
                    return Ok(RecordStatus {
                        state: DwfState::Done,
                        available: 0,
                        lost: 0,
                        corrupted: 0,
                    })
                }
            };
            let available = words.len() + extra;
            self.pending = words;
            Ok(RecordStatus {
                state: DwfState::Running,
                available,
                lost,
                corrupted,
            })
        }

        fn read(&mut self, dst: &mut [u32]) -> Result<(), DwfError> {
            let n = dst.len().min(self.pending.len());
            dst[..n].copy_from_slice(&self.pending[..n]);
            Ok(())
        }
    }

    fn pairs(values: &[u32], stable: u32) -> Vec<u32> {
        values.iter().flat_map(|&v| [v, stable]).collect()
    }

    fn wait_stopped(monitor: &QuadMonitor) {
        let t = Instant::now();
        while monitor.is_running() && t.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn monitor_decodes_in_background() {
        let fake = Fake {
            chunks: VecDeque::from([
                (pairs(&forward_cycles(1), 9), 0, 0, 0),
                (pairs(&FORWARD, 9), 0, 3, 1),
            ]),
            pending: Vec::new(),
        };
        let monitor = QuadMonitor::spawn(fake, QuadratureDecoder::new(0, 1, QuadMode::X4, 2));
        wait_stopped(&monitor);
        let period = monitor.take_period().unwrap();
        assert_eq!(period.last_period, 10);
        assert!(monitor.take_period().is_none());

        let counts = monitor.stop().unwrap();
        assert_eq!(counts.position, 8);
        assert_eq!(counts.lost, 3);
        assert_eq!(counts.warned, 1);
    }

    #[test]
    fn chunks_beyond_the_buffer_count_as_lost() {
        let fake = Fake {
            chunks: VecDeque::from([(pairs(&[0, A], 9), 6, 0, 0)]),
            pending: Vec::new(),
        };
        let monitor =
            QuadMonitor::spawn_with_buffer(fake, QuadratureDecoder::new(0, 1, QuadMode::X4, 2), 4);
        wait_stopped(&monitor);
        let counts = monitor.stop().unwrap();
        assert_eq!(counts.lost, 6);
        assert_eq!(counts.position, 1);
    }

    struct Failing;

    impl CompressedSource for Failing {
        fn start(&mut self) -> Result<(), DwfError> {
            Err(DwfError::BusError)
        }

        fn poll(&mut self) -> Result<RecordStatus, DwfError> {
            unreachable!()
        }

        fn read(&mut self, _: &mut [u32]) -> Result<(), DwfError> {
            unreachable!()
        }
    }

    #[test]
    fn thread_errors_surface_on_stop() {
        let monitor = QuadMonitor::spawn(Failing, QuadratureDecoder::new(0, 1, QuadMode::X1, 0));
        wait_stopped(&monitor);
        assert!(!monitor.is_running());
        assert_eq!(monitor.stop().unwrap_err(), DwfError::BusError);
    }
}
