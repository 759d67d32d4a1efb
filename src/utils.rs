use anyhow::Result;
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

/// Sample statistics with both *all-time* counters and a *sliding 1 s
/// window* rate.
#[derive(Debug, Clone)]
pub struct Counter {
    /// All-time number of samples
    pub n_samples: u64,
    /// All-time number of chunks
    pub n_chunks: u64,
    /// Time when this counter was created or last reset
    pub t_begin: Instant,

    window: Duration,
    chunks: VecDeque<(Instant, u64)>,
    samples_in_window: u64,
}

impl Default for Counter {
    fn default() -> Self {
        Counter {
            n_samples: 0,
            n_chunks: 0,
            t_begin: Instant::now(),
            window: Duration::from_secs(1),
            chunks: VecDeque::new(),
            samples_in_window: 0,
        }
    }
}

impl Counter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Long-term average since t_begin, samples per second
    pub fn average_rate(&self) -> f64 {
        let secs = self.t_begin.elapsed().as_secs_f64().max(1e-6);
        self.n_samples as f64 / secs
    }

    /// Sliding-window rate over the last second, samples per second
    pub fn rate(&self) -> f64 {
        let secs = self.window.as_secs_f64().max(1e-6);
        self.samples_in_window as f64 / secs
    }

    /// Record a chunk of `samples`.
    pub fn increment(&mut self, samples: u64) {
        self.increment_at(Instant::now(), samples);
    }

    fn increment_at(&mut self, now: Instant, samples: u64) {
        self.n_samples += samples;
        self.n_chunks += 1;

        self.chunks.push_back((now, samples));
        self.samples_in_window += samples;

        while let Some(&(ts, n)) = self.chunks.front() {
            if now.duration_since(ts) > self.window {
                self.chunks.pop_front();
                self.samples_in_window -= n;
            } else {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.n_samples = 0;
        self.n_chunks = 0;
        self.t_begin = Instant::now();
        self.chunks.clear();
        self.samples_in_window = 0;
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Routes Ctrl+C into a flag so running loops stop and devices get closed.
pub fn install_interrupt_handler() -> Result<()> {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        anyhow::bail!("could not install the SIGINT handler");
    }
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// The flag set by Ctrl+C, for loops that poll a shutdown flag.
pub fn interrupt_flag() -> &'static AtomicBool {
    &INTERRUPTED
}

/// Next free `{stem}{N}.{ext}` in `dir`, creating `dir` if needed.
pub fn run_file_path(dir: impl AsRef<Path>, stem: &str, ext: &str) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        log::info!("Created output directory {}", dir.display());
    }
    let suffix = format!(".{ext}");
    let max_run = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(stem))
                .and_then(|rest| rest.strip_suffix(&suffix))
                .and_then(|n| n.parse::<usize>().ok())
        })
        .max();
    let next = max_run.map_or(0, |n| n + 1);
    Ok(dir.join(format!("{stem}{next}.{ext}")))
}
