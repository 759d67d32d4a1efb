use crate::{run_record, Counter, CsvTrace, RecordSummary, StopCondition, Stream, StreamSummary};
use anyhow::{anyhow, Result};
use crossbeam_channel::{tick, unbounded, Receiver, Sender, TryRecvError};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    symbols::{self, border},
    text::{Line, Text},
    widgets::{Axis, Block, Chart, Dataset, GraphType, Paragraph, Widget},
    DefaultTerminal, Frame,
};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

/// Samples of the newest stream data drawn in the chart.
const PREVIEW_LEN: usize = 512;
/// Minimum spacing of progress messages from the record loop.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Snapshot sent from the record loop to the screen.
#[derive(Debug, Clone)]
pub struct RecordProgress {
    pub streams: Vec<StreamSummary>,
    /// Newest samples of the first stream.
    pub preview: Vec<f64>,
}

#[derive(Debug)]
pub struct RecordView {
    pub title: String,
    pub counter: Counter,
    pub t_begin: Instant,
    pub sample_rate: f64,
    pub streams: Vec<StreamSummary>,
    pub preview: Vec<(f64, f64)>,
    pub exit: bool,
}

impl RecordView {
    pub fn new(title: &str, sample_rate: f64) -> Self {
        Self {
            title: title.to_string(),
            counter: Counter::new(),
            t_begin: Instant::now(),
            sample_rate,
            streams: Vec::new(),
            preview: Vec::new(),
            exit: false,
        }
    }

    /// Folds one progress message into the view.
    pub fn update(&mut self, progress: RecordProgress) {
        let before: u64 = self.streams.iter().map(|s| s.total).sum();
        let after: u64 = progress.streams.iter().map(|s| s.total).sum();
        self.counter.increment(after.saturating_sub(before));
        self.streams = progress.streams;

        let newest = self.streams.first().map_or(0, |s| s.total);
        let first = newest.saturating_sub(progress.preview.len() as u64);
        self.preview = progress
            .preview
            .iter()
            .enumerate()
            .map(|(i, &v)| ((first + i as u64) as f64 / self.sample_rate, v))
            .collect();
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::ZERO)? {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press {
                    self.handle_key_event(key_event);
                }
            }
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        self.exit |= is_quit(&key_event);
    }

    /// Redraws on every tick until the record loop hangs up or `q` is pressed.
    fn run(
        &mut self,
        terminal: &mut DefaultTerminal,
        rx: Receiver<RecordProgress>,
        shutdown: &AtomicBool,
    ) -> Result<()> {
        let ticker = tick(Duration::from_millis(100));
        loop {
            let _ = ticker.recv();

            let disconnected = loop {
                match rx.try_recv() {
                    Ok(progress) => self.update(progress),
                    Err(TryRecvError::Empty) => break false,
                    Err(TryRecvError::Disconnected) => break true,
                }
            };

            self.handle_events()?;
            if self.exit {
                shutdown.store(true, Ordering::SeqCst);
            }
            terminal.draw(|f| self.draw(f))?;

            if disconnected {
                return Ok(());
            }
        }
    }
}

/// `q`, Esc, or Ctrl+C, which raw mode delivers as a key instead of SIGINT.
fn is_quit(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn stream_lines(view: &RecordView) -> Text<'static> {
    let mut lines = vec![Line::from(vec![
        "Elapsed time: ".into(),
        format!("{:.1}", view.t_begin.elapsed().as_secs_f64()).yellow(),
        " s".into(),
        " Rate: ".into(),
        format!("{:.3}", view.counter.rate() / 1e6).yellow(),
        " MS/s".into(),
    ])];
    for s in &view.streams {
        lines.push(Line::from(vec![
            format!("{}: ", s.name).bold(),
            s.total.to_string().yellow(),
            " samples, ".into(),
            s.wraps.to_string().yellow(),
            " wraps, cursor ".into(),
            s.cursor.to_string().yellow(),
        ]));
    }
    Text::from(lines)
}

fn bounds(points: &[(f64, f64)]) -> ([f64; 2], [f64; 2]) {
    let (mut x, mut y) = ([f64::MAX, f64::MIN], [f64::MAX, f64::MIN]);
    for &(px, py) in points {
        x = [x[0].min(px), x[1].max(px)];
        y = [y[0].min(py), y[1].max(py)];
    }
    if points.is_empty() {
        return ([0.0, 1.0], [-1.0, 1.0]);
    }
    if y[1] - y[0] < f64::EPSILON {
        y = [y[0] - 1.0, y[1] + 1.0];
    }
    (x, y)
}

fn trace_chart<'a>(name: &'a str, points: &'a [(f64, f64)], y_title: &'a str) -> Chart<'a> {
    let (x, y) = bounds(points);
    let dataset = Dataset::default()
        .name(name)
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(points);
    Chart::new(vec![dataset])
        .x_axis(
            Axis::default()
                .title("Time [s]")
                .bounds(x)
                .labels([format!("{:.6}", x[0]), format!("{:.6}", x[1])]),
        )
        .y_axis(
            Axis::default()
                .title(y_title)
                .bounds(y)
                .labels([format!("{:.3}", y[0]), format!("{:.3}", y[1])]),
        )
}

fn frame_block(title: &str) -> Block<'_> {
    let instructions = Line::from(vec![" Quit ".into(), "<Q> ".blue().bold()]);
    Block::bordered()
        .title(Line::from(format!(" {title} ").bold()).centered())
        .title_bottom(instructions.centered())
        .border_set(border::THICK)
}

impl Widget for &RecordView {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = frame_block(&self.title);
        let inner = block.inner(area);
        block.render(area, buf);

        let rows = Layout::vertical([
            Constraint::Length(self.streams.len() as u16 + 1),
            Constraint::Min(0),
        ])
        .split(inner);
        Paragraph::new(stream_lines(self))
            .centered()
            .render(rows[0], buf);

        let name = self.streams.first().map_or("", |s| s.name.as_str());
        trace_chart(name, &self.preview, "Value").render(rows[1], buf);
    }
}

/// Records on the calling thread while a second thread draws progress.
/// Pressing `q` sets `shutdown`, which ends the record like Ctrl+C does.
pub fn run_record_view(
    streams: &mut [&mut dyn Stream],
    stop: &StopCondition,
    shutdown: &AtomicBool,
    sample_rate: f64,
) -> Result<RecordSummary> {
    let (tx, rx): (Sender<RecordProgress>, Receiver<RecordProgress>) = unbounded();
    thread::scope(|s| {
        let screen = s.spawn(|| -> Result<()> {
            let mut terminal = ratatui::init();
            let mut view = RecordView::new("dwf-daq record", sample_rate);
            let res = view.run(&mut terminal, rx, shutdown);
            ratatui::restore();
            res
        });

        let mut last_sent: Option<Instant> = None;
        let record = run_record(streams, stop, shutdown, |streams| {
            if last_sent.is_some_and(|t| t.elapsed() < PROGRESS_INTERVAL) {
                return;
            }
            last_sent = Some(Instant::now());
            let progress = RecordProgress {
                streams: streams.iter().map(|s| s.summary()).collect(),
                preview: streams.first().map_or_else(Vec::new, |s| s.preview(PREVIEW_LEN)),
            };
            // a closed screen only means nothing is drawn anymore
            let _ = tx.send(progress);
        });
        drop(tx);

        let drawn = screen
            .join()
            .map_err(|_| anyhow!("screen thread panicked"))?;
        let summary = record?;
        drawn?;
        Ok(summary)
    })
}

/// Static chart of one CSV column.
pub struct TraceView<'a> {
    pub title: String,
    pub column: &'a str,
    pub points: Vec<(f64, f64)>,
    pub exit: bool,
}

impl Widget for &TraceView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = frame_block(&self.title);
        let inner = block.inner(area);
        block.render(area, buf);
        trace_chart(self.column, &self.points, self.column).render(inner, buf);
    }
}

/// Charts column `index` of `trace` between `start` and `end` seconds.
pub fn run_csv_view(trace: &CsvTrace, index: usize, start: f64, end: f64) -> Result<()> {
    let column = trace
        .headers
        .get(index + 1)
        .ok_or_else(|| anyhow!("no column {index} in trace"))?;
    let mut view = TraceView {
        title: format!("{column} {start} s .. {end} s"),
        column,
        points: crate::window(&trace.points(index), start, end),
        exit: false,
    };
    log::info!("Charting {} points of {column}", view.points.len());

    let mut terminal = ratatui::init();
    let res = (|| -> Result<()> {
        while !view.exit {
            terminal.draw(|f| f.render_widget(&view, f.area()))?;
            if let Event::Key(key) = event::read()? {
                view.exit = key.kind == KeyEventKind::Press && is_quit(&key);
            }
        }
        Ok(())
    })();
    ratatui::restore();
    res
}
