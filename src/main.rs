use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use confique::Config;
use dwf_daq::*;
use log::{info, warn, LevelFilter};
use simplelog::{
    ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::{
    fs::File,
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

const LOG_FILE: &str = "dwf-daq.log";
const DEFAULT_CONFIG: &str = "dwf-daq.toml";

#[derive(Parser)]
#[command(name = "dwf-daq", version)]
#[command(about = "Acquisition and control for Digilent WaveForms instruments")]
struct Cli {
    /// Configuration file, `dwf-daq.toml` when present otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Record from a simulated source instead of a device
    #[arg(long, global = true)]
    simulate: bool,

    /// Log more; repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List connected devices and their capabilities
    Info,
    /// Generate the configured pulse train on a waveform generator channel
    Pulse {
        /// Stop the generator after this many seconds instead of leaving it running
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Replay one column of a CSV capture on a waveform generator channel
    Play(PlayArgs),
    /// Square wave on the configured digital pin
    Clock {
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Triggered acquisitions of the configured scope channels
    Capture {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Start the pulse generator once the scope is armed
        #[arg(long)]
        pulse: bool,
    },
    /// Stream into the host ring buffer until the stop condition
    Record {
        #[arg(long)]
        samples: Option<u64>,
        /// Seconds
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Averaged impedance analyzer measurements
    Impedance {
        #[arg(short = 'n', long)]
        average: Option<usize>,
    },
    /// Decode a quadrature encoder until Ctrl+C
    Quad {
        /// Seconds
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Drive digital pins, then read all of them back
    Dio {
        #[arg(long, value_parser = parse_u32, requires = "value")]
        mask: Option<u32>,
        #[arg(long, value_parser = parse_u32, requires = "mask")]
        value: Option<u32>,
    },
    /// Programmable power supplies; without arguments only reads them
    Supply {
        #[arg(long, allow_negative_numbers = true)]
        positive: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        negative: Option<f64>,
        #[arg(long, conflicts_with_all = ["positive", "negative"])]
        off: bool,
    },
    /// Full duplex SPI transfer of the given bytes
    Spi {
        #[arg(value_parser = parse_u8, num_args = 1..)]
        tx: Vec<u8>,
    },
    /// I2C write, read or write-then-read
    I2c {
        #[arg(long, value_parser = parse_u8)]
        address: u8,
        #[arg(long, value_parser = parse_u8, num_args = 1..)]
        write: Vec<u8>,
        #[arg(long, default_value_t = 0)]
        read: usize,
        /// Only check whether the address acknowledges
        #[arg(long)]
        ping: bool,
        /// Read an ADXL345 style accelerometer at `address`
        #[arg(long)]
        accel: bool,
    },
    /// Chart a CSV capture in the terminal
    View {
        file: PathBuf,
        /// Value column, 0 is the first after time
        #[arg(long, default_value_t = 0)]
        column: usize,
        /// Seconds, exclusive
        #[arg(long)]
        start: Option<f64>,
        /// Seconds, exclusive
        #[arg(long)]
        end: Option<f64>,
        /// Write every value column to this PNG instead of opening the viewer
        #[arg(long)]
        png: Option<PathBuf>,
    },
}

#[derive(Args)]
struct PlayArgs {
    file: PathBuf,
    /// Value column, 0 is the first after time
    #[arg(long, default_value_t = 0)]
    column: usize,
    #[arg(long, default_value_t = 0)]
    channel: i32,
    /// Passes through the file, 0 repeats until stopped
    #[arg(long, default_value_t = 0)]
    repeat: i32,
    /// Degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    phase: f64,
    #[arg(long)]
    seconds: Option<f64>,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{s}: {e}"))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    parse_u32(s).and_then(|v| u8::try_from(v).map_err(|_| format!("{s} does not fit in a byte")))
}

fn load_config(path: Option<&PathBuf>) -> Result<Conf> {
    let mut builder = Conf::builder().env();
    builder = match path {
        Some(path) if !path.exists() => bail!("config file {} not found", path.display()),
        Some(path) => builder.file(path),
        None => builder.file(DEFAULT_CONFIG),
    };
    builder.load().context("loading configuration")
}

/// Terminal and file logging; only the file while the terminal UI is up.
fn init_logging(verbose: u8, screen: bool) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![WriteLogger::new(
        level.max(LevelFilter::Debug),
        simplelog::Config::default(),
        File::create(LOG_FILE).with_context(|| format!("creating {LOG_FILE}"))?,
    )];
    if !screen {
        loggers.push(TermLogger::new(
            level,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

fn load_library(conf: &Conf) -> Result<Arc<Dwf>> {
    let dwf = match &conf.library.path {
        Some(path) => Dwf::load_from(path)?,
        None => Dwf::load()?,
    };
    info!("DWF version: {}", dwf.version()?);
    Ok(Arc::new(dwf))
}

fn open_device(conf: &Conf, dwf: &Arc<Dwf>) -> Result<Device> {
    dwf.param_set(DwfParam::OnClose, conf.device.on_close)?;
    let device = match conf.device.config {
        Some(config) => Device::open_config(Arc::clone(dwf), conf.device.index, config)?,
        None => Device::open(Arc::clone(dwf), conf.device.index)?,
    };
    device.auto_configure_set(conf.device.auto_configure)?;
    Ok(device)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let conf = load_config(cli.config.as_ref())?;
    let screen = match &cli.command {
        Command::Record { .. } => !conf.output.headless,
        Command::View { png, .. } => png.is_none(),
        _ => false,
    };
    init_logging(cli.verbose, screen)?;
    install_interrupt_handler()?;

    match cli.command {
        Command::View {
            file,
            column,
            start,
            end,
            png,
        } => {
            let trace = read_capture_csv(&file)?;
            let start = start.unwrap_or(f64::NEG_INFINITY);
            let end = end.unwrap_or(f64::INFINITY);
            match png {
                Some(png) => {
                    plot_csv_png(&png, &trace, None, start, end)?;
                    info!("Plotted {} to {}", file.display(), png.display());
                    Ok(())
                }
                None => run_csv_view(&trace, column, start, end),
            }
        }
        Command::Record { samples, duration } if cli.simulate => {
            record_simulated(&conf, &stop_condition(&conf, samples, duration))
        }
        Command::Info => {
            let dwf = load_library(&conf)?;
            let entries = enumerate(&dwf)?;
            log_all(&dwf, &entries);
            Ok(())
        }
        command => {
            let dwf = load_library(&conf)?;
            let device = open_device(&conf, &dwf)?;
            let res = run_command(&conf, command, device);
            if let Err(e) = &res {
                log::error!("{e:#}");
            }
            res
        }
    }
}

fn run_command(conf: &Conf, command: Command, device: Device) -> Result<()> {
    if let Command::Quad { duration } = command {
        return quad(conf, device, duration);
    }
    // on errors the handle is closed when `device` drops
    run_on_device(conf, command, &device)?;
    device.close()?;
    Ok(())
}

fn run_on_device(conf: &Conf, command: Command, device: &Device) -> Result<()> {
    match command {
        Command::Pulse { seconds } => pulse(conf, device, seconds),
        Command::Play(args) => play(conf, device, &args),
        Command::Clock { seconds } => clock(conf, device, seconds),
        Command::Capture { count, pulse } => capture(conf, device, count, pulse),
        Command::Record { samples, duration } => {
            record_device(conf, device, &stop_condition(conf, samples, duration))
        }
        Command::Impedance { average } => impedance(conf, device, average),
        Command::Dio { mask, value } => {
            if let (Some(mask), Some(value)) = (mask, value) {
                dio_switch(device, mask, value)?;
            }
            info!("DIO pins: {:#06x}", dio_read(device)?);
            Ok(())
        }
        Command::Supply {
            positive,
            negative,
            off,
        } => {
            if off {
                supplies_off(device)?;
            } else if positive.is_some() || negative.is_some() {
                set_supplies(device, positive, negative)?;
            }
            let reading = read_supplies(device)?;
            info!(
                "Supplies: {:+.3} V, {:+.3} V",
                reading.positive, reading.negative
            );
            Ok(())
        }
        Command::Spi { tx } => {
            configure_spi(device, &SpiSettings::default())?;
            let rx = spi_transfer(device, &tx)?;
            info!("SPI rx: {rx:02x?}");
            Ok(())
        }
        Command::I2c {
            address,
            write,
            read,
            ping,
            accel,
        } => i2c(device, address, &write, read, ping, accel),
        Command::Info | Command::Quad { .. } | Command::View { .. } => Ok(()),
    }
}

/// Ctrl+C while waiting on the instrument ends the command without an
/// error, so the device still gets closed.
fn unless_interrupted<T>(res: Result<T, CaptureError>) -> Result<Option<T>> {
    match res {
        Ok(value) => Ok(Some(value)),
        Err(CaptureError::Interrupted) => {
            warn!("Interrupted");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Waits until `seconds` passed or Ctrl+C; without `seconds` only Ctrl+C ends it.
fn wait_interrupted(seconds: Option<f64>) {
    let t_begin = Instant::now();
    while !interrupted() && seconds.map_or(true, |s| t_begin.elapsed().as_secs_f64() < s) {
        thread::sleep(Duration::from_millis(100));
    }
}

/// Leaves a started generator running, or stops it after `seconds` or
/// Ctrl+C.
fn hold_output<F>(conf: &Conf, seconds: Option<f64>, stop: F) -> Result<()>
where
    F: FnOnce() -> Result<(), DwfError>,
{
    if seconds.is_none() && conf.device.on_close == 0 {
        info!("Output keeps running after exit");
        return Ok(());
    }
    wait_interrupted(seconds);
    stop()?;
    Ok(())
}

/// Seconds a finite generator run takes, with a second of slack.
fn run_timeout(seconds: f64) -> Option<Duration> {
    Some(Duration::from_secs_f64(seconds.max(0.0) + 1.0))
}

fn pulse(conf: &Conf, device: &Device, seconds: Option<f64>) -> Result<()> {
    let settings = conf.pulse.settings();
    settings.validate()?;
    configure_pulse(device, &settings, true)?;
    if settings.trigger == TriggerSource::PC {
        let pause = Duration::from_secs_f64(settings.wait + settings.period);
        for _ in 0..settings.count.max(1) {
            device.trigger_pc()?;
            thread::sleep(pause);
        }
    }
    if settings.count > 0 && seconds.is_none() {
        let total = settings.wait + settings.period * settings.count as f64;
        let res = wait_generator_done(device, settings.channel, run_timeout(total), interrupt_flag());
        if unless_interrupted(res)?.is_some() {
            info!("Pulse train of {} done", settings.count);
        }
        return Ok(());
    }
    hold_output(conf, seconds, || device.analog_out_configure(settings.channel, false))
}

/// Rate at which one pass through `time` takes as long as it was recorded.
fn playback_frequency(time: &[f64]) -> Option<f64> {
    let n = time.len();
    let span = time.last()? - time.first()?;
    if n < 2 || !(span > 0.0) {
        return None;
    }
    // n samples cover n intervals when played back to back
    Some((n - 1) as f64 / (span * n as f64))
}

fn play(conf: &Conf, device: &Device, args: &PlayArgs) -> Result<()> {
    let file = &args.file;
    let trace = read_capture_csv(file)?;
    let samples = trace
        .columns
        .get(args.column)
        .ok_or_else(|| anyhow!("no column {} in {}", args.column, file.display()))?;
    let frequency = playback_frequency(&trace.time)
        .ok_or_else(|| anyhow!("{}: needs two samples with rising time", file.display()))?;
    let waveform = CustomWaveform::from_samples(samples)?;
    configure_custom(device, args.channel, &waveform, frequency, args.phase, args.repeat)?;
    if args.repeat > 0 && args.seconds.is_none() {
        let total = args.repeat as f64 / frequency;
        let res = wait_generator_done(device, args.channel, run_timeout(total), interrupt_flag());
        if unless_interrupted(res)?.is_some() {
            info!("Played {} {} times", file.display(), args.repeat);
        }
        return Ok(());
    }
    hold_output(conf, args.seconds, || device.analog_out_configure(args.channel, false))
}

fn clock(conf: &Conf, device: &Device, seconds: Option<f64>) -> Result<()> {
    configure_clock(device, &conf.clock.settings())?;
    hold_output(conf, seconds, || device.digital_out_configure(false))
}

fn capture(conf: &Conf, device: &Device, count: usize, with_pulse: bool) -> Result<()> {
    let settings = conf.capture.settings();
    let timeout = conf.capture.timeout();
    let shutdown = interrupt_flag();
    let mut captures = Vec::with_capacity(count);
    if with_pulse {
        let pulse = conf.pulse.settings();
        pulse.validate()?;
        configure_pulse(device, &pulse, false)?;
        for _ in 0..count {
            let res = acquire_armed(device, &settings, timeout, shutdown, || {
                device.analog_out_configure(pulse.channel, true)
            });
            match unless_interrupted(res)? {
                Some(capture) => captures.push(capture),
                None => break,
            }
        }
    } else if settings.trigger.source == TriggerSource::PC {
        for _ in 0..count {
            let res = acquire_armed(device, &settings, timeout, shutdown, || device.trigger_pc());
            match unless_interrupted(res)? {
                Some(capture) => captures.push(capture),
                None => break,
            }
        }
    } else if let Some(all) =
        unless_interrupted(acquire_repeated(device, &settings, count, timeout, shutdown))?
    {
        captures = all;
    }

    for capture in &captures {
        let path = save_capture(&conf.output, capture)?;
        match &capture.time {
            Some(t) => info!("Capture at {t} saved to {}", path.display()),
            None => info!("Capture saved to {}", path.display()),
        }
    }
    Ok(())
}

fn impedance(conf: &Conf, device: &Device, average: Option<usize>) -> Result<()> {
    let count = average.unwrap_or(conf.impedance.average).max(1);
    let res = measure_average(
        device,
        &conf.impedance.settings(),
        count,
        conf.capture.timeout(),
        interrupt_flag(),
    );
    let Some(results) = unless_interrupted(res)? else {
        return Ok(());
    };
    for (measurement, value) in results {
        info!(
            "{}: {}",
            measurement.name(),
            format_si(value, measurement.unit())
        );
    }
    Ok(())
}

fn quad(conf: &Conf, device: Device, duration: Option<f64>) -> Result<()> {
    let qc = &conf.quadrature;
    let decoder = QuadratureDecoder::new(qc.pin_a, qc.pin_b, qc.mode, qc.filter);
    let (source, rate) = DigitalInCompressed::configure(Arc::new(device), qc.rate, decoder.mask())?;
    let monitor = QuadMonitor::spawn(source, decoder);

    let t_begin = Instant::now();
    while !interrupted()
        && monitor.is_running()
        && duration.map_or(true, |d| t_begin.elapsed().as_secs_f64() < d)
    {
        thread::sleep(Duration::from_millis(100));
        if let Some(counts) = monitor.take_period() {
            info!(
                "Position {} ({} fwd, {} rev), {:.2} rpm",
                counts.position,
                counts.forward,
                counts.reverse,
                counts.rpm(rate).unwrap_or(0.0)
            );
        }
    }
    let counts = monitor.stop()?;
    info!(
        "Final position {}, lost {}, corrupted {}",
        counts.position, counts.lost, counts.warned
    );
    if counts.lost > 0 {
        warn!("Samples were lost, lower the quadrature rate");
    }
    Ok(())
}

const ADXL_POWER_CTL: u8 = 0x2d;
const ADXL_MEASURE: u8 = 0x08;
const ADXL_DATAX0: u8 = 0x32;

fn i2c(
    device: &Device,
    address: u8,
    write: &[u8],
    read: usize,
    ping: bool,
    accel: bool,
) -> Result<()> {
    configure_i2c(device, &I2cSettings::default())?;
    if ping {
        let present = i2c_ping(device, address)?;
        info!("Address {address:#04x}: {}", if present { "ACK" } else { "NAK" });
        return Ok(());
    }
    if accel {
        i2c_write(device, address, &[ADXL_POWER_CTL, ADXL_MEASURE])?;
        while !interrupted() {
            let raw = i2c_write_read(device, address, &[ADXL_DATAX0], 6)?;
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&raw);
            let acc = Acceleration::from_le_bytes(&bytes);
            info!(
                "x {:+.3} g, y {:+.3} g, z {:+.3} g, |a| {:.3} g",
                acc.x,
                acc.y,
                acc.z,
                acc.magnitude()
            );
            thread::sleep(Duration::from_millis(500));
        }
        return Ok(());
    }
    match (write.is_empty(), read) {
        (true, 0) => bail!("nothing to write or read"),
        (false, 0) => i2c_write(device, address, write)?,
        (true, n) => info!("I2C rx: {:02x?}", i2c_read(device, address, n)?),
        (false, n) => info!("I2C rx: {:02x?}", i2c_write_read(device, address, write, n)?),
    }
    Ok(())
}

fn stop_condition(conf: &Conf, samples: Option<u64>, duration: Option<f64>) -> StopCondition {
    let mut stop = conf.record.stop();
    if samples.is_some() {
        stop.samples = samples;
    }
    if let Some(d) = duration {
        stop.duration = Some(Duration::from_secs_f64(d));
    }
    stop
}

/// Runs the record loop with the status view, or with periodic log lines
/// when headless.
fn run_streams(
    conf: &Conf,
    streams: &mut [&mut dyn Stream],
    stop: &StopCondition,
    rate: f64,
) -> Result<RecordSummary> {
    if !conf.output.headless {
        return run_record_view(streams, stop, interrupt_flag(), rate);
    }
    let mut counter = Counter::new();
    let mut last_total = 0;
    let mut last_log = Instant::now();
    let summary = run_record(streams, stop, interrupt_flag(), |s| {
        let total: u64 = s.iter().map(|stream| stream.summary().total).sum();
        counter.increment(total - last_total);
        last_total = total;
        if last_log.elapsed() >= Duration::from_secs(1) {
            last_log = Instant::now();
            info!(
                "{total} samples, {:.3} MS/s",
                counter.rate() / 1e6
            );
        }
    })?;
    Ok(summary)
}

fn record_simulated(conf: &Conf, stop: &StopCondition) -> Result<()> {
    let rc = &conf.record;
    let source = SimSource::new(rc.frequency, rc.range / 2.0)
        .with_chunk(rc.sim_chunk)
        .with_noise(rc.range / 100.0)
        .paced();
    let mut sim = RecordStream::new("sim", source, rc.ring_capacity, rc.overflow);
    run_streams(conf, &mut [&mut sim], stop, rc.frequency)?;
    let path = save_samples(&conf.output, "sim", rc.frequency, &sim.ring().ordered())?;
    info!("Saved {}", path.display());
    Ok(())
}

fn record_device(conf: &Conf, device: &Device, stop: &StopCondition) -> Result<()> {
    let rc = &conf.record;
    let mixed = match rc.kind {
        RecordKind::Analog => return record_analog(conf, device, stop),
        RecordKind::Digital => false,
        RecordKind::Mixed => true,
    };
    match rc.digital_bits {
        8 => record_digital::<u8>(conf, device, stop, mixed),
        16 => record_digital::<u16>(conf, device, stop, mixed),
        32 => record_digital::<u32>(conf, device, stop, mixed),
        64 => record_digital::<u64>(conf, device, stop, mixed),
        bits => bail!("digital_bits must be 8, 16, 32 or 64, got {bits}"),
    }
}

fn record_analog(conf: &Conf, device: &Device, stop: &StopCondition) -> Result<()> {
    let rc = &conf.record;
    configure_analog_record(device, &rc.analog())?;
    let rate = device.analog_in_frequency_get()?;
    let source = AnalogInRecord::new(device, rc.channel);
    let mut analog = RecordStream::new("analog", source, rc.ring_capacity, rc.overflow);
    device.analog_in_configure(false, true)?;
    run_streams(conf, &mut [&mut analog], stop, rate)?;
    let path = save_samples(&conf.output, "analog", rate, &analog.ring().ordered())?;
    info!("Saved {}", path.display());
    Ok(())
}

fn record_digital<T>(conf: &Conf, device: &Device, stop: &StopCondition, mixed: bool) -> Result<()>
where
    T: DigitalSample + PreviewSample + StoredSample,
{
    let rc = &conf.record;
    let rate = configure_digital_record::<T>(device, &rc.digital())?;
    let source: DigitalInRecord<T> = DigitalInRecord::new(device);
    let mut digital = RecordStream::new("digital", source, rc.ring_capacity, rc.overflow);

    if !mixed {
        device.digital_in_configure(false, true)?;
        run_streams(conf, &mut [&mut digital], stop, rate)?;
        let path = save_samples(&conf.output, "digital", rate, &digital.ring().ordered())?;
        info!("Saved {}", path.display());
        return Ok(());
    }

    // both instruments run at the logic analyzer rate so samples line up
    let mut settings = rc.analog();
    settings.frequency = rate;
    configure_analog_record(device, &settings)?;
    let source = AnalogInRecord::new(device, rc.channel);
    let mut analog = RecordStream::new("analog", source, rc.ring_capacity, rc.overflow);
    device.digital_in_configure(false, true)?;
    device.analog_in_configure(false, true)?;
    run_streams(conf, &mut [&mut analog, &mut digital], stop, rate)?;

    let analog_samples = analog.ring().ordered();
    let digital_samples = digital.ring().ordered();
    let words: Vec<u64> = digital_samples.iter().map(|&w| w.into()).collect();
    match analog_digital_delay(&analog_samples, &words, rc.edge_low, rc.edge_high, rc.edge_mask) {
        Some(delay) => info!(
            "Digital to analog delay: {delay} samples ({:.3e} s)",
            delay as f64 / rate
        ),
        None => warn!("No matching edges for the delay measurement"),
    }
    let path = save_samples(&conf.output, "analog", rate, &analog_samples)?;
    info!("Saved {}", path.display());
    let path = save_samples(&conf.output, "digital", rate, &digital_samples)?;
    info!("Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_parse_as_hex_or_decimal() {
        assert_eq!(parse_u32("0x00ff"), Ok(255));
        assert_eq!(parse_u32(" 42 "), Ok(42));
        assert!(parse_u32("0xzz").is_err());
        assert_eq!(parse_u8("0x53"), Ok(0x53));
        assert!(parse_u8("256").is_err());
    }

    #[test]
    fn playback_takes_as_long_as_the_recording() {
        // 4 samples 1 ms apart play back in 4 ms
        let f = playback_frequency(&[0.0, 1e-3, 2e-3, 3e-3]).unwrap();
        assert!((f - 250.0).abs() < 1e-9);
        assert_eq!(playback_frequency(&[0.0]), None);
        assert_eq!(playback_frequency(&[1.0, 1.0]), None);
        assert_eq!(playback_frequency(&[]), None);
    }

    #[test]
    fn cli_flags_override_the_configured_stop() {
        let conf = Conf::builder().load().unwrap();
        let stop = stop_condition(&conf, Some(10), Some(0.5));
        assert_eq!(stop.samples, Some(10));
        assert_eq!(stop.duration, Some(Duration::from_millis(500)));
    }

    #[test]
    fn headless_simulated_record_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut conf = Conf::builder().load().unwrap();
        conf.output.headless = true;
        conf.output.dir = dir.path().to_string_lossy().into_owned();
        conf.record.frequency = 1e6;
        conf.record.sim_chunk = 1000;
        let stop = StopCondition {
            samples: Some(5000),
            duration: Some(Duration::from_secs(10)),
        };
        record_simulated(&conf, &stop).unwrap();

        let text = std::fs::read_to_string(dir.path().join("run_sim0.csv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Time[s],Voltage[V]"));
        let rows: Vec<(f64, f64)> = lines
            .map(|line| {
                let (t, v) = line.split_once(',').unwrap();
                (t.parse().unwrap(), v.parse().unwrap())
            })
            .collect();
        // the loop stops on the first poll past the target
        assert!(rows.len() >= 5000 && rows.len() < 5000 + 1000, "{}", rows.len());
        assert_eq!(rows[1].0, 1e-6);
        let half_range = conf.record.range / 2.0;
        assert!(rows.iter().all(|&(_, v)| v.abs() <= half_range * 1.1));
    }

    #[test]
    fn interrupted_waits_are_not_errors() {
        assert_eq!(unless_interrupted::<u8>(Err(CaptureError::Interrupted)).unwrap(), None);
        assert_eq!(unless_interrupted(Ok(3)).unwrap(), Some(3));
        let timeout = CaptureError::Timeout {
            waited: Duration::from_secs(1),
            last: DwfState::Armed,
        };
        let err = unless_interrupted::<u8>(Err(timeout)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
