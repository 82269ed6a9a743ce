use clap::{Parser, Subcommand};
use serialport::SerialPortType;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use waterwatch::telemetry::write_csv_path;
use waterwatch::Command as DeviceCommand;
use waterwatch_tools::{init_logging, Session, SourceOpts};

#[derive(Parser, Debug)]
#[command(name = "ww-tool", about = "Water filter device utility")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List serial ports on this machine
    Ports,
    /// Print readings to stdout as they arrive
    Watch {
        #[command(flatten)]
        source: SourceOpts,
        /// Stop after this many readings (default: run until ^C)
        #[arg(short = 'n', long = "count")]
        count: Option<usize>,
    },
    /// Capture readings for a while, then write them out as CSV
    Log {
        #[command(flatten)]
        source: SourceOpts,
        /// Output file
        #[arg(short = 'f', long = "file", default_value = "waterwatch.csv")]
        file: PathBuf,
        /// Number of readings to capture
        #[arg(short = 'n', long = "samples", default_value_t = 100)]
        samples: usize,
        /// Give up after this many seconds even if short of samples
        #[arg(short = 't', long = "timeout", default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Send a single command to the device
    Send {
        #[command(flatten)]
        source: SourceOpts,
        /// START_PUMP, STOP_PUMP, ALARM_OFF or RESET_USE_COUNT
        name: String,
    },
}

fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "{}  usb {:04x}:{:04x}  {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

fn watch(source: &SourceOpts, count: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::start(source)?;
    let tick = session.settings().poll_interval();
    let mut seen = 0usize;
    eprintln!("watching {}", session.describe());
    loop {
        let appended = session.drain();
        if appended > 0 {
            // rows() is aligned, so the tail is exactly what arrived.
            let rows = session.history.rows();
            for row in &rows[rows.len() - appended.min(rows.len())..] {
                println!(
                    "{}  tds {:7.1} ppm  ec {:7.1} uS/cm  suhu {:5.1} C  jarak {:5.1} cm  pompa {}  alarm {}  {}",
                    row.time,
                    row.tds_ppm,
                    row.ec_us_cm,
                    row.temperature_c,
                    row.distance_cm,
                    if row.pump_on { "on " } else { "off" },
                    if row.alarm_active { "ON " } else { "off" },
                    row.water_level
                );
            }
            seen += appended;
        }
        if let Some(limit) = count {
            if seen >= limit {
                break;
            }
        }
        if session.ended {
            eprintln!("feed ended");
            break;
        }
        std::thread::sleep(tick);
    }
    session.stop();
    Ok(())
}

fn log(
    source: &SourceOpts,
    file: &PathBuf,
    samples: usize,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::start(source)?;
    let tick = session.settings().poll_interval();
    let deadline = Instant::now() + timeout;
    eprintln!("logging {} readings from {}", samples, session.describe());
    while session.readings_total < samples as u64 {
        session.drain();
        if session.ended {
            eprintln!("feed ended early");
            break;
        }
        if Instant::now() >= deadline {
            eprintln!("timed out at {} readings", session.readings_total);
            break;
        }
        std::thread::sleep(tick);
    }
    write_csv_path(&session.history, file)?;
    println!("wrote {} rows to {}", session.history.len(), file.display());
    session.stop();
    Ok(())
}

fn send(source: &SourceOpts, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cmd = DeviceCommand::from_name(name);
    let mut session = Session::start(source)?;
    session.send(cmd.clone());
    // Give the feed thread a moment to write the command out, and
    // pick up any status notice the device answers with.
    std::thread::sleep(Duration::from_millis(500));
    session.drain();
    if let Some(notice) = &session.last_status {
        println!("device: {} {}", notice.status, notice.message);
    } else {
        println!("sent {}", cmd);
    }
    session.stop();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");
    let cli = Cli::parse();
    match &cli.command {
        Cmd::Ports => list_ports(),
        Cmd::Watch { source, count } => watch(source, *count),
        Cmd::Log {
            source,
            file,
            samples,
            timeout_secs,
        } => log(source, file, *samples, Duration::from_secs(*timeout_secs)),
        Cmd::Send { source, name } => send(source, name),
    }
}
