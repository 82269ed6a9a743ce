use clap::Parser;
use crossterm::ExecutableCommand;
use crossterm::{
    cursor::*,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    style::*,
    terminal::*,
};
use std::io::{stdout, Write};
use waterwatch::telemetry::write_csv_path;
use waterwatch::Command;
use waterwatch_tools::{init_logging, Session, SourceOpts};

#[derive(Parser, Debug)]
#[command(name = "ww-monitor", about = "Live water-filtration telemetry monitor")]
struct MonitorOpts {
    #[command(flatten)]
    source: SourceOpts,
}

fn draw(out: &mut impl Write, session: &Session, notice: &str) -> std::io::Result<()> {
    out.execute(MoveTo(0, 0))?;
    out.execute(Clear(ClearType::CurrentLine))?;
    println!(
        "\rwaterwatch monitor  [{}]  readings: {}  dropped: {}",
        session.describe(),
        session.readings_total,
        session.parse_drops
    );

    out.execute(MoveTo(0, 2))?;
    match session.history.last() {
        Some(r) => {
            let rows = [
                format!("TDS      {:>8.1} ppm", r.tds_ppm),
                format!("EC       {:>8.1} uS/cm", r.ec_us_cm),
                format!("Suhu     {:>8.1} C", r.temperature_c),
                format!("Jarak    {:>8.1} cm", r.distance_cm),
                format!("Pompa    {:>8}", if r.pump_on { "ON" } else { "OFF" }),
                format!("Alarm    {:>8}", if r.alarm_active { "ACTIVE" } else { "off" }),
                format!("Level    {:>8}", r.water_level),
                format!("Waktu    {:>8}", r.timestamp.format("%H:%M:%S")),
            ];
            for line in rows {
                out.execute(Clear(ClearType::CurrentLine))?;
                println!("\r  {}", line);
            }
        }
        None => {
            out.execute(Clear(ClearType::CurrentLine))?;
            println!("\r  waiting for data...");
        }
    }

    out.execute(MoveTo(0, 11))?;
    out.execute(Clear(ClearType::CurrentLine))?;
    if let Some(count) = session.usage.current() {
        println!("\r  use count: {}", count);
    } else {
        println!("\r");
    }

    out.execute(MoveTo(0, 12))?;
    out.execute(Clear(ClearType::CurrentLine))?;
    if let Some(p) = &session.last_payload {
        let mark = |b: bool| if b { "yes" } else { "no" };
        println!(
            "\r  efficiency {:.1}%  probes in:{} out:{}  low water:{}  tds high in:{} out:{}",
            p.filter_efficiency,
            mark(p.probe_input_in_water),
            mark(p.probe_output_in_water),
            mark(p.low_water),
            mark(p.tds_high_input),
            mark(p.tds_high_output),
        );
    } else {
        println!("\r");
    }

    out.execute(MoveTo(0, 13))?;
    out.execute(Clear(ClearType::CurrentLine))?;
    match (&session.last_status, &session.last_error) {
        (_, Some(err)) => println!("\r  ! {}", err),
        (Some(st), None) => println!("\r  device: {} {}", st.status, st.message),
        (None, None) => println!("\r"),
    }

    out.execute(MoveTo(0, 15))?;
    out.execute(Clear(ClearType::CurrentLine))?;
    println!("\r  {}", notice);
    out.execute(MoveTo(0, 16))?;
    out.execute(Clear(ClearType::CurrentLine))?;
    println!("\r  [p]ump start  st[o]p  [a]larm off  [r]eset count  [c]lear  [e]xport  [q]uit");
    out.flush()
}

fn run_monitor(opts: &MonitorOpts) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::start(&opts.source)?;
    let tick = session.settings().poll_interval();
    let mut out = stdout();
    let mut notice = String::new();

    'monitor: loop {
        session.drain();
        if session.ended {
            notice = "feed ended, press q to exit".to_string();
        }
        draw(&mut out, &session, &notice)?;

        // The tick doubles as the input poll timeout.
        if event::poll(tick)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press {
                    continue;
                }
                match code {
                    KeyCode::Char('q') | KeyCode::Esc => break 'monitor,
                    KeyCode::Char('c') => {
                        session.clear();
                        notice = "history cleared".to_string();
                    }
                    KeyCode::Char('e') => {
                        let path = format!(
                            "waterwatch-{}.csv",
                            chrono::Local::now().format("%Y%m%d-%H%M%S")
                        );
                        match write_csv_path(&session.history, &path) {
                            Ok(()) => notice = format!("exported {}", path),
                            Err(e) => notice = format!("export failed: {}", e),
                        }
                    }
                    KeyCode::Char('p') => {
                        session.send(Command::StartPump);
                        notice = "sent START_PUMP".to_string();
                    }
                    KeyCode::Char('o') => {
                        session.send(Command::StopPump);
                        notice = "sent STOP_PUMP".to_string();
                    }
                    KeyCode::Char('a') => {
                        session.send(Command::AlarmOff);
                        notice = "sent ALARM_OFF".to_string();
                    }
                    KeyCode::Char('r') => {
                        session.send(Command::ResetUseCount);
                        notice = "sent RESET_USE_COUNT".to_string();
                    }
                    _ => {}
                }
            }
        }
    }

    session.stop();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = MonitorOpts::parse();
    init_logging("warn");

    let mut out = stdout();
    enable_raw_mode()?;
    out.execute(EnterAlternateScreen)?;
    out.execute(SetForegroundColor(Color::White))?;
    out.execute(Clear(ClearType::All))?;
    out.execute(Hide)?;

    let result = run_monitor(&opts);

    out.execute(LeaveAlternateScreen)?;
    out.execute(Show)?;
    disable_raw_mode()?;

    result
}
