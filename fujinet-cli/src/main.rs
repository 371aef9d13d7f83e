use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fujinet_lib::adapter::{NetworkConfig, ScanResult};
use fujinet_lib::config::{BAUD_ENV, DEFAULT_BAUD, PORT_ENV, PortConfig, PortSelector};
use fujinet_lib::constants::{NETWORK_MODE_READ_WRITE, NETWORK_TRANSLATION_NONE};
use fujinet_lib::engine::status_code;
use fujinet_lib::fields::FieldDescriptor;
use fujinet_lib::packet::MAX_SECTOR;
use fujinet_lib::{FujiNet, Generation, Request, Transport};

/// Largest read requested from a network channel in one call
const READ_CHUNK: u16 = MAX_SECTOR as u16;

/// Pause between status polls while a connection is idle
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Talk to a FujiNet adapter over a serial line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port: 1-4 for COM1-COM4, or a device path
    #[arg(short, long, env = PORT_ENV, default_value = "1", global = true)]
    port: PortSelector,
    /// Line speed in bits per second
    #[arg(short, long, env = BAUD_ENV, default_value_t = DEFAULT_BAUD, global = true)]
    baud: u32,
    /// Protocol generation spoken by the adapter firmware
    #[arg(long, value_enum, default_value_t = Protocol::Bus, global = true)]
    protocol: Protocol,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the adapter's network configuration
    Config,
    /// Mount every configured drive slot
    MountAll,
    /// Scan for WiFi networks and list them
    Scan,
    /// Set the WiFi network to join, choosing from a scan when no SSID is given
    SetSsid {
        ssid: Option<String>,
        /// Prompted for when omitted
        password: Option<String>,
        /// Do not persist the credentials on the adapter
        #[arg(long)]
        no_save: bool,
    },
    /// Open a network URL and bridge it to the terminal
    Nc {
        /// Device spec and URL, e.g. N:TCP://bbs.example.com:23
        url: String,
        /// Network channel unit
        #[arg(long, default_value_t = 1)]
        unit: u8,
    },
    /// Issue a raw command and print the status and any data
    Call {
        #[arg(short, long, value_parser = parse_byte)]
        device: u8,
        #[arg(short, long, value_parser = parse_byte)]
        command: u8,
        /// Aux bytes as hex, up to four
        #[arg(short, long, default_value = "")]
        aux: String,
        /// Field descriptor code 0-7, derived from the aux bytes when omitted
        #[arg(short, long)]
        fields: Option<u8>,
        /// Read this many bytes back
        #[arg(long, conflicts_with = "write")]
        read: Option<usize>,
        /// Send these bytes (hex)
        #[arg(long)]
        write: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Protocol {
    Bus,
    Legacy,
}

impl From<Protocol> for Generation {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Bus => Generation::Bus,
            Protocol::Legacy => Generation::Legacy,
        }
    }
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None if s.len() == 1 && !s.as_bytes()[0].is_ascii_digit() => Ok(s.as_bytes()[0]),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Held until main returns so the file writer drains before exit
    let _guard = match setup_logging(cli.log_file.clone(), &cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:?}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = PortConfig {
        port: cli.port.clone(),
        baud: cli.baud,
        ..PortConfig::default()
    };
    let mut fuji = FujiNet::open(&config, cli.protocol.into())
        .with_context(|| format!("Failed to open {} at {} bps", config.port, config.baud))?;

    match cli.command {
        Command::Config => show_config(&mut fuji, cli.json)?,
        Command::MountAll => {
            fuji.mount_all().context("Mount all failed")?;
            println!("All slots mounted.");
        }
        Command::Scan => scan(&mut fuji, cli.json)?,
        Command::SetSsid {
            ssid,
            password,
            no_save,
        } => {
            let mut input = io::stdin().lock();
            set_ssid(&mut fuji, ssid, password, !no_save, &mut input)?;
        }
        Command::Nc { url, unit } => netcat(&mut fuji, &url, unit)?,
        Command::Call {
            device,
            command,
            aux,
            fields,
            read,
            write,
        } => {
            let accepted = raw_call(&mut fuji, device, command, &aux, fields, read, write.as_deref(), cli.json)?;
            if !accepted {
                return Ok(ExitCode::from(2));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn show_config<T: Transport>(fuji: &mut FujiNet<T>, json: bool) -> Result<()> {
    let config = fuji.adapter_config().context("Could not read adapter config")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", config);
    }
    Ok(())
}

fn scan_results<T: Transport>(fuji: &mut FujiNet<T>) -> Result<Vec<ScanResult>> {
    info!("Scanning for networks...");
    let count = fuji.scan_networks().context("Network scan failed")?;

    let mut results = Vec::with_capacity(count as usize);
    for index in 0..count {
        match fuji.scan_result(index) {
            Ok(result) => results.push(result),
            Err(e) => warn!(index, "Could not fetch scan result: {}", e),
        }
    }
    Ok(results)
}

fn print_scan_results(results: &[ScanResult]) {
    if results.is_empty() {
        println!("No networks found.");
    }
    for (index, result) in results.iter().enumerate() {
        println!("{:>3}: {:<32} {:>4} dBm {}", index, result.ssid, result.rssi, result.signal_bars());
    }
}

fn scan<T: Transport>(fuji: &mut FujiNet<T>, json: bool) -> Result<()> {
    let results = scan_results(fuji)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_scan_results(&results);
    }
    Ok(())
}

/// Join a network, asking on `input` for whatever was not given.
///
/// Without an SSID the adapter scans and the user picks an entry by number,
/// or `O` to type another name. An empty answer aborts without sending anything.
fn set_ssid<T: Transport>(
    fuji: &mut FujiNet<T>,
    ssid: Option<String>,
    password: Option<String>,
    save: bool,
    input: &mut impl BufRead,
) -> Result<()> {
    let ssid = match ssid {
        Some(ssid) => ssid,
        None => {
            let results = scan_results(fuji)?;
            print_scan_results(&results);
            match select_ssid(&results, input)? {
                Some(ssid) => ssid,
                None => {
                    println!("No network selected.");
                    return Ok(());
                }
            }
        }
    };
    let password = match password {
        Some(password) => password,
        None => prompt(input, "Password: ")?,
    };

    fuji.set_ssid(&NetworkConfig::new(ssid.as_str(), password), save)
        .context("Set SSID failed")?;
    println!("Network set to {}.", ssid);
    Ok(())
}

fn select_ssid(results: &[ScanResult], input: &mut impl BufRead) -> Result<Option<String>> {
    loop {
        let answer = prompt(input, "Enter network #, 'O' for another SSID, or [Enter] to abort: ")?;
        if answer.is_empty() {
            return Ok(None);
        }
        if answer.eq_ignore_ascii_case("o") {
            let ssid = prompt(input, "SSID: ")?;
            return Ok((!ssid.is_empty()).then_some(ssid));
        }
        match answer.parse::<usize>().ok().and_then(|n| results.get(n)) {
            Some(result) => return Ok(Some(result.ssid.clone())),
            None => println!("No network numbered '{}'.", answer),
        }
    }
}

/// Print `text` and read one line, without its line ending. End of input reads as empty.
fn prompt(input: &mut impl BufRead, text: &str) -> Result<String> {
    print!("{}", text);
    io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read input")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Forward stdin lines to the channel until the remote end disconnects.
fn netcat<T: Transport>(fuji: &mut FujiNet<T>, url: &str, unit: u8) -> Result<()> {
    let stdin = spawn_stdin_reader();
    let mut channel = fuji.network(unit);

    if let Err(e) = channel.open(url, NETWORK_MODE_READ_WRITE, NETWORK_TRANSLATION_NONE) {
        let detail = channel.status().map(|s| s.error).unwrap_or_default();
        let _ = channel.close();
        bail!("Could not open {}: {} (error {})", url, e, detail);
    }
    info!(device = channel.device(), "Connected to {}", url);

    let mut stdout = io::stdout();
    let result = loop {
        match stdin.try_recv() {
            Ok(line) => {
                if let Err(e) = channel.write(&line) {
                    break Err(e).context("Write to network channel failed");
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                debug!("Local input closed");
                break Ok(());
            }
        }

        let status = match channel.status() {
            Ok(status) => status,
            Err(e) => break Err(e).context("Status poll failed"),
        };
        if !status.connected {
            info!("Remote end disconnected");
            break Ok(());
        }
        if status.bytes_waiting == 0 {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        match channel.read(status.bytes_waiting.min(READ_CHUNK)) {
            Ok(data) => {
                if let Err(e) = stdout.write_all(&data).and_then(|_| stdout.flush()) {
                    break Err(e).context("Write to stdout failed");
                }
            }
            Err(e) => break Err(e).context("Read from network channel failed"),
        }
    };

    if let Err(e) = channel.close() {
        warn!("Close failed: {}", e);
    }
    result
}

fn spawn_stdin_reader() -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().split(b'\n') {
            let Ok(mut line) = line else { break };
            line.push(b'\r');
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Issue one request and print its outcome; returns whether the adapter accepted it.
#[allow(clippy::too_many_arguments)]
fn raw_call<T: Transport>(
    fuji: &mut FujiNet<T>,
    device: u8,
    command: u8,
    aux: &str,
    fields: Option<u8>,
    read: Option<usize>,
    write: Option<&str>,
    json: bool,
) -> Result<bool> {
    let aux = hex::decode(aux).context("Aux bytes must be hex")?;
    let write = write.map(hex::decode).transpose().context("Write data must be hex")?;
    let mut buf = vec![0u8; read.unwrap_or(0)];

    let mut request = Request::new(device, command).aux(&aux)?;
    if let Some(code) = fields {
        request = request.fields(FieldDescriptor::from_code(code)?);
    }
    if let Some(data) = write.as_deref() {
        request = request.write(data);
    } else if read.is_some() {
        request = request.read(&mut buf);
    }

    let result = fuji.call(request);
    let status = status_code(&result);
    let received = match &result {
        Ok(completion) => completion.received,
        Err(e) => {
            warn!("Call failed: {}", e);
            0
        }
    };

    let data = hex::encode(&buf[..received]);
    if json {
        let value = serde_json::json!({
            "status": char::from(status).to_string(),
            "received": received,
            "data": data,
        });
        println!("{}", value);
    } else {
        println!("Status: {} ({:#04x})", char::from(status), status);
        if !data.is_empty() {
            println!("Data: {}", data);
        }
    }

    Ok(result.is_ok())
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v (hex dumps of every frame), TRACE with -vv
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fujinet_lib::Engine;
    use fujinet_lib::checksum::checksum;
    use fujinet_lib::scripted::ScriptedTransport;
    use std::io::Cursor;

    fn scan_entry(ssid: &str, rssi: i8) -> Vec<u8> {
        let mut entry = ssid.as_bytes().to_vec();
        entry.resize(33, 0);
        entry.push(rssi as u8);
        entry
    }

    fn legacy_reply(data: &[u8]) -> Vec<u8> {
        let mut reply = b"AC".to_vec();
        reply.extend_from_slice(data);
        reply.push(checksum(data));
        reply
    }

    /// Count, two scan entries, then an accepted SetSsid write.
    fn scanning_adapter() -> FujiNet<ScriptedTransport> {
        let link = ScriptedTransport::new()
            .respond(&legacy_reply(&[2]))
            .respond(&legacy_reply(&scan_entry("Cafe", -40)))
            .respond(&legacy_reply(&scan_entry("HomeNet", -65)))
            .respond(b"A")
            .silent()
            .respond(b"AC");
        FujiNet::new(Engine::new(Generation::Legacy, link))
    }

    fn credentials_sent(fuji: &FujiNet<ScriptedTransport>) -> Vec<u8> {
        let writes = fuji.engine().transport().writes();
        writes.iter().find(|w| w.len() == 97).map(|w| w.to_vec()).unwrap_or_default()
    }

    #[test]
    fn test_parse_byte() {
        assert_eq!(parse_byte("0x70"), Ok(0x70));
        assert_eq!(parse_byte("112"), Ok(112));
        assert_eq!(parse_byte("S"), Ok(b'S'));
        assert!(parse_byte("0x1FF").is_err());
    }

    #[test]
    fn test_set_ssid_pick_from_scan() {
        let mut fuji = scanning_adapter();
        let mut input = Cursor::new("1\nhunter22\n");

        set_ssid(&mut fuji, None, None, true, &mut input).unwrap();

        let sent = credentials_sent(&fuji);
        assert!(sent.starts_with(b"HomeNet\0"));
        assert!(sent[33..].starts_with(b"hunter22\0"));
    }

    #[test]
    fn test_set_ssid_other_network() {
        let mut fuji = scanning_adapter();
        let mut input = Cursor::new("9\no\nHidden\nsecret\n");

        set_ssid(&mut fuji, None, None, true, &mut input).unwrap();

        let sent = credentials_sent(&fuji);
        assert!(sent.starts_with(b"Hidden\0"));
        assert!(sent[33..].starts_with(b"secret\0"));
    }

    #[test]
    fn test_set_ssid_abort_sends_nothing() {
        let mut fuji = scanning_adapter();
        let mut input = Cursor::new("\n");

        set_ssid(&mut fuji, None, None, true, &mut input).unwrap();

        assert!(credentials_sent(&fuji).is_empty());
        assert_eq!(fuji.engine().transport().unused_replies(), 3);
    }

    #[test]
    fn test_set_ssid_prompts_only_for_password() {
        let link = ScriptedTransport::new().respond(b"A").silent().respond(b"AC");
        let mut fuji = FujiNet::new(Engine::new(Generation::Legacy, link));
        let mut input = Cursor::new("pw\r\n");

        set_ssid(&mut fuji, Some("Office".into()), None, false, &mut input).unwrap();

        let sent = credentials_sent(&fuji);
        assert!(sent.starts_with(b"Office\0"));
        assert!(sent[33..].starts_with(b"pw\0"));
    }

    #[test]
    fn test_raw_call_reports_failure() {
        let link = ScriptedTransport::new().respond(b"AE");
        let mut fuji = FujiNet::new(Engine::new(Generation::Legacy, link));
        let accepted = raw_call(&mut fuji, 0x70, 0xD7, "", None, None, None, false).unwrap();
        assert!(!accepted);

        let link = ScriptedTransport::new().respond(&legacy_reply(&[3]));
        let mut fuji = FujiNet::new(Engine::new(Generation::Legacy, link));
        let accepted = raw_call(&mut fuji, 0x70, 0xFD, "", None, Some(1), None, true).unwrap();
        assert!(accepted);
    }

    #[test]
    fn test_cli_set_ssid_arguments_optional() {
        let cli = Cli::try_parse_from(["fujinet", "set-ssid"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::SetSsid {
                ssid: None,
                password: None,
                no_save: false
            }
        ));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["fujinet", "--port", "/dev/ttyUSB0", "config"]).unwrap();
        assert_eq!(cli.port, PortSelector::Path("/dev/ttyUSB0".into()));
        assert_eq!(cli.protocol, Protocol::Bus);
        assert!(matches!(cli.command, Command::Config));
    }

    #[test]
    fn test_cli_raw_call() {
        let cli = Cli::try_parse_from([
            "fujinet", "--protocol", "legacy", "call", "-d", "0x70", "-c", "0xFC", "-a", "02", "--read", "34",
        ])
        .unwrap();
        assert_eq!(Generation::from(cli.protocol), Generation::Legacy);
        match cli.command {
            Command::Call {
                device, command, aux, read, ..
            } => {
                assert_eq!((device, command), (0x70, 0xFC));
                assert_eq!(aux, "02");
                assert_eq!(read, Some(34));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
