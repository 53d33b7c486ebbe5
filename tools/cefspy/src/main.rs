use std::fs;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cefspy::{LogFormatter, PacketDecoder, PingRequestBuilder};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Host companion for the CEF debug port")]
struct Opts {
    /// Emit one JSON object per line instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a captured byte stream
    Decode { file: PathBuf },
    /// Build a ping request packet
    Ping {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 1)]
        sequence: u16,
        #[arg(long, default_value_t = 0)]
        test_value: u32,
        /// Write the packet here instead of printing it as hex
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Stream packets from a TCP serial bridge
    Listen {
        #[arg(long, value_name = "ADDR")]
        tcp: String,
        /// Send one ping request after connecting
        #[arg(long)]
        ping: bool,
    },
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    match opts.command {
        Command::Decode { file } => decode_file(&file, opts.json),
        Command::Ping {
            offset,
            sequence,
            test_value,
            out,
        } => {
            let packet = PingRequestBuilder::new()
                .sequence_number(sequence)
                .test_value(test_value)
                .offset(offset)
                .build()
                .map_err(|code| anyhow::anyhow!("cannot encode ping request: {code}"))?;
            match out {
                Some(path) => fs::write(&path, &packet).with_context(|| format!("writing {}", path.display())),
                None => {
                    let hex: Vec<String> = packet.iter().map(|b| format!("{b:02x}")).collect();
                    println!("{}", hex.join(" "));
                    Ok(())
                }
            }
        }
        Command::Listen { tcp, ping } => listen(&tcp, ping, opts.json),
    }
}

fn decode_file(path: &Path, json: bool) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut decoder = PacketDecoder::new();
    let mut formatter = LogFormatter::new(json);
    print_packets(&mut decoder, &mut formatter, &bytes);

    if decoder.skipped_bytes() > 0 {
        eprintln!("{} byte(s) outside any packet", decoder.skipped_bytes());
    }
    if formatter.lost_records() > 0 {
        eprintln!("{} log record(s) lost on the device", formatter.lost_records());
    }
    Ok(())
}

fn listen(addr: &str, ping: bool, json: bool) -> Result<()> {
    let mut stream = TcpStream::connect(addr).with_context(|| format!("connecting to tcp://{addr}"))?;
    stream.set_nodelay(true).ok();
    eprintln!("cefspy connected to tcp://{addr}");

    if ping {
        let packet = PingRequestBuilder::new()
            .build()
            .map_err(|code| anyhow::anyhow!("cannot encode ping request: {code}"))?;
        stream.write_all(&packet).context("sending ping request")?;
    }

    let mut decoder = PacketDecoder::new();
    let mut formatter = LogFormatter::new(json);
    let mut buf = [0u8; 4096];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                eprintln!("connection closed by peer");
                break;
            }
            Ok(len) => print_packets(&mut decoder, &mut formatter, &buf[..len]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("reading from bridge"),
        }
    }

    Ok(())
}

fn print_packets(decoder: &mut PacketDecoder, formatter: &mut LogFormatter, bytes: &[u8]) {
    for result in decoder.push_bytes(bytes) {
        match result {
            Ok(packet) => {
                for line in formatter.format_packet(&packet) {
                    println!("{line}");
                }
            }
            Err(err) => eprintln!("{}", formatter.format_error(&err)),
        }
    }
}
