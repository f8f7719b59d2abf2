// aesd-send: send lines and/or a seek command, print what the server answers
use aesd_client::{AesdClient, DEFAULT_PORT};
use aesd_core::SeekTo;
use clap::Parser;
use std::io::Write;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "aesd-send")]
#[command(about = "Send lines to an aesdsocket server and print the response", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Server address
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Send a seek command after the lines, as CMD,OFFSET
    #[arg(short, long, value_name = "CMD,OFFSET", value_parser = parse_seek)]
    seek: Option<SeekTo>,

    /// Stop reading after this many quiet milliseconds
    #[arg(long, default_value_t = 500)]
    idle_ms: u64,

    /// Lines to send
    lines: Vec<String>,
}

fn parse_seek(s: &str) -> Result<SeekTo, String> {
    let (cmd, offset) = s.split_once(',').ok_or("expected CMD,OFFSET")?;
    let cmd = cmd.trim().parse().map_err(|e| format!("bad command index: {}", e))?;
    let offset = offset.trim().parse().map_err(|e| format!("bad offset: {}", e))?;
    Ok(SeekTo::new(cmd, offset))
}

fn print_response(client: &mut AesdClient, idle: Duration) {
    match client.receive_until_idle(idle) {
        Ok(response) => {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(&response);
            let _ = stdout.flush();
        }
        Err(e) => {
            eprintln!("Error reading: {}", e);
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.lines.is_empty() && cli.seek.is_none() {
        eprintln!("ERROR: nothing to send");
        process::exit(1);
    }

    let mut client = match AesdClient::connect(&cli.host, cli.port) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to connect to {}:{}: {}", cli.host, cli.port, e);
            process::exit(1);
        }
    };

    let idle = Duration::from_millis(cli.idle_ms);

    for line in &cli.lines {
        if let Err(e) = client.send_line(line) {
            eprintln!("Error sending: {}", e);
            process::exit(1);
        }
        print_response(&mut client, idle);
    }

    if let Some(seek) = cli.seek {
        if let Err(e) = client.seek_to(seek) {
            eprintln!("Error sending seek: {}", e);
            process::exit(1);
        }
        print_response(&mut client, idle);
    }

    let _ = client.disconnect();
}
