//! TideKV CLI Client
//!
//! Interactive prompt for sending queries to a TideKV server.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use clap::Parser;
use tidekv::network::Client;

/// TideKV CLI
#[derive(Parser, Debug)]
#[command(name = "tidekv-cli")]
#[command(about = "CLI for TideKV key-value store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:3223")]
    address: String,

    /// Seconds to wait for a response (0 waits forever)
    #[arg(short, long, default_value = "0")]
    idle_timeout: u64,
}

fn main() {
    let args = Args::parse();

    let mut client = match Client::connect(&args.address, Duration::from_secs(args.idle_timeout)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to connect to {}: {}", args.address, e);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("[tidekv] > ");
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("failed to read query: {e}");
                break;
            }
        }

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        match client.send(query) {
            Ok(response) => println!("{response}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    }
}
