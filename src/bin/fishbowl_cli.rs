use std::{
    error::Error,
    io::{self, Write},
    time::Duration,
};

use clap::Parser;
use fishbowl::{
    Command, Fishbowl, ResponseOptions, SessionConfig, prompt,
    protocol::{DEFAULT_HOST, DEFAULT_PORT, RequestValue, TextEncoding, xml},
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Fishbowl server host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    /// Fishbowl server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Socket timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,
    /// Exchange UTF-8 instead of latin-1
    #[arg(long)]
    utf8: bool,
    #[arg(short, long)]
    username: String,
    #[arg(short, long)]
    password: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let config = SessionConfig {
        host: cli.host,
        port: cli.port,
        timeout: Duration::from_secs(cli.timeout),
        encoding: if cli.utf8 {
            TextEncoding::Utf8
        } else {
            TextEncoding::Latin1
        },
    };

    let fishbowl = Fishbowl::new(config);
    fishbowl.connect(&cli.username, &cli.password)?;

    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        if cmd == Command::Exit {
            if let Err(e) = fishbowl.close(false) {
                eprintln!("failed to close connection cleanly. error: {e}");
            }
            break;
        }

        if let Err(e) = run(&fishbowl, cmd, &mut stdout.lock()) {
            eprintln!("request error: {e}");
            if !fishbowl.connected() {
                eprintln!("connection lost");
                break;
            }
        }
    }

    Ok(())
}

fn run(fishbowl: &Fishbowl, cmd: Command, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::Query(sql) => {
            for row in fishbowl.send_query(&sql)? {
                let line: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
                writeln!(out, "{}", line.join(", "))?;
            }
        }
        Command::Parts => {
            for mut part in fishbowl.get_parts(false)? {
                let num = part.get("Num")?.unwrap_or_default();
                let description = part.get("Description")?.unwrap_or_default();
                writeln!(out, "{num}\t{description}")?;
            }
        }
        Command::Customers => {
            for customer in fishbowl.get_customers()? {
                writeln!(out, "{}", customer.label().unwrap_or_default())?;
            }
        }
        Command::Request(name) => {
            let root = fishbowl.send_request(&name, RequestValue::None, &ResponseOptions::default())?;
            writeln!(out, "{}", xml::write_document(&root)?)?;
        }
        Command::Exit => {}
    }
    Ok(())
}
