use log_follow::{Consumer, FollowConfig, FollowLoop};
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "[--interval SECS] [--rotate] [--max-iterations N] [--max-duration SECS] <file_path>...";

#[derive(Debug)]
struct Args {
    config: FollowConfig,
    paths: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut config = FollowConfig::default();
    let mut paths = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--rotate" => config = config.with_rotation_tracking(true),
            "--interval" => {
                let secs = parse_value::<f64>(arg, iter.next())?;
                config = config
                    .with_poll_interval_secs(secs)
                    .map_err(|e| e.to_string())?;
            }
            "--max-duration" => {
                let secs = parse_value::<f64>(arg, iter.next())?;
                config = config
                    .with_max_duration_secs(secs)
                    .map_err(|e| e.to_string())?;
            }
            "--max-iterations" => {
                let max = parse_value::<u64>(arg, iter.next())?;
                config = config.with_max_iterations(max);
            }
            flag if flag.starts_with("--") => return Err(format!("Unknown option: {}", flag)),
            path => paths.push(path.to_string()),
        }
    }

    if paths.is_empty() {
        return Err("No files given".to_string());
    }
    Ok(Args { config, paths })
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("Missing value for {}", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

/// Writes `line`, preceded by a `==> path <==` header whenever the source
/// differs from the previous line's.
fn write_with_header<W: Write>(
    out: &mut W,
    last_source: &mut Option<PathBuf>,
    line: &str,
    source: &Path,
) -> io::Result<()> {
    if last_source.as_deref() != Some(source) {
        if last_source.is_some() {
            writeln!(out)?;
        }
        writeln!(out, "==> {} <==", source.display())?;
        *last_source = Some(source.to_path_buf());
    }
    out.write_all(line.as_bytes())?;
    out.flush()
}

fn stdout_consumer(with_headers: bool) -> Consumer {
    if !with_headers {
        return Consumer::Stdout;
    }

    let mut last_source = None;
    Consumer::line_and_source(move |line, source| {
        let mut stdout = io::stdout().lock();
        write_with_header(&mut stdout, &mut last_source, line, source)?;
        Ok(())
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("log-follow");

    let parsed = match parse_args(args.get(1..).unwrap_or_default()) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Usage: {} {}", program, USAGE);
            process::exit(1);
        }
    };

    let mut follow =
        FollowLoop::new(parsed.config).with_consumer(stdout_consumer(parsed.paths.len() > 1));
    for path in &parsed.paths {
        if let Err(e) = follow.register(path).await {
            eprintln!("Skipping: {}", e);
        }
    }

    if follow.follow_set().is_empty() {
        eprintln!("No files to follow");
        process::exit(1);
    }
    follow.open_pending().await;

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    if let Err(e) = follow.run_until(shutdown).await {
        eprintln!("Error following files: {}", e);
        process::exit(1);
    }
}
