use anyhow::Context;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Clone)]
struct EnvItem {
    name: OsString,
    value: OsString,
}

fn parse_env_item(src: &str) -> Result<EnvItem, String> {
    let p = src
        .find('=')
        .ok_or_else(|| String::from("env item doesn't look like KEY=VAL"))?;
    Ok(EnvItem {
        name: src[0..p].into(),
        value: src[p + 1..].into(),
    })
}

/// Runs one command through the ferry execution engine.
#[derive(Parser, Debug)]
#[command(name = "ferry", version, about)]
struct Opt {
    /// Bytes handed to child stdin before the exchange starts
    #[arg(long)]
    stdin_str: Option<String>,

    /// Forward this process's stdin to the child until EOF
    #[arg(long)]
    expects_stdin: bool,

    /// Mirror child stdout to this terminal
    #[arg(long)]
    noisy_stdout: bool,

    /// Mirror child stderr to this terminal
    #[arg(long)]
    noisy_stderr: bool,

    /// Stream binary output (mirrors on, capture off)
    #[arg(long)]
    binary: bool,

    /// Redact JSON_START/JSON_END envelopes from the mirrored stdout
    #[arg(long)]
    helper: bool,

    /// Treat a non-zero exit as an error
    #[arg(long)]
    must_succeed: bool,

    /// Stop after capturing this many stdout bytes
    #[arg(long)]
    max_stdout_bytes: Option<u64>,

    /// Fire-and-wait with inherited descriptors
    #[arg(long)]
    system: bool,

    /// Use the merged-output bulk reader instead of the multiplex loop
    #[arg(long)]
    simple: bool,

    /// Print the outcome record as JSON
    #[arg(long)]
    json: bool,

    /// Extra KEY=VAL environment entries for the child
    #[arg(short = 'e', long = "env", value_parser = parse_env_item)]
    env: Vec<EnvItem>,

    /// Child working directory
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    cmd: Vec<OsString>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opt = Opt::parse();

    let mut options = ferry::ExecuteOptions::default();
    options.cmd = opt.cmd;
    options.stdin_str = opt.stdin_str.map(String::into_bytes);
    options.expects_stdin = opt.expects_stdin;
    options.noisy_stdout = opt.noisy_stdout;
    options.noisy_stderr = opt.noisy_stderr;
    options.is_binary = opt.binary;
    options.is_helper = opt.helper;
    options.must_succeed = opt.must_succeed;
    options.max_stdout_bytes = opt.max_stdout_bytes;
    options.system = opt.system;
    options.env = opt
        .env
        .into_iter()
        .map(|item| (item.name, item.value))
        .collect();
    options.cwd = opt.cwd;

    let result = if opt.simple {
        ferry::execute_simple(&options)
    } else {
        ferry::execute(&options)
    }
    .context("execution failed")?;

    if opt.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("---> {}: {} <---", result.verdict, result.message);
        if opt.helper {
            match result.helper_reply() {
                Ok(reply) => eprintln!("helper replied {} ({})", reply.error_code, reply.value),
                Err(err) => eprintln!("helper reply unusable: {}", err),
            }
        }
    }

    let code = result
        .status
        .unwrap_or(if result.success() { 0 } else { 1 });
    std::process::exit(code);
}
