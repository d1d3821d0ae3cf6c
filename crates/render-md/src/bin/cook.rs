use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use render_md::{CookConfig, Cooker};
use runtime::args::{parse_args, parse_flag_optional_bool, parse_param, ArgError};
use runtime::utils::format_error_disp;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    inline_emoji: Option<bool>,
    no_emoji: bool,
    /// Read from stdin when missing or `-`
    input: Option<PathBuf>,
}

fn usage(arg0: &str) {
    eprintln!("usage: {arg0} [-config <file.yaml>] [-inline-emoji[=bool]] [-no-emoji] [input.md]");
}

fn parse(args: impl Iterator<Item = String>) -> Result<Option<Args>, anyhow::Error> {
    let mut parsed = Args::default();
    let mut input = None;
    let res = parse_args(
        args,
        |flag, inline, rest, arg0| -> Result<Option<()>, anyhow::Error> {
            match flag {
                "config" => parsed.config = Some(parse_param(flag, rest, inline)?.into()),
                "inline-emoji" => parsed.inline_emoji = Some(parse_flag_optional_bool(inline)?),
                "no-emoji" => parsed.no_emoji = parse_flag_optional_bool(inline)?,
                "h" | "help" | "-help" => {
                    usage(arg0);
                    return Ok(None);
                }
                _ => {
                    usage(arg0);
                    return Err(ArgError::UnknownFlag(flag.into()).into());
                }
            }
            Ok(Some(()))
        },
        |index, value| -> Result<Option<()>, anyhow::Error> {
            if index > 0 {
                return Err(ArgError::UnexpectedArg(value).into());
            }
            input = Some(PathBuf::from(value));
            Ok(Some(()))
        },
    )?;
    parsed.input = input;
    Ok(res.map(|()| parsed))
}

fn run() -> Result<(), anyhow::Error> {
    let Some(args) = parse(std::env::args())? else {
        return Ok(());
    };

    let mut config = match &args.config {
        Some(path) => CookConfig::load(path)?,
        None => CookConfig::default(),
    };
    if let Some(inline) = args.inline_emoji {
        config.emoji.inline = inline;
    }
    if args.no_emoji {
        config.emoji.enabled = false;
    }

    let markdown = match args.input.as_deref().filter(|path| *path != Path::new("-")) {
        Some(path) => fs_err::read_to_string(path)?,
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).context("reading markdown from stdin")?;
            text
        }
    };

    let html = Cooker::new(config).cook(&markdown);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(html.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = runtime::log::setup_logger(env!("CARGO_CRATE_NAME")) {
        eprintln!("logging disabled: {}", format_error_disp(&err));
    }
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", format_error_disp(&*err));
            ExitCode::FAILURE
        }
    }
}
