use command_auditor::logging::{init_logging, report_config_error};
use command_auditor::{CommandChecker, CommandContext, Config};
use std::path::PathBuf;

const USAGE: &str = "\
Usage: command-auditor [OPTIONS] <COMMAND>...

Checks a shell command before it runs and prints one of:
  PASS                 run the command unchanged
  EXECUTE: <command>   run this command instead
  ERROR: <message>     do not run the command

Options:
  --json               print the full verdict as JSON
  --config <PATH>      config file (default: ~/.config/command-auditor/config.toml)
  --context <KEY=VAL>  extra context for the AI review (repeatable)
  -h, --help           show this help
  -V, --version        show version";

#[derive(Debug, Default)]
struct Args {
    json: bool,
    config: Option<PathBuf>,
    context: CommandContext,
    command: Vec<String>,
}

enum Parsed {
    Run(Args),
    Help,
    Version,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Parsed, String> {
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-V" | "--version" => return Ok(Parsed::Version),
            "--json" => parsed.json = true,
            "--config" => {
                let path = args.next().ok_or("--config requires a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--context" => {
                let pair = args.next().ok_or("--context requires KEY=VALUE")?;
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("invalid context '{}', expected KEY=VALUE", pair))?;
                parsed.context.insert(key.to_string(), value.to_string());
            }
            "--" => {
                parsed.command.extend(args.by_ref());
                break;
            }
            _ => {
                parsed.command.push(arg);
                parsed.command.extend(args.by_ref());
                break;
            }
        }
    }

    Ok(Parsed::Run(parsed))
}

#[tokio::main]
async fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Parsed::Run(args)) => args,
        Ok(Parsed::Help) => {
            println!("{}", USAGE);
            return;
        }
        Ok(Parsed::Version) => {
            println!("command-auditor {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", USAGE);
            // Hooks read stdout; an unusable invocation must not block the shell
            println!("PASS");
            return;
        }
    };

    let (config, load_error) = Config::load_with_fallback(args.config.as_deref());
    let _guard = init_logging(&config.logging);
    if let Some(e) = &load_error {
        report_config_error(args.config.as_deref(), e);
    }

    if args.command.is_empty() {
        tracing::warn!("no command given");
        println!("PASS");
        return;
    }

    let command = args.command.join(" ");
    let context = (!args.context.is_empty()).then_some(&args.context);

    let checker = CommandChecker::from_config(&config);
    let verdict = checker.check(&command, context).await;

    if args.json {
        println!("{}", verdict.to_json());
    } else {
        println!("{}", verdict.shell_line());
    }
}
