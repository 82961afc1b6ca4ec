use std::path::PathBuf;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config_dir: Option<PathBuf>,
    no_audio: bool,
    search: Option<String>,
    help: bool,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    if args.help {
        print_help();
        return Ok(());
    }

    chime::app::run_with_startup(chime::app::AppStartupOptions {
        config_root: args.config_dir,
        no_audio: args.no_audio,
        initial_search: args.search,
    })
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--no-audio" => out.no_audio = true,
            "--config-dir" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--config-dir requires a path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--config-dir cannot be empty");
                }
                out.config_dir = Some(PathBuf::from(value));
            }
            "--search" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--search requires a term");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--search cannot be empty");
                }
                out.search = Some(value.trim().to_string());
            }
            "-h" | "--help" => out.help = true,
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("Chime");
    println!("  --config-dir <path>  Settings, favorites and history location");
    println!("  --no-audio           Simulate playback without an output device");
    println!("  --search <term>      Run a catalog search on startup");
}
