use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tools::{apply_env, load_config, load_spec, plan_lines, replay};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let mut args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let cmd = args[1].clone();
    args.drain(0..2);

    match cmd.as_str() {
        "validate" => cmd_validate(args),
        "plan" => cmd_plan(args),
        "style" => cmd_style(args),
        "replay" => cmd_replay(args),
        _ => Err(usage()),
    }
}

/// Flags shared by the subcommands, plus the positional paths left over.
#[derive(Debug, Default)]
struct Args {
    paths: Vec<PathBuf>,
    config: Option<PathBuf>,
    from: Option<PathBuf>,
    out: Option<PathBuf>,
    ready_at: Option<usize>,
    pretty: bool,
}

fn parse_args(args: Vec<String>) -> Result<Args, String> {
    let mut out = Args::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "--from" | "--out" | "--ready-at" => {
                let flag = args[i].clone();
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("{flag} requires a value"))?;
                match flag.as_str() {
                    "--config" => out.config = Some(PathBuf::from(value)),
                    "--from" => out.from = Some(PathBuf::from(value)),
                    "--out" => out.out = Some(PathBuf::from(value)),
                    _ => {
                        out.ready_at = Some(
                            value
                                .parse()
                                .map_err(|e| format!("--ready-at {value:?}: {e}"))?,
                        )
                    }
                }
            }
            "--pretty" => out.pretty = true,
            s if s.starts_with('-') => {
                return Err(format!("unknown arg: {s}\n\n{}", usage()));
            }
            _ => out.paths.push(PathBuf::from(&args[i])),
        }
        i += 1;
    }
    Ok(out)
}

fn write_output(out: Option<&PathBuf>, text: &str) -> Result<(), String> {
    match out {
        Some(p) => fs::write(p, text).map_err(|e| format!("write {p:?}: {e}")),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}").map_err(|e| format!("stdout: {e}"))
        }
    }
}

fn to_text(value: &impl serde::Serialize, pretty: bool) -> Result<String, String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    text.map_err(|e| format!("json: {e}"))
}

fn cmd_validate(args: Vec<String>) -> Result<(), String> {
    // mapsync validate <spec.json> [more.json ...]
    let args = parse_args(args)?;
    if args.paths.is_empty() {
        return Err(usage());
    }
    for p in &args.paths {
        let spec = load_spec(p)?;
        println!(
            "{}: ok ({} sources, {} layers)",
            p.display(),
            spec.sources().count(),
            spec.layers().len()
        );
    }
    Ok(())
}

fn cmd_plan(args: Vec<String>) -> Result<(), String> {
    // mapsync plan [--from prev.json] <next.json> [--config cfg.json]
    let args = parse_args(args)?;
    let [next] = args.paths.as_slice() else {
        return Err(usage());
    };
    let config = apply_env(load_config(args.config.as_deref())?)?;
    let from = args.from.as_deref().map(load_spec).transpose()?;
    let next = load_spec(next)?;
    let lines = plan_lines(from.as_ref(), &next, &config)?;
    tracing::info!(commands = lines.len(), "planned");
    write_output(args.out.as_ref(), &lines.join("\n"))
}

fn cmd_style(args: Vec<String>) -> Result<(), String> {
    // mapsync style <spec.json> [--out style.json] [--pretty]
    let args = parse_args(args)?;
    let [path] = args.paths.as_slice() else {
        return Err(usage());
    };
    let spec = load_spec(path)?;
    let doc = layers::style::style_document(&spec);
    write_output(args.out.as_ref(), &to_text(&doc, args.pretty)?)
}

fn cmd_replay(args: Vec<String>) -> Result<(), String> {
    // mapsync replay <first.json> [next.json ...] [--config cfg.json] [--ready-at N]
    let args = parse_args(args)?;
    if args.paths.is_empty() {
        return Err(usage());
    }
    let config = apply_env(load_config(args.config.as_deref())?)?;
    let snapshots = args
        .paths
        .iter()
        .map(|p| load_spec(p))
        .collect::<Result<Vec<_>, _>>()?;
    let outcome = replay(snapshots, config, args.ready_at.unwrap_or(0))?;
    if !outcome.converged {
        tracing::warn!("engine did not converge on the last snapshot");
    }
    write_output(args.out.as_ref(), &to_text(&outcome, args.pretty)?)
}

fn usage() -> String {
    let exe = env::args().next().unwrap_or_else(|| "mapsync".to_string());
    format!(
        "Usage:\n  {exe} validate <spec.json> [more.json ...]\n  {exe} plan [--from prev.json] <next.json> [--config cfg.json] [--out FILE]\n  {exe} style <spec.json> [--out FILE] [--pretty]\n  {exe} replay <first.json> [next.json ...] [--config cfg.json] [--ready-at N] [--out FILE] [--pretty]\n\nNotes:\n- `plan` prints one JSON command per line, in the order the engine would run them.\n- `replay` runs the snapshots against the in-memory engine and prints steps, engine calls and metrics.\n- Environment overrides: MAPSYNC_MAX_ZOOM, MAPSYNC_MAX_PENDING, MAPSYNC_GEOJSON_IN_PLACE, MAPSYNC_FLY_MS.\n- Logging follows RUST_LOG (e.g. RUST_LOG=sync=debug).\n"
    )
}
