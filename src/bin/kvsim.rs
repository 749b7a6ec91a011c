//! Command-line runner for configured simulations.
//!
//! Usage:
//!   kvsim --config sim.yaml
//!   kvsim --config sim.yaml --seed 7 --trace dump.vcd --stats-json stats.json

use std::path::PathBuf;
use std::process::ExitCode;

use kvsim::{SimConfig, Simulation, WorkloadConfig};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let Some(config_path) = parse_arg(&args, "--config") else {
        eprintln!("error: --config <FILE> is required");
        print_usage();
        return ExitCode::FAILURE;
    };

    let mut config = match SimConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(seed) = parse_arg(&args, "--seed") {
        let seed = match parse_seed(seed) {
            Ok(seed) => seed,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        match config.workload.as_mut() {
            Some(WorkloadConfig::Random { seed: s, .. }) => *s = seed,
            _ => eprintln!("warning: --seed ignored, workload is not random"),
        }
    }
    if let Some(path) = parse_arg(&args, "--trace") {
        config.trace.enabled = true;
        config.trace.path = PathBuf::from(path);
    }
    if let Some(level) = parse_arg(&args, "--log-level") {
        config.simulation.log_level = level.to_string();
    }

    kvsim::init_logging(&config.simulation.log_level);

    println!("=== kvsim ===");
    println!("Config: {}", config_path);
    println!("Model: {}", config.model.variant);
    if config.trace.enabled {
        println!("Trace: {}", config.trace.path.display());
    }
    println!();

    let output_dir = config.simulation.output_dir.clone();
    let result = Simulation::from_config(config).and_then(|sim| sim.with_name(config_path).run());
    let mut stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("error: simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    stats.metadata.config_file = Some(config_path.to_string());

    print!("{}", stats.summary());

    let mut exports: Vec<(PathBuf, bool)> = Vec::new();
    if let Some(path) = parse_arg(&args, "--stats-json") {
        exports.push((PathBuf::from(path), true));
    }
    if let Some(dir) = output_dir {
        let dir = PathBuf::from(dir);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!("error: cannot create {}: {}", dir.display(), e);
            return ExitCode::FAILURE;
        }
        exports.push((dir.join("stats.json"), true));
        exports.push((dir.join("stats.csv"), false));
    }

    for (path, json) in exports {
        let written = if json {
            stats.to_json_file(&path)
        } else {
            stats.to_csv_file(&path)
        };
        match written {
            Ok(()) => println!("Wrote {}", path.display()),
            Err(e) => {
                eprintln!("error: cannot write {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn parse_arg<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn print_usage() {
    println!("kvsim - drive a hash-map/key-value-store model from a config file");
    println!();
    println!("USAGE:");
    println!("  kvsim --config <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --config <FILE>       YAML or JSON simulation config");
    println!("  --seed <N>            Override the random workload seed");
    println!("  --trace <PATH>        Record a VCD waveform to PATH");
    println!("  --stats-json <PATH>   Write run statistics as JSON");
    println!("  --log-level <LEVEL>   trace, debug, info, warn or error");
    println!("  --help                Show this message");
}

fn parse_seed(raw: &str) -> Result<u64, String> {
    raw.parse::<u64>()
        .map_err(|e| format!("invalid --seed {:?}: {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("42"), Ok(42));
        let err = parse_seed("abc").unwrap_err();
        assert!(err.contains("--seed"));
        assert!(parse_seed("-1").is_err());
    }
}
