//! Command-line front-end: `fetra <input-file> <input-format> <output-format>`.

mod runner;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Local;
use fetra_io::{InputFormat, IoError};
use fetra_model::{
    ConfigurationParameters, Rbe2TranslationMode, SolverName, TranslationMode,
};

use runner::{RunnerOutcome, exec_solver};

// Exit codes of the translator proper; runner outcomes map to 100..105.
const EXIT_OK: u8 = 0;
const EXIT_GENERIC_EXCEPTION: u8 = 1;
const EXIT_NO_INPUT_FILE: u8 = 2;
const EXIT_OUTPUT_DIR_NOT_CREATED: u8 = 3;
const EXIT_INVALID_COMMAND_LINE: u8 = 4;
const EXIT_MODEL_VALIDATION_ERROR: u8 = 5;
const EXIT_PARSING_EXCEPTION: u8 = 6;
const EXIT_WRITING_EXCEPTION: u8 = 7;

fn exit_code_name(code: u8) -> &'static str {
    match code {
        EXIT_OK => "OK",
        EXIT_GENERIC_EXCEPTION => "GENERIC_EXCEPTION",
        EXIT_NO_INPUT_FILE => "NO_INPUT_FILE",
        EXIT_OUTPUT_DIR_NOT_CREATED => "OUTPUT_DIR_NOT_CREATED",
        EXIT_INVALID_COMMAND_LINE => "INVALID_COMMAND_LINE",
        EXIT_MODEL_VALIDATION_ERROR => "MODEL_VALIDATION_ERROR",
        EXIT_PARSING_EXCEPTION => "PARSING_EXCEPTION",
        EXIT_WRITING_EXCEPTION => "WRITING_EXCEPTION",
        100 => "SOLVER_NOT_FOUND",
        101 => "TRANSLATION_SYNTAX_ERROR",
        102 => "SOLVER_KILLED",
        103 => "SOLVER_EXIT_NOT_ZERO",
        104 => "SOLVER_RESULT_NOT_FOUND",
        105 => "SOLVER_TEST_FAIL",
        _ => "UNKNOWN",
    }
}

fn usage() {
    eprintln!("usage:");
    eprintln!("  fetra <input-file> <input-format> <output-format> [options]");
    eprintln!();
    eprintln!("formats:");
    eprintln!("  input:  nastran | optistruct");
    eprintln!("  output: aster | systus | nastran");
    eprintln!();
    eprintln!("options:");
    eprintln!("  -o <dir>                output directory (default .)");
    eprintln!("  -R                      run the target solver after translation");
    eprintln!("  -t <path>               reference result file used to inject assertions");
    eprintln!("  --tolerance <f>         assertion tolerance (default 0.02)");
    eprintln!("  -d                      debug logging");
    eprintln!("  -b                      translation mode: best-effort (default)");
    eprintln!("  -m                      translation mode: mesh-at-least");
    eprintln!("  -s                      translation mode: strict");
    eprintln!("  --solver-command <s>    override the runner invocation");
    eprintln!("  --solver-server <s>     run the solver on a remote host");
    eprintln!("  --solver-version <s>    version tag passed to the writer header");
    eprintln!("  -c <path>               configuration file (long-form keys)");
    eprintln!();
    eprintln!("examples:");
    eprintln!("  fetra model.bdf nastran aster -o out");
    eprintln!("  fetra model.fem optistruct systus -s");
    eprintln!("  fetra model.bdf nastran aster -R -t model.f06");
}

#[derive(Debug)]
struct CommandLine {
    configuration: ConfigurationParameters,
    input_format: InputFormat,
    debug: bool,
}

fn parse_command_line(args: &[String]) -> Result<CommandLine, (u8, String)> {
    let invalid = |message: &str| (EXIT_INVALID_COMMAND_LINE, message.to_string());

    let mut positionals = Vec::new();
    let mut options: Vec<(String, Option<String>)> = Vec::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" | "-t" | "-c" | "--tolerance" | "--solver-command" | "--solver-server"
            | "--solver-version" => {
                let value = iter
                    .next()
                    .ok_or_else(|| invalid(&format!("missing value for {arg}")))?;
                options.push((arg.clone(), Some(value.clone())));
            }
            "-R" | "-d" | "-b" | "-m" | "-s" => options.push((arg.clone(), None)),
            other if other.starts_with('-') => {
                return Err(invalid(&format!("unknown option {other}")));
            }
            _ => positionals.push(arg.clone()),
        }
    }

    if positionals.is_empty() {
        return Err((EXIT_NO_INPUT_FILE, "no input file specified".to_string()));
    }
    if positionals.len() != 3 {
        return Err(invalid("expected <input-file> <input-format> <output-format>"));
    }
    let input_file = positionals[0].clone();
    let input_format = InputFormat::from_label(&positionals[1])
        .ok_or_else(|| invalid(&format!("unknown input format {}", positionals[1])))?;
    let output_solver = SolverName::from_label(&positionals[2])
        .ok_or_else(|| invalid(&format!("unknown output format {}", positionals[2])))?;

    let mut configuration = ConfigurationParameters::new(&input_file, output_solver);
    let mut debug = false;

    // Options from an optional -c file first, command line wins.
    if let Some((_, Some(path))) = options.iter().find(|(name, _)| name == "-c") {
        let contents = fs::read_to_string(path)
            .map_err(|e| invalid(&format!("cannot read configuration file {path}: {e}")))?;
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(invalid(&format!("malformed configuration line '{trimmed}'")));
            };
            apply_long_option(&mut configuration, &mut debug, key.trim(), value.trim())
                .map_err(|message| invalid(&message))?;
        }
    }

    for (name, value) in &options {
        match (name.as_str(), value) {
            ("-o", Some(dir)) => configuration.output_path = PathBuf::from(dir),
            ("-R", None) => configuration.run_solver = true,
            ("-t", Some(path)) => configuration.result_file = Some(PathBuf::from(path)),
            ("--tolerance", Some(raw)) => {
                configuration.test_tolerance = raw
                    .parse()
                    .map_err(|_| invalid(&format!("invalid tolerance {raw}")))?;
            }
            ("-d", None) => debug = true,
            ("-b", None) => configuration.translation_mode = TranslationMode::BestEffort,
            ("-m", None) => configuration.translation_mode = TranslationMode::MeshAtLeast,
            ("-s", None) => configuration.translation_mode = TranslationMode::Strict,
            ("--solver-command", Some(command)) => {
                configuration.solver_command = command.clone();
            }
            ("--solver-server", Some(server)) => {
                configuration.solver_server = server.clone();
            }
            ("--solver-version", Some(version)) => {
                configuration.solver_version = version.clone();
            }
            ("-c", Some(_)) => {}
            _ => unreachable!("option grammar checked above"),
        }
    }

    Ok(CommandLine {
        configuration,
        input_format,
        debug,
    })
}

/// Configuration-file keys: the long form of each command-line option.
fn apply_long_option(
    configuration: &mut ConfigurationParameters,
    debug: &mut bool,
    key: &str,
    value: &str,
) -> Result<(), String> {
    match key {
        "output-dir" => configuration.output_path = PathBuf::from(value),
        "run-solver" => configuration.run_solver = value == "true" || value == "1",
        "result-file" => configuration.result_file = Some(PathBuf::from(value)),
        "tolerance" => {
            configuration.test_tolerance = value
                .parse()
                .map_err(|_| format!("invalid tolerance {value}"))?;
        }
        "debug" => *debug = value == "true" || value == "1",
        "translation-mode" => {
            configuration.translation_mode = match value {
                "best-effort" => TranslationMode::BestEffort,
                "mesh-at-least" => TranslationMode::MeshAtLeast,
                "strict" => TranslationMode::Strict,
                other => return Err(format!("unknown translation mode {other}")),
            };
        }
        "solver-command" => configuration.solver_command = value.to_string(),
        "solver-server" => configuration.solver_server = value.to_string(),
        "solver-version" => configuration.solver_version = value.to_string(),
        "rbe2-translation-mode" => {
            configuration.rbe2_translation_mode = match value {
                "lagrangian" => Rbe2TranslationMode::Lagrangian,
                "penalty" => Rbe2TranslationMode::Penalty,
                other => return Err(format!("unknown RBE2 translation mode {other}")),
            };
        }
        "rbe2-rigidity" => {
            configuration.rbe2_rigidity = value
                .parse()
                .map_err(|_| format!("invalid rigidity {value}"))?;
        }
        other => return Err(format!("unknown configuration key {other}")),
    }
    Ok(())
}

fn fail(code: u8, reason: &str) -> ExitCode {
    eprintln!("{}: {reason}", exit_code_name(code));
    ExitCode::from(code)
}

fn translation_exit_code(err: &IoError) -> u8 {
    match err {
        IoError::FileNotFound(_) => EXIT_NO_INPUT_FILE,
        IoError::Parse(_) | IoError::Unsupported(_) => EXIT_PARSING_EXCEPTION,
        IoError::Writing { .. } | IoError::WouldOverwrite(_) => EXIT_WRITING_EXCEPTION,
        IoError::Model(_) | IoError::Mesh(_) => EXIT_MODEL_VALIDATION_ERROR,
        IoError::Io(_) | IoError::Json(_) => EXIT_GENERIC_EXCEPTION,
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        usage();
        return ExitCode::SUCCESS;
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let command_line = match parse_command_line(&args) {
        Ok(command_line) => command_line,
        Err((code, message)) => {
            eprintln!("{message}");
            usage();
            return ExitCode::from(code);
        }
    };

    let mut builder = env_logger::Builder::from_default_env();
    if command_line.debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    let _ = builder.try_init();

    let configuration = command_line.configuration;
    println!(
        "fetra {} - {} -> {} ({})",
        env!("CARGO_PKG_VERSION"),
        command_line.input_format.label(),
        configuration.output_solver.label(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    if !Path::new(&configuration.input_file).exists() {
        return fail(
            EXIT_NO_INPUT_FILE,
            &format!("input file {} not found", configuration.input_file),
        );
    }
    if !configuration.output_path.exists()
        && fs::create_dir_all(&configuration.output_path).is_err()
    {
        return fail(
            EXIT_OUTPUT_DIR_NOT_CREATED,
            &format!(
                "cannot create output directory {}",
                configuration.output_path.display()
            ),
        );
    }

    let model_file = match fetra_io::translate(&configuration, command_line.input_format) {
        Ok(path) => path,
        Err(err) => return fail(translation_exit_code(&err), &err.to_string()),
    };
    println!("written: {}", model_file.display());

    if configuration.run_solver {
        let outcome = exec_solver(&configuration, &model_file);
        println!(
            "{}",
            serde_json::json!({
                "model_file": model_file.display().to_string(),
                "outcome": outcome.label(),
            })
        );
        if outcome != RunnerOutcome::Ok {
            return fail(outcome.exit_code(), outcome.label());
        }
    }
    ExitCode::from(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn three_positionals_are_required() {
        let err = parse_command_line(&args(&[])).expect_err("empty line fails");
        assert_eq!(err.0, EXIT_NO_INPUT_FILE);

        let err = parse_command_line(&args(&["model.bdf", "nastran"]))
            .expect_err("missing output format fails");
        assert_eq!(err.0, EXIT_INVALID_COMMAND_LINE);
    }

    #[test]
    fn options_override_defaults() {
        let parsed = parse_command_line(&args(&[
            "model.bdf",
            "nastran",
            "aster",
            "-o",
            "out",
            "-s",
            "-R",
            "--tolerance",
            "0.05",
        ]))
        .expect("valid command line");
        assert_eq!(parsed.configuration.output_path, PathBuf::from("out"));
        assert_eq!(
            parsed.configuration.translation_mode,
            TranslationMode::Strict
        );
        assert!(parsed.configuration.run_solver);
        assert_eq!(parsed.configuration.test_tolerance, 0.05);
        assert_eq!(parsed.input_format, InputFormat::Nastran);
        assert_eq!(parsed.configuration.output_solver, SolverName::CodeAster);
    }

    #[test]
    fn unknown_formats_are_rejected() {
        let err = parse_command_line(&args(&["model.bdf", "abaqus", "aster"]))
            .expect_err("unknown input format");
        assert_eq!(err.0, EXIT_INVALID_COMMAND_LINE);

        let err = parse_command_line(&args(&["model.bdf", "nastran", "abaqus"]))
            .expect_err("unknown output format");
        assert_eq!(err.0, EXIT_INVALID_COMMAND_LINE);
    }

    #[test]
    fn configuration_file_is_read_and_command_line_wins() {
        let dir = std::env::temp_dir().join(format!(
            "fetra_cli_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock is sane")
                .as_nanos()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        let config = dir.join("fetra.conf");
        fs::write(
            &config,
            "# defaults\ntolerance = 0.1\ntranslation-mode = strict\nrbe2-translation-mode = penalty\nrbe2-rigidity = 1e7\n",
        )
        .expect("write config");

        let parsed = parse_command_line(&args(&[
            "model.bdf",
            "nastran",
            "systus",
            "-c",
            config.to_str().expect("utf8"),
            "--tolerance",
            "0.02",
        ]))
        .expect("valid command line");
        // File value applied, then overridden by the explicit option.
        assert_eq!(parsed.configuration.test_tolerance, 0.02);
        assert_eq!(
            parsed.configuration.translation_mode,
            TranslationMode::Strict
        );
        assert_eq!(
            parsed.configuration.rbe2_translation_mode,
            Rbe2TranslationMode::Penalty
        );
        assert_eq!(parsed.configuration.rbe2_rigidity, 1e7);
    }

    #[test]
    fn exit_code_names_cover_the_closed_set() {
        assert_eq!(exit_code_name(0), "OK");
        assert_eq!(exit_code_name(5), "MODEL_VALIDATION_ERROR");
        assert_eq!(exit_code_name(105), "SOLVER_TEST_FAIL");
        assert_eq!(exit_code_name(42), "UNKNOWN");
    }
}
