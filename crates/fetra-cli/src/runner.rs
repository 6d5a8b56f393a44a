//! Solver runners: launch the target solver on a translated study and
//! classify the outcome.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use fetra_model::{ConfigurationParameters, SolverName};

/// Closed classification of a solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerOutcome {
    Ok,
    SolverNotFound,
    TranslationSyntaxError,
    SolverKilled,
    SolverExitNotZero,
    SolverResultNotFound,
    TestFail,
}

impl RunnerOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            RunnerOutcome::Ok => 0,
            RunnerOutcome::SolverNotFound => 100,
            RunnerOutcome::TranslationSyntaxError => 101,
            RunnerOutcome::SolverKilled => 102,
            RunnerOutcome::SolverExitNotZero => 103,
            RunnerOutcome::SolverResultNotFound => 104,
            RunnerOutcome::TestFail => 105,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RunnerOutcome::Ok => "OK",
            RunnerOutcome::SolverNotFound => "SOLVER_NOT_FOUND",
            RunnerOutcome::TranslationSyntaxError => "TRANSLATION_SYNTAX_ERROR",
            RunnerOutcome::SolverKilled => "SOLVER_KILLED",
            RunnerOutcome::SolverExitNotZero => "SOLVER_EXIT_NOT_ZERO",
            RunnerOutcome::SolverResultNotFound => "SOLVER_RESULT_NOT_FOUND",
            RunnerOutcome::TestFail => "TEST_FAIL",
        }
    }
}

/// Run the configured solver on the primary model file.
pub fn exec_solver(configuration: &ConfigurationParameters, model_file: &Path) -> RunnerOutcome {
    match configuration.output_solver {
        SolverName::CodeAster => run_aster(configuration, model_file),
        SolverName::Systus => run_systus(configuration, model_file),
        SolverName::Nastran => run_nastran(configuration, model_file),
    }
}

fn run_aster(configuration: &ConfigurationParameters, model_file: &Path) -> RunnerOutcome {
    let stem = file_stem(model_file);
    delete_previous_results(model_file, &[".mess", ".resu", ".rmed", ".stdout", ".stderr"]);
    let scratch = model_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{stem}_repe_out"));
    let _ = fs::remove_dir_all(&scratch);
    let _ = fs::create_dir_all(&scratch);

    let program = default_command(configuration, "as_run");
    let command = format!(
        "{program} {} > {stem}.stdout 2> {stem}.stderr",
        model_file.display()
    );
    let outcome = run_shell(configuration, &command);
    if outcome != RunnerOutcome::Ok {
        return outcome;
    }
    // A clean exit still fails when the result file is missing or a test
    // directive reported NOOK.
    let resu = model_file.with_extension("resu");
    match fs::read_to_string(&resu) {
        Ok(contents) if contents.trim().is_empty() => RunnerOutcome::SolverResultNotFound,
        Ok(contents) if contents.contains("NOOK") => RunnerOutcome::TestFail,
        Ok(_) => RunnerOutcome::Ok,
        Err(_) => RunnerOutcome::SolverResultNotFound,
    }
}

fn run_systus(configuration: &ConfigurationParameters, model_file: &Path) -> RunnerOutcome {
    delete_previous_results(model_file, &[".TIT", ".fdb", ".RESU"]);
    let program = default_command(configuration, "systus");
    let command = format!("{program} -batch -exec {}", model_file.display());
    let outcome = run_shell(configuration, &command);
    if outcome != RunnerOutcome::Ok {
        return outcome;
    }
    let resu = model_file.with_extension("RESU");
    if !resu.exists() {
        return RunnerOutcome::SolverResultNotFound;
    }
    RunnerOutcome::Ok
}

fn run_nastran(configuration: &ConfigurationParameters, model_file: &Path) -> RunnerOutcome {
    delete_previous_results(
        model_file,
        &[".f04", ".f06", ".log", ".MASTER", ".DBALL", ".IFPDAT"],
    );
    let program = default_command(configuration, "nastran");
    let command = format!("{program} {}", model_file.display());
    // Unlike Aster and Systus, the Nastran outcome is the exit status alone;
    // there is no result-file scan.
    run_shell(configuration, &command)
}

fn default_command(configuration: &ConfigurationParameters, fallback: &str) -> String {
    if !configuration.solver_command.is_empty() {
        configuration.solver_command.clone()
    } else if !configuration.solver_server.is_empty()
        && configuration.solver_server != "localhost"
        && configuration.solver_server != "127.0.0.1"
    {
        format!("ssh {} {fallback}", configuration.solver_server)
    } else {
        fallback.to_string()
    }
}

fn run_shell(configuration: &ConfigurationParameters, command: &str) -> RunnerOutcome {
    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command);
    if configuration.output_path != PathBuf::from(".") {
        shell.current_dir(&configuration.output_path);
    }
    log::debug!("running: {command}");
    match shell.status() {
        Ok(status) => convert_exec_result(&status),
        Err(_) => RunnerOutcome::SolverNotFound,
    }
}

/// Numeric exit-status conventions: 127 means the shell did not find the
/// command, 128+n is how the wrapping shell reports a solver terminated by
/// signal n.
fn convert_exec_result(status: &std::process::ExitStatus) -> RunnerOutcome {
    match status.code() {
        Some(0) => RunnerOutcome::Ok,
        Some(127) => RunnerOutcome::SolverNotFound,
        Some(code) if (129..=165).contains(&code) => RunnerOutcome::SolverKilled,
        Some(_) => RunnerOutcome::SolverExitNotZero,
        // The shell itself died on a signal.
        None => RunnerOutcome::SolverKilled,
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string()
}

/// Stale result files would shadow a failed run; remove them first.
fn delete_previous_results(model_file: &Path, extensions: &[&str]) {
    let stem = file_stem(model_file);
    let dir = model_file.parent().unwrap_or_else(|| Path::new("."));
    for extension in extensions {
        let _ = fs::remove_file(dir.join(format!("{stem}{extension}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn exit_codes_match_the_documented_set() {
        assert_eq!(RunnerOutcome::Ok.exit_code(), 0);
        assert_eq!(RunnerOutcome::SolverNotFound.exit_code(), 100);
        assert_eq!(RunnerOutcome::TranslationSyntaxError.exit_code(), 101);
        assert_eq!(RunnerOutcome::SolverKilled.exit_code(), 102);
        assert_eq!(RunnerOutcome::SolverExitNotZero.exit_code(), 103);
        assert_eq!(RunnerOutcome::SolverResultNotFound.exit_code(), 104);
        assert_eq!(RunnerOutcome::TestFail.exit_code(), 105);
    }

    #[test]
    fn shell_status_classification() {
        let ok = Command::new("sh").arg("-c").arg("true").status().expect("sh runs");
        assert_eq!(convert_exec_result(&ok), RunnerOutcome::Ok);

        let failing = Command::new("sh").arg("-c").arg("exit 3").status().expect("sh runs");
        assert_eq!(convert_exec_result(&failing), RunnerOutcome::SolverExitNotZero);

        let missing = Command::new("sh")
            .arg("-c")
            .arg("definitely_not_a_solver_command_xyz")
            .status()
            .expect("sh runs");
        assert_eq!(convert_exec_result(&missing), RunnerOutcome::SolverNotFound);
    }

    #[test]
    fn signal_killed_solver_is_classified_as_killed() {
        // The wrapping shell exits normally with 128+signal when the inner
        // solver dies on a signal; this is the path a real run takes.
        let wrapped = Command::new("sh")
            .arg("-c")
            .arg("sh -c 'kill -9 $$'")
            .status()
            .expect("sh runs");
        assert_eq!(wrapped.code(), Some(137));
        assert_eq!(convert_exec_result(&wrapped), RunnerOutcome::SolverKilled);

        // A directly-signalled process has no exit code at all.
        let direct = Command::new("sh")
            .arg("-c")
            .arg("kill -9 $$")
            .status()
            .expect("sh runs");
        assert_eq!(convert_exec_result(&direct), RunnerOutcome::SolverKilled);
    }

    #[test]
    fn stale_results_are_deleted_before_launch() {
        let dir = std::env::temp_dir().join(format!(
            "fetra_runner_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock is sane")
                .as_nanos()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        let model = dir.join("job.export");
        fs::write(&model, "P actions make_etude\n").expect("write model");
        let stale = dir.join("job.resu");
        fs::write(&stale, "old").expect("write stale result");

        delete_previous_results(&model, &[".mess", ".resu"]);
        assert!(!stale.exists());
        assert!(model.exists());
    }
}
