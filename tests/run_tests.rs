use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

const TEST_TIMEOUT_SECS: u64 = 30;
const EXIT_CODE_MARKER: &str = "@EXPECT_EXIT_CODE=";

fn find_basic_programs(test_suite_dir: &Path) -> Vec<PathBuf> {
    let mut programs = Vec::new();
    if let Ok(entries) = fs::read_dir(test_suite_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("bas") {
                programs.push(path);
            }
        }
    }
    programs.sort();
    programs
}

/// Read from a `REM @EXPECT_EXIT_CODE=n` on the first line; 0 otherwise.
fn get_expected_exit_code(program_path: &Path) -> i32 {
    if let Ok(content) = fs::read_to_string(program_path) {
        if let Some(first_line) = content.lines().next() {
            if let Some(pos) = first_line.find(EXIT_CODE_MARKER) {
                if let Ok(code) = first_line[pos + EXIT_CODE_MARKER.len()..].trim().parse() {
                    return code;
                }
            }
        }
    }
    0
}

fn run_test_with_command(command: &mut Command, expected_exit_code: i32, expected_output: &str) -> Result<(), String> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to spawn process: {}", e))?;

    let status = match child.wait_timeout(Duration::from_secs(TEST_TIMEOUT_SECS)) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            return Err(format!("Test timed out after {} seconds", TEST_TIMEOUT_SECS));
        }
        Err(e) => return Err(format!("Error waiting for process: {}", e)),
    };

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_string(&mut output)
            .map_err(|e| format!("Error reading output: {}", e))?;
    }

    let actual_exit_code = status.code().unwrap_or(-1);
    if actual_exit_code != expected_exit_code {
        return Err(format!("Expected exit code: {}, got: {}", expected_exit_code, actual_exit_code));
    }
    if output != expected_output {
        return Err(format!("Expected output:\n{:?}\ngot:\n{:?}", expected_output, output));
    }
    Ok(())
}

fn run_test_suite(test_suite_dir: &Path) -> bool {
    println!("Running BASIC test suite...");
    println!("==========================");

    let programs = find_basic_programs(test_suite_dir);
    if programs.is_empty() {
        println!("No BASIC programs found!");
        return false;
    }

    let mut passed = 0;
    let mut failed = 0;

    for program_path in programs {
        let program_name = program_path.file_name().unwrap_or_default().to_string_lossy().to_string();
        print!("Testing {}... ", program_name);

        let expected_exit_code = get_expected_exit_code(&program_path);
        let expected_output = fs::read_to_string(program_path.with_extension("out")).unwrap_or_default();

        let mut command = Command::new(env!("CARGO_BIN_EXE_basic_rs"));
        command.arg(&program_path);

        match run_test_with_command(&mut command, expected_exit_code, &expected_output) {
            Ok(()) => {
                println!("PASS");
                passed += 1;
            }
            Err(error) => {
                println!("FAIL");
                println!("  {}", error);
                failed += 1;
            }
        }
    }

    println!("==========================");
    println!("Results: {} passed, {} failed", passed, failed);

    failed == 0
}

#[test]
fn run_all_tests() {
    let test_suite_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_suite");

    assert!(run_test_suite(&test_suite_dir), "Some tests failed");
}
