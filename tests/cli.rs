use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shazam_recognize"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run shazam_recognize")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

#[test]
fn test_missing_argument_prints_usage_and_exits_1() {
    let output = run(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), r#"{"error":"Usage: shazam_recognize <audio_file_path>"}"#);
}

#[test]
fn test_bad_option_value_prints_usage_and_exits_1() {
    let output = run(&["--segment", "abc", "song.mp3"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), r#"{"error":"Usage: shazam_recognize <audio_file_path>"}"#);
}

#[test]
fn test_missing_file_prints_error_and_exits_0() {
    let output = run(&["/no/such/dir/song.mp3"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), r#"{"error":"File not found: /no/such/dir/song.mp3"}"#);
}
