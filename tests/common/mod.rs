use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;

/// Run the binary with `args`, returning (exit code, stdout, stderr).
pub fn run_cli(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_convotally"))
        .args(args)
        .env_remove("CONVOTALLY_AUTH_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to spawn binary");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Write `convotally.toml` into `dir` with the given extra lines appended
/// to a minimal valid config.
pub fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("convotally.toml");
    let body = format!(
        r#"auth_token = "VF.DM.test"
project_id = "proj-1"
start_date = "2024-07-14"
end_date = "2024-08-07"
output_directory = "out"
categories = ["Greeting", "Billing", "Shipping"]
workers = 2
timeout_secs = 5
{extra}
"#
    );
    fs::write(&path, body).unwrap();
    path
}

/// A tiny HTTP responder: maps request paths (without query string) to
/// (status, body). Unknown paths get a 404. Serves until the process exits.
pub fn stub_api(routes: Vec<(&str, u16, String)>) -> String {
    let routes: HashMap<String, (u16, String)> = routes
        .into_iter()
        .map(|(path, status, body)| (path.to_string(), (status, body)))
        .collect();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
                continue;
            }
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line.trim_end().is_empty() {
                    break;
                }
            }
            let target = request_line.split_whitespace().nth(1).unwrap_or("/");
            let path = target.split('?').next().unwrap_or(target);
            let (status, body) = routes
                .get(path)
                .cloned()
                .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));
            let _ = write!(
                stream,
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.flush();
        }
    });
    base
}
