mod bs_date;
mod config;
mod db;
mod grading;
mod ipc;
mod logging;
mod report;

use log::{error, warn};
use std::io::{self, BufRead, Write};

fn main() {
    let cfg = match config::DaemonConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("schoold: {e:#}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init_logging(&cfg.log_level) {
        eprintln!("schoold: {e}");
        std::process::exit(2);
    }

    let mut state = ipc::AppState::default();
    if let Some(ws) = cfg.workspace.as_deref() {
        if let Err(e) = ipc::open_workspace(&mut state, ws) {
            error!("event=workspace_open module=main status=error error={e:#}");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!("event=bad_json module=main status=error");
                // No id to reply to.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
