use staffing_analytics::CliError;

fn is_json_mode_args() -> bool {
    std::env::args().any(|arg| arg == "--json")
}

fn report_and_exit(err: CliError) -> ! {
    if is_json_mode_args() {
        let payload = serde_json::json!({
            "error": {
                "code": err.code,
                "kind": err.kind,
                "message": err.message,
                "hint": err.hint,
                "retryable": err.retryable,
            }
        });
        eprintln!("{payload}");
    } else {
        eprintln!("error: {}", err.message);
        if let Some(hint) = &err.hint {
            eprintln!("hint: {hint}");
        }
    }
    std::process::exit(err.code);
}

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let raw_args: Vec<String> = std::env::args().collect();
    let parsed = match staffing_analytics::parse_cli(raw_args) {
        Ok(parsed) => parsed,
        Err(err) => report_and_exit(err),
    };

    if let Err(err) = staffing_analytics::run_with_parsed(parsed) {
        report_and_exit(err);
    }
    Ok(())
}
