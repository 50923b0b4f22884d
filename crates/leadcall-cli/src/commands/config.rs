use crate::config::Settings;
use std::process;

pub fn run(settings: Settings, json: bool) {
    if json {
        let rendered = serde_json::to_string_pretty(&settings.redacted_json()).unwrap_or_else(|e| {
            eprintln!("error: failed to render config: {e}");
            process::exit(1);
        });
        println!("{rendered}");
        return;
    }

    println!("leadcall config");
    match &settings.source {
        Some(path) => println!("  file: {}", path.display()),
        None => println!("  file: (none)"),
    }
    println!("  bot_token: <redacted>");
    println!("  admin_password: <redacted>");
    println!("  bind: {}", settings.bind);
    println!("  api_base: {}", settings.api_base);
    println!("  poll_timeout_secs: {}", settings.poll_timeout_secs);
}
