// Module runner staged onto target hosts
//
// Usage: stagehand-module <descriptor.json> [--args <json>]
// Prints exactly one JSON object and exits 0 on success, 1 on failure.

use stagehand::modules::dispatch;
use stagehand::modules::LocalSystem;

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let output = dispatch::invoke(&argv, std::io::stdin().lock(), &LocalSystem);

    println!("{}", output.to_json());
    std::process::exit(output.exit_code());
}
