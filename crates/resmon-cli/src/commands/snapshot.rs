//! `resmon snapshot`: one-shot capture of the current machine stats.

use resmon_core::{MachineStatsProvider, StatsProvider};

/// Run the snapshot command.
pub fn run(json: bool) {
    let mut provider = MachineStatsProvider::new();
    let snapshot = provider.sample();

    if json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(encoded) => println!("{encoded}"),
            Err(e) => {
                eprintln!("Error encoding snapshot: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Snapshot at {} ms since epoch", snapshot.taken_unix_ms);
    if !provider.has_gpu() {
        println!("(GPU monitoring unavailable; GPU series omitted)");
    }
    println!();
    println!("{:<24} {:>14}  {}", "metric", "value", "kind");
    println!("{}", "-".repeat(48));
    for (name, reading) in snapshot.iter() {
        println!("{name:<24} {:>14.3}  {}", reading.value, reading.kind);
    }
}
