use prophet_core::{sample_host, ResourceGuard};

use crate::error::CliError;

pub fn execute() -> Result<(), CliError> {
    let snapshot = sample_host();
    let guard = ResourceGuard::default();

    println!(
        "memory: {} MB available of {} MB ({:.1}% used)",
        snapshot.available_memory_mb(),
        snapshot.total_memory_bytes / (1024 * 1024),
        snapshot.memory_used_percent()
    );
    println!("cpu: {:.1}%", snapshot.cpu_percent);

    for warning in guard.usage_warnings(&snapshot) {
        println!("warning: {warning}");
    }
    match guard.check(&snapshot) {
        Ok(()) => println!("run precondition: ok"),
        Err(err) => println!("run precondition: {err}"),
    }

    Ok(())
}
