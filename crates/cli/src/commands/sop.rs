//! `sopilot sop`: inspect the SOP library.

use std::path::PathBuf;

use sopilot_planner::{SopLibrary, short_task_id};

pub fn show(config_path: Option<PathBuf>, task_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(&super::config_path(config_path))?;
    // Show the entry even when the planner has SOPs switched off.
    let library = SopLibrary::new(&config.sop.library_path, true);
    let entries = library.open()?;

    match library.lookup(task_id) {
        Some(sop) => {
            println!("SOP for {} ({} of {entries} entries)", short_task_id(task_id), sop.entries.len());
            println!("{}", sop.render());
            if !config.sop.enabled {
                println!("\nNote: sop.enabled = false, the planner will not see this.");
            }
        }
        None => println!("No SOP for {task_id} in {}", library.path().display()),
    }
    Ok(())
}
