//! `sopilot observe`: fuse a recorded step and print the planner's view.

use std::path::Path;

use sopilot_observe::{FilterMode, element_table, prompt_table};
use sopilot_telemetry::load_observation;

pub fn run(metadata: &Path, filter: FilterMode) -> Result<(), Box<dyn std::error::Error>> {
    let observation = load_observation(metadata)?;
    let table = element_table(&observation)?;
    let (csv, stats) = prompt_table(&table, filter)?;

    println!("# {} (focused: {})", table.page_title, table.focused_bid);
    print!("{csv}");
    eprintln!("filter {filter}: {stats}");
    Ok(())
}
