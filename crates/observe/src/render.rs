//! CSV rendering of element tables for LLM prompts.

use sopilot_core::element::{ElementTable, UiElement};

pub const COLUMNS: [&str; 25] = [
    "BID", "Area", "Page", "Role", "Tag", "Label_L", "Label_A", "Label_AX", "Label_P", "InnerT",
    "Value", "Focused", "Status", "HasPop", "Expanded", "JS", "Hover_Strat", "Vis", "Z-Index",
    "BBox", "Scroll", "BG", "BD", "TX", "Class",
];

fn yes_no(flag: bool) -> String {
    if flag { "YES".into() } else { "no".into() }
}

fn record(e: &UiElement) -> [String; 25] {
    [
        e.bid.clone(),
        e.area.clone(),
        e.page.clone(),
        e.role.clone(),
        e.tag.clone(),
        e.label_left.clone(),
        e.label_above.clone(),
        e.label_ax.clone(),
        e.placeholder.clone(),
        e.inner_text.clone(),
        e.value.clone(),
        yes_no(e.focused),
        e.status(),
        yes_no(e.has_popup),
        if e.expanded { "Open".into() } else { "no".into() },
        yes_no(e.clickable),
        e.hover_strategy().into(),
        e.visibility.to_string(),
        e.z_index.to_string(),
        e.bbox.map(|b| b.to_string()).unwrap_or_else(|| "None".into()),
        if e.in_view { "In-View".into() } else { "Need".into() },
        e.background_color.clone(),
        e.border_color.clone(),
        e.text_color.clone(),
        e.class_name.clone(),
    ]
}

/// The table as CSV with a header row.
pub fn to_csv(table: &ElementTable) -> Result<String, csv::Error> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(COLUMNS)?;
    for element in table {
        wtr.write_record(record(element))?;
    }
    let bytes = wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
