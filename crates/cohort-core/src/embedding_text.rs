//! Embedding input rendering.
//!
//! Renders an entity's structured attributes into one `Label: value` line per
//! present field, in a fixed order. Absent or blank fields produce no line.
//! Truncation to the provider's input cap happens in the provider client.

use crate::models::Entity;

/// Render `entity` as embedding input text.
///
/// Field order: name, title, description, location, category, tags
/// (as "Skills"), interests. List fields are joined with `", "`.
pub fn build_text(entity: &Entity) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(7);

    push_scalar(&mut lines, "Name", entity.name.as_deref());
    push_scalar(&mut lines, "Title", entity.title.as_deref());
    push_scalar(&mut lines, "Description", entity.description.as_deref());
    push_scalar(&mut lines, "Location", entity.location.as_deref());
    push_scalar(&mut lines, "Category", entity.category.as_deref());
    push_list(&mut lines, "Skills", &entity.tags);
    push_list(&mut lines, "Interests", &entity.interests);

    lines.join("\n")
}

fn push_scalar(lines: &mut Vec<String>, label: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        lines.push(format!("{}: {}", label, v));
    }
}

fn push_list(lines: &mut Vec<String>, label: &str, values: &[String]) {
    let items: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if !items.is_empty() {
        lines.push(format!("{}: {}", label, items.join(", ")));
    }
}
