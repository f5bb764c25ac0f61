//! Spoken phrase rendering

/// Render a name/room pair through the voice template
///
/// `{{nome}}` becomes the name, `{{sala}}` the raw room token and
/// `{{salaTxt}}` the suffix `" número <room>"` (empty when there is no room).
/// Every occurrence is replaced; anything else passes through untouched.
pub fn format_phrase(template: &str, name: &str, room: Option<&str>) -> String {
    let room = room.map(str::trim).unwrap_or("");
    let room_text = if room.is_empty() {
        String::new()
    } else {
        format!(" número {}", room)
    };

    template
        .replace("{{nome}}", name.trim())
        .replace("{{salaTxt}}", &room_text)
        .replace("{{sala}}", room)
}
