/// Derive a filesystem-safe identifier from a free-form topic.
///
/// ASCII letters and digits are lowercased and kept; every run of anything
/// else collapses to a single `-`. Leading and trailing separators are
/// dropped, and a topic with no usable characters becomes `untitled`.
pub fn slugify(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    let mut pending_sep = false;

    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
