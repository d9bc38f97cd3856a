//! Domain ID generation
//!
//! All IDs use the format: `{6-char-hex}-{type}-{slug}`
//! Example: `019430-task-add-oauth`

/// Generate a domain ID from type and title
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    let slug = slugify(title);
    format!("{}-{}-{}", hex_prefix, domain_type, slug)
}

/// Generate a short human-readable display identifier, e.g. `TF-019430`
pub fn generate_display_id(id: &str) -> String {
    format!("TF-{}", &id[..6.min(id.len())])
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id = generate_id("task", "Add OAuth Authentication");
        assert!(id.len() > 10);
        assert!(id.contains("-task-"));
        assert!(id.contains("add-oauth-authentication"));
    }

    #[test]
    fn test_generate_display_id() {
        let id = generate_id("task", "Something");
        let display = generate_display_id(&id);
        assert!(display.starts_with("TF-"));
        assert_eq!(display.len(), 9);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Add OAuth!"), "add-oauth");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify("don't stop"), "dont-stop");
    }

    #[test]
    fn test_ids_are_unique() {
        let a = generate_id("task", "same title");
        let b = generate_id("task", "same title");
        assert_ne!(a, b);
    }
}
