//! Identifier generation.
//!
//! Entity ids use the format `{6-char-hex}-{kind}-{slug}`, e.g.
//! `019430-project-demo-cli`. Task ids are `<area>-<n>` and are produced by
//! the analyzer, not here.

/// Generate an id from a kind tag and a human title.
pub fn generate_id(kind: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    format!("{}-{}-{}", hex_prefix, kind, slugify(title))
}

/// Generate a short opaque id for prompts and tool calls.
pub fn short_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &uuid[..12])
}

/// Slugify a title for use in ids.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
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
    fn test_generate_id_shape() {
        let id = generate_id("project", "Demo CLI App");
        assert!(id.contains("-project-"));
        assert!(id.ends_with("demo-cli-app"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Build a CLI!"), "build-a-cli");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify("don't stop"), "dont-stop");
    }

    #[test]
    fn test_short_id_unique() {
        let a = short_id("prompt");
        let b = short_id("prompt");
        assert!(a.starts_with("prompt_"));
        assert_ne!(a, b);
    }
}
