//! Entity name → asset directory name.
//!
//! Asset directories are named after the entity's human-readable name, not
//! its numeric id, so an operator can find `media/projects/Villa Project/`
//! by eye. The mapping keeps the name as intact as possible: spaces, case,
//! and non-ASCII letters survive. Only characters that would change the
//! meaning of a path are replaced:
//!
//! - `"Villa Project"` → `"Villa Project"`
//! - `"Café / Bar"` → `"Café _ Bar"`
//! - `"  padded  "` → `"padded"`
//! - `"../escape"` → `"escape"`
//! - `"_Studio"` → `"_Studio"`
//! - `""` → `None`

/// Replacement for characters that cannot appear in a directory name.
const REPLACEMENT: char = '_';

/// Derive the asset directory name for an entity.
///
/// Returns `None` when nothing usable remains (empty or whitespace-only
/// names, or names made only of dots).
pub fn entity_dir_name(name: &str) -> Option<String> {
    let mut dir = String::with_capacity(name.len());
    for c in name.chars() {
        let neutralised = matches!(c, '/' | '\\' | '\0') || c.is_control();
        // Leading dots would make the directory hidden or a relative
        // reference. A leading separator is dropped rather than replaced.
        if dir.is_empty() && (neutralised || c == '.' || c.is_whitespace()) {
            continue;
        }
        dir.push(if neutralised { REPLACEMENT } else { c });
    }

    let trimmed = dir.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_is_unchanged() {
        assert_eq!(entity_dir_name("Villa Project").as_deref(), Some("Villa Project"));
    }

    #[test]
    fn unicode_and_case_preserved() {
        assert_eq!(entity_dir_name("Maison Étoile").as_deref(), Some("Maison Étoile"));
    }

    #[test]
    fn separators_replaced() {
        assert_eq!(entity_dir_name("Café / Bar").as_deref(), Some("Café _ Bar"));
        assert_eq!(entity_dir_name(r"a\b").as_deref(), Some("a_b"));
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        assert_eq!(entity_dir_name("  padded  ").as_deref(), Some("padded"));
    }

    #[test]
    fn parent_reference_neutralised() {
        assert_eq!(entity_dir_name("../escape").as_deref(), Some("escape"));
        assert_eq!(entity_dir_name(".hidden").as_deref(), Some("hidden"));
    }

    #[test]
    fn literal_leading_underscore_kept() {
        assert_eq!(entity_dir_name("_Studio").as_deref(), Some("_Studio"));
        assert_ne!(entity_dir_name("_Studio"), entity_dir_name("Studio"));
        assert_eq!(entity_dir_name("/_Studio").as_deref(), Some("_Studio"));
    }

    #[test]
    fn control_characters_replaced() {
        assert_eq!(entity_dir_name("tab\there").as_deref(), Some("tab_here"));
    }

    #[test]
    fn empty_names_rejected() {
        assert_eq!(entity_dir_name(""), None);
        assert_eq!(entity_dir_name("   "), None);
        assert_eq!(entity_dir_name(".."), None);
    }
}
