//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format bean-dependency chains the way the container's
//! cycle and raw-injection errors report them, shorten Rust type names for
//! display, and score "did you mean?" suggestions for unknown bean names.

/// Renders a bean-dependency chain as a readable string.
///
/// Bean names keep their container semantics: a leading `&` is rendered as a
/// factory-dereference tag, and when the final link repeats an earlier one
/// the closing hop is marked as the cycle point.
///
/// # Examples
/// ```
/// use tarkib_support::rendering::render_chain;
///
/// let chain = vec!["orderService", "orderRepo", "dataSource", "orderService"];
/// let rendered = render_chain(&chain);
/// assert_eq!(
///     rendered,
///     "orderService -> orderRepo -> dataSource -> orderService (cycle)"
/// );
///
/// let chain = vec!["checkout", "&widgetFactory"];
/// assert_eq!(render_chain(&chain), "checkout -> &widgetFactory [factory]");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut rendered = String::new();
    for (position, raw) in chain.iter().enumerate() {
        if position > 0 {
            rendered.push_str(" -> ");
        }

        let name = raw.as_ref();
        rendered.push_str(name);
        if name.starts_with('&') {
            rendered.push_str(" [factory]");
        }

        let is_last = position == chain.len() - 1;
        if is_last
            && position > 0
            && chain[..position].iter().any(|earlier| earlier.as_ref() == name)
        {
            rendered.push_str(" (cycle)");
        }
    }
    rendered
}

/// Renders a list of bean names as a bulleted block, one per line.
///
/// Used by not-unique and raw-injection errors to list candidates or
/// dependents under the headline message.
pub fn render_name_list(names: &[impl AsRef<str>]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str("\n    - ");
        out.push_str(name.as_ref());
    }
    out
}

/// Shortens a fully qualified Rust type name for display.
///
/// Each path inside the name is reduced to its final segment; generic
/// brackets, references, tuples, and `dyn` markers are preserved.
///
/// ```
/// use tarkib_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>");
/// assert_eq!(short, "Arc<dyn Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    // Split the name into path chunks at the punctuation Rust type syntax
    // uses, shortening each chunk independently.
    let mut out = String::with_capacity(full_name.len());
    let mut chunk_start = 0;

    for (index, ch) in full_name.char_indices() {
        if matches!(ch, '<' | '>' | ',' | ' ' | '&' | '(' | ')' | ';') {
            out.push_str(last_path_segment(&full_name[chunk_start..index]));
            out.push(ch);
            chunk_start = index + ch.len_utf8();
        }
    }
    out.push_str(last_path_segment(&full_name[chunk_start..]));
    out
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Scores "did you mean?" suggestions for an unknown bean name.
///
/// Compares the requested name against the registered names and returns
/// close matches, best first.
pub fn suggest_similar(
    requested: &str,
    available: &[impl AsRef<str>],
    max_suggestions: usize,
) -> Vec<String> {
    let requested_lower = requested.to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .map(|n| n.as_ref())
        .filter_map(|name| {
            let name_lower = name.to_lowercase();

            // Substring containment either way is the strongest signal.
            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                return Some((name, 100));
            }

            // Common prefix of at least three characters.
            let common = name_lower
                .chars()
                .zip(requested_lower.chars())
                .take_while(|(a, b)| a == b)
                .count();
            if common >= 3 {
                return Some((name, common * 10));
            }

            None
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_marks_cycle_closure() {
        let chain = vec!["a", "b", "c", "a"];
        assert_eq!(render_chain(&chain), "a -> b -> c -> a (cycle)");
    }

    #[test]
    fn chain_without_repeat_has_no_cycle_marker() {
        let chain = vec!["service", "repository", "dataSource"];
        assert_eq!(render_chain(&chain), "service -> repository -> dataSource");
    }

    #[test]
    fn chain_tags_factory_dereferences() {
        let chain = vec!["checkout", "&widgetFactory"];
        assert_eq!(render_chain(&chain), "checkout -> &widgetFactory [factory]");
    }

    #[test]
    fn self_cycle_renders() {
        let chain = vec!["a", "a"];
        assert_eq!(render_chain(&chain), "a -> a (cycle)");
    }

    #[test]
    fn render_single_element_chain() {
        let chain = vec!["a"];
        assert_eq!(render_chain(&chain), "a");
    }

    #[test]
    fn render_empty_chain() {
        let chain: Vec<&str> = vec![];
        assert_eq!(render_chain(&chain), "");
    }

    #[test]
    fn name_list_bullets() {
        let rendered = render_name_list(&["first", "second"]);
        assert!(rendered.contains("\n    - first"));
        assert!(rendered.contains("\n    - second"));
    }

    #[test]
    fn shorten_simple_path() {
        assert_eq!(
            shorten_type_name("my_app::services::UserService"),
            "UserService"
        );
    }

    #[test]
    fn shorten_with_generics() {
        assert_eq!(
            shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
            "Arc<dyn Logger>"
        );
    }

    #[test]
    fn shorten_reference_and_tuple() {
        assert_eq!(
            shorten_type_name("&my_app::Config"),
            "&Config"
        );
        assert_eq!(
            shorten_type_name("(std::string::String, core::option::Option<u32>)"),
            "(String, Option<u32>)"
        );
    }

    #[test]
    fn shorten_no_path() {
        assert_eq!(shorten_type_name("String"), "String");
    }

    #[test]
    fn suggest_close_names() {
        let available = vec!["orderService", "orderRepository", "dataSource"];
        let suggestions = suggest_similar("orderServce", &available, 3);
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0], "orderService");
    }

    #[test]
    fn suggest_no_match() {
        let available = vec!["dataSource"];
        let suggestions = suggest_similar("xyz", &available, 3);
        assert!(suggestions.is_empty());
    }
}
