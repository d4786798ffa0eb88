//! Text helpers for slugs and persisted field names.

/// Build a URL slug from a label.
///
/// Lowercases the input, spells out a few symbols (`#` becomes `number`,
/// `&` becomes `and`, `@` becomes `at`) and joins the remaining
/// alphanumeric runs with single dashes: `"Update #1"` gives
/// `"update-number-1"`.
pub fn slugify(input: &str) -> String {
    let mut spelled = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '#' => spelled.push_str(" number "),
            '&' => spelled.push_str(" and "),
            '@' => spelled.push_str(" at "),
            _ => spelled.push(c),
        }
    }

    let mut slug = String::with_capacity(spelled.len());
    let mut pending_dash = false;
    for c in spelled.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c != '\'' {
            // apostrophes are dropped without splitting the word
            pending_dash = true;
        }
    }
    slug
}

/// Singular form of an English noun (`"tags"` gives `"tag"`).
pub fn singularize(word: &str) -> String {
    pluralizer::pluralize(word, 1, false)
}
