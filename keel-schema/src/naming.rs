//! Package handle to table-prefix conversion.

/// Derive a package's table namespace prefix from its handle.
///
/// Words separated by `_`, `-`, `/` or whitespace get an upper-cased first
/// letter and are joined; the rest of each word is left as is.
///
/// ```rust
/// use keel_schema::naming::namespace_prefix_for_handle;
///
/// assert_eq!(namespace_prefix_for_handle("acme_blog"), "AcmeBlog");
/// assert_eq!(namespace_prefix_for_handle("my-shopCart"), "MyShopCart");
/// ```
pub fn namespace_prefix_for_handle(handle: &str) -> String {
    handle
        .split(|c: char| c == '_' || c == '-' || c == '/' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
