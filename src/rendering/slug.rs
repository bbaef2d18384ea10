/// Maximum slug length accepted for posts.
pub const MAX_SLUG_LEN: usize = 200;

/// Turn a title or user-entered slug into a URL-safe slug.
///
/// Lowercases, keeps alphanumerics, and collapses every other run of
/// characters into a single `-`. Falls back to `untitled` when nothing
/// usable remains.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut chars = 0;
    let mut pending_dash = false;

    for c in input.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && chars > 0 {
                if chars + 1 >= MAX_SLUG_LEN {
                    break;
                }
                slug.push('-');
                chars += 1;
            }
            pending_dash = false;
            slug.push(c);
            chars += 1;
        } else {
            pending_dash = true;
        }
        if chars >= MAX_SLUG_LEN {
            break;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
