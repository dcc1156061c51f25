//! Input sanitization for free-text fields.

/// Maximum stored length of entity names, in characters.
pub const MAX_NAME_LEN: usize = 100;
/// Maximum stored length of notes, in characters.
pub const MAX_NOTES_LEN: usize = 2_000;

/// Strip markup and control characters from user input.
///
/// Anything between `<` and `>` is dropped, control characters other than
/// newline and tab are removed, runs of spaces collapse to one, and the result
/// is trimmed and truncated to `max_len` characters.
pub fn sanitize_text(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_len));
    let mut in_tag = false;
    let mut last_space = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            '\n' | '\t' => {
                out.push(c);
                last_space = false;
            }
            c if c.is_control() => {}
            c if c.is_whitespace() => {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            }
            c => {
                out.push(c);
                last_space = false;
            }
        }
    }
    out.trim().chars().take(max_len).collect::<String>().trim_end().to_string()
}
