//! Shell-style name patterns for `list`.
//!
//! Supports `*` (any run of characters) and `?` (exactly one character).

/// Returns true if `name` matches the shell-style `pattern`.
#[must_use]
pub fn matches(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ni));
                pi += 1;
            }
            Some(&c) if c == '?' || c == n[ni] => {
                pi += 1;
                ni += 1;
            }
            _ => match star {
                Some((sp, sn)) => {
                    pi = sp + 1;
                    ni = sn + 1;
                    star = Some((sp, sn + 1));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn literal_and_wildcards() {
        assert!(matches("host_1", "host_1"));
        assert!(!matches("host_1", "host_12"));
        assert!(matches("host_*", "host_12"));
        assert!(matches("*", ""));
        assert!(matches("h?st*", "host_1"));
        assert!(!matches("h?st", "hst"));
        assert!(matches("*_1", "a_b_1"));
        assert!(!matches("*_1", "a_b_2"));
        assert!(matches("a*b*c", "aXXbYYc"));
    }
}
