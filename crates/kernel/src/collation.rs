//! The `NATURAL_CI` collation: case-insensitive, with runs of digits
//! compared by numeric value ("Scene 2" sorts before "Scene 10").

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Name the collation is registered under on every connection.
pub const NATURAL_CI: &str = "NATURAL_CI";

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Natural, case-insensitive ordering of two strings.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ord = compare_numeric(&take_digits(&mut left), &take_digits(&mut right));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.to_lowercase().cmp(r.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn digits_compare_numerically() {
        assert_eq!(natural_cmp("Scene 2", "Scene 10"), Ordering::Less);
        assert_eq!(natural_cmp("Scene 10", "Scene 9"), Ordering::Greater);
        assert_eq!(natural_cmp("a007", "a7"), Ordering::Equal);
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(natural_cmp("apple", "Apple"), Ordering::Equal);
        assert_eq!(natural_cmp("apple", "Banana"), Ordering::Less);
        assert_eq!(natural_cmp("Zed", "alpha"), Ordering::Greater);
    }

    #[test]
    fn prefix_sorts_first() {
        assert_eq!(natural_cmp("abc", "abcd"), Ordering::Less);
        assert_eq!(natural_cmp("", "a"), Ordering::Less);
    }

    #[test]
    fn sorting_a_list() {
        let mut names = vec!["item 10", "Item 2", "item 1", "ITEM 1a"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["item 1", "ITEM 1a", "Item 2", "item 10"]);
    }
}
