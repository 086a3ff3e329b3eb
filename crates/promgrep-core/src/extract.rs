//! Value/label extraction from regex captures.
//!
//! Only capture groups 1 and 2 take part. Each present group is parsed as an
//! `f64`; a successful parse becomes the value, a failed one becomes the
//! label. Group 2 is applied after group 1, so it wins on both fields.

use regex::Captures;

/// Upper bound on matches evaluated per line.
pub const MAX_MATCHES_PER_LINE: usize = 99;

/// Value/label pair derived from one match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extraction<'h> {
    pub value: f64,
    pub label: &'h str,
    /// Whether any participating group parsed as a number.
    pub numeric: bool,
}

impl<'h> Default for Extraction<'h> {
    fn default() -> Self {
        Self { value: 0.0, label: "", numeric: false }
    }
}

impl<'h> Extraction<'h> {
    /// Derive value and label from a single match.
    pub fn from_captures(caps: &Captures<'h>) -> Self {
        let mut out = Self::default();
        // caps.len() counts group 0, so groups 1..=2 exist when len > idx
        for idx in 1..=2 {
            if caps.len() <= idx {
                break;
            }
            // a group that did not participate reads as ""
            let text = caps.get(idx).map_or("", |m| m.as_str());
            out.apply(text);
        }
        out
    }

    fn apply(&mut self, text: &'h str) {
        match text.parse::<f64>() {
            Ok(v) => {
                self.value = v;
                self.numeric = true;
            }
            Err(_) => {
                tracing::debug!(capture = %text, "capture is not numeric, using it as label");
                self.label = text;
            }
        }
    }

    /// Amount a counter grows by for this match.
    pub fn counter_increment(&self) -> f64 {
        if self.numeric {
            self.value
        } else {
            1.0
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use regex::Regex;

    fn first<'h>(re: &Regex, line: &'h str) -> Extraction<'h> {
        let caps = re.captures(line).unwrap();
        Extraction::from_captures(&caps)
    }

    #[test]
    fn no_groups_keeps_defaults() {
        let re = Regex::new("abc").unwrap();
        let ex = first(&re, "xxabcxx");
        assert_eq!(ex, Extraction::default());
        assert_eq!(ex.counter_increment(), 1.0);
    }

    #[test]
    fn group_two_wins_value() {
        let re = Regex::new(r"a=(\d+) b=(\d+)").unwrap();
        let ex = first(&re, "a=3 b=7");
        assert_eq!(ex.value, 7.0);
        assert_eq!(ex.label, "");
    }

    #[test]
    fn label_in_either_position() {
        let re = Regex::new(r"(\w+) took (\d+)").unwrap();
        let ex = first(&re, "GET took 12");
        assert_eq!(ex.value, 12.0);
        assert_eq!(ex.label, "GET");

        let re = Regex::new(r"(\d+)ms for ([a-z]+)").unwrap();
        let ex = first(&re, "40ms for post");
        assert_eq!(ex.value, 40.0);
        assert_eq!(ex.label, "post");
    }

    #[test]
    fn unmatched_optional_group_reads_empty() {
        let re = Regex::new(r"v=(\d+)(x)?").unwrap();
        let ex = first(&re, "v=5");
        assert_eq!(ex.value, 5.0);
        assert_eq!(ex.label, "");
        assert!(ex.numeric);
    }

    #[test]
    fn third_group_ignored() {
        let re = Regex::new(r"(\d+)-(\d+)-(\w+)").unwrap();
        let ex = first(&re, "1-2-zzz");
        assert_eq!(ex.value, 2.0);
        assert_eq!(ex.label, "");
    }
}
