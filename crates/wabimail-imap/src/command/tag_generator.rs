//! Command tags.

/// Generates sequential tags `A0001`, `A0002`, ...
///
/// Tags only need to be unique among commands in flight on one
/// connection, so the counter wraps instead of failing.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Returns the next tag.
    pub fn next(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, self.counter)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next(), "A0001");
        assert_eq!(tags.next(), "A0002");

        let mut tags = TagGenerator::new('W');
        for _ in 0..99 {
            let _ = tags.next();
        }
        assert_eq!(tags.next(), "W0100");
    }

    #[test]
    fn test_wraps() {
        let mut tags = TagGenerator {
            counter: u32::MAX,
            prefix: 'A',
        };
        assert_eq!(tags.next(), "A0000");
    }
}
