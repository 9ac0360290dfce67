//! Built-in function library
//!
//! Function names are matched case-insensitively. Only arity is checked
//! here; evaluation belongs to the graph engine.

/// Temporal shift: `SHIFT(series, lag)` reads `series` from `lag` bins earlier
pub const SHIFT: &str = "SHIFT";

/// Signature of a built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means variadic
    pub max_args: Option<usize>,
}

impl FunctionSpec {
    const fn fixed(name: &'static str, args: usize) -> Self {
        Self {
            name,
            min_args: args,
            max_args: Some(args),
        }
    }

    const fn range(name: &'static str, min_args: usize, max_args: Option<usize>) -> Self {
        Self {
            name,
            min_args,
            max_args,
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    /// Human-readable arity, e.g. `2`, `1 to 3`, `at least 2`
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }
}

pub const FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec::fixed(SHIFT, 2),
    FunctionSpec::range("MIN", 2, None),
    FunctionSpec::range("MAX", 2, None),
    FunctionSpec::fixed("CLAMP", 3),
    FunctionSpec::fixed("ABS", 1),
    FunctionSpec::fixed("FLOOR", 1),
    FunctionSpec::fixed("CEIL", 1),
    FunctionSpec::fixed("ROUND", 1),
    FunctionSpec::fixed("MOD", 2),
    FunctionSpec::fixed("STEP", 2),
    FunctionSpec::range("PULSE", 1, Some(3)),
];

/// Look up a built-in function by name
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("min").map(|f| f.name), Some("MIN"));
        assert_eq!(lookup("Shift").map(|f| f.name), Some(SHIFT));
        assert!(lookup("SQRT").is_none());
    }

    #[test]
    fn test_arity() {
        let min = lookup("MIN").unwrap();
        assert!(!min.accepts(1));
        assert!(min.accepts(5));
        assert_eq!(min.arity(), "at least 2");

        let pulse = lookup("PULSE").unwrap();
        assert!(pulse.accepts(1));
        assert!(!pulse.accepts(4));
        assert_eq!(pulse.arity(), "1 to 3");
        assert_eq!(lookup("SHIFT").unwrap().arity(), "2");
    }
}
