//! Comparison operators for property predicates

/// Comparison operator used in `property <op> value` predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Less than
    Lt,
    /// Less than or equal to
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal to
    Ge,
}

impl CompareOp {
    /// Apply the comparison to two f64 values
    ///
    /// A NaN on either side never matches, not even for `Ne`: an element
    /// with a missing value is excluded rather than counted as different.
    #[inline]
    pub fn compare_f64(self, a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        }
    }

    /// Apply the comparison to two i32 values
    #[inline]
    pub fn compare_i32(self, a: i32, b: i32) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        }
    }

    /// Apply the comparison to two strings, ignoring ASCII case
    pub fn compare_str(self, a: &str, b: &str) -> bool {
        let ord = a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase());
        match self {
            CompareOp::Eq => ord.is_eq(),
            CompareOp::Ne => ord.is_ne(),
            CompareOp::Lt => ord.is_lt(),
            CompareOp::Le => ord.is_le(),
            CompareOp::Gt => ord.is_gt(),
            CompareOp::Ge => ord.is_ge(),
        }
    }

    /// Membership test against a set of values
    ///
    /// `=` matches when the value is a member, `!=` when it is not. Ordering
    /// operators match when any member satisfies them.
    pub fn compare_set(self, members: &[i32], value: i32) -> bool {
        match self {
            CompareOp::Eq => members.contains(&value),
            CompareOp::Ne => !members.contains(&value),
            _ => members.iter().any(|m| self.compare_i32(*m, value)),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::Ne => write!(f, "!="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Ge => write!(f, ">="),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_never_matches() {
        assert!(!CompareOp::Ne.compare_f64(f64::NAN, 1.0));
        assert!(!CompareOp::Eq.compare_f64(f64::NAN, f64::NAN));
        assert!(CompareOp::Ne.compare_f64(2.0, 1.0));
    }

    #[test]
    fn test_string_compare_ignores_case() {
        assert!(CompareOp::Eq.compare_str("Ca", "CA"));
        assert!(CompareOp::Lt.compare_str("c", "N"));
    }

    #[test]
    fn test_set_membership() {
        let ops = [1, 4];
        assert!(CompareOp::Eq.compare_set(&ops, 4));
        assert!(!CompareOp::Eq.compare_set(&ops, 2));
        assert!(CompareOp::Ne.compare_set(&ops, 2));
        assert!(CompareOp::Gt.compare_set(&ops, 3));
    }

    #[test]
    fn test_display() {
        assert_eq!(CompareOp::Le.to_string(), "<=");
    }
}
