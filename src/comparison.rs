use std::cmp::Ordering;

use crate::filter::CmpOp;

/// Compare two text renderings. Equality is textual; ordering operators
/// compare numerically when both sides are numbers, lexically otherwise.
pub fn cmp_text(op: CmpOp, a: &str, b: &str) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => order(a, b) == Ordering::Less,
        CmpOp::Lte => order(a, b) != Ordering::Greater,
        CmpOp::Gt => order(a, b) == Ordering::Greater,
        CmpOp::Gte => order(a, b) != Ordering::Less,
    }
}

fn order(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(da), Ok(db)) => {
            if (da - db).abs() < f64::EPSILON {
                Ordering::Equal
            } else if da < db {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        _ => a.cmp(b),
    }
}

/// Existential comparison over two sets of texts, as node-set comparisons do.
pub fn cmp_any(op: CmpOp, lhs: &[String], rhs: &[String]) -> bool {
    lhs.iter().any(|a| rhs.iter().any(|b| cmp_text(op, a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_textual() {
        assert!(cmp_text(CmpOp::Eq, "2", "2"));
        assert!(!cmp_text(CmpOp::Eq, "2.0", "2"));
        assert!(cmp_text(CmpOp::Ne, "a", "b"));
    }

    #[test]
    fn ordering_prefers_numbers() {
        assert!(cmp_text(CmpOp::Lt, "9", "10"));
        assert!(!cmp_text(CmpOp::Lt, "b", "a"));
        assert!(cmp_text(CmpOp::Gte, "2.0", "2"));
    }

    #[test]
    fn empty_sets_never_match() {
        assert!(!cmp_any(CmpOp::Eq, &[], &["x".to_string()]));
        assert!(cmp_any(CmpOp::Eq, &["y".to_string(), "x".to_string()], &["x".to_string()]));
    }
}
