//! Minimal common type for a column observed with several types.
//!
//! Types are partitioned into families and each family has a join:
//!
//! | family    | join                                                    |
//! |-----------|---------------------------------------------------------|
//! | text      | wider length; unbounded dominates. Text also absorbs    |
//! |           | numeric and temporal types, widened to hold their text  |
//! |           | form; boolean and unmodelled types never join text      |
//! | numeric   | float absorbs fixed-point; fixed-point takes the        |
//! |           | componentwise max of integer digits and scale, with     |
//! |           | `Integer` counted as `(19, 0)`; a join wider than the   |
//! |           | maximum precision becomes float                         |
//! | date-time | `Date` widens to `Timestamp`                            |
//! | others    | only identical types join                               |
//!
//! Each join is commutative, and apart from text, pairs from different
//! families never join. [`merge_types`] folds the text members of a list
//! first, so a list containing text gives the same result (or the same
//! failure) for every ordering of its members, just like a text-free list.

use crate::core::sql_type::{INTEGER_AS_NUMERIC, MAX_NUMERIC_PRECISION};
use crate::core::SqlType;
use crate::error::{Result, SinkError};

/// Merge a non-empty sequence of types into their minimal common type.
///
/// Text members are folded before the others: text absorbs types that do
/// not join with each other (an integer and a date, say), so folding them in
/// input order would make the outcome depend on that order.
pub fn merge_types(types: &[SqlType]) -> Result<SqlType> {
    let mut ordered = types
        .iter()
        .filter(|t| t.is_text())
        .chain(types.iter().filter(|t| !t.is_text()));
    let first = ordered
        .next()
        .ok_or_else(|| SinkError::TypeMerge("no types to merge".into()))?;

    ordered.try_fold(first.clone(), |acc, next| merge_pair(&acc, next))
}

/// Join of two types.
pub fn merge_pair(a: &SqlType, b: &SqlType) -> Result<SqlType> {
    if a.renders_as(b) {
        return Ok(a.clone());
    }

    let merged = match (a, b) {
        (SqlType::Text { length: la }, SqlType::Text { length: lb }) => match (la, lb) {
            (Some(x), Some(y)) => SqlType::text(Some((*x).max(*y))),
            _ => SqlType::text(None),
        },

        (SqlType::Text { length }, other) | (other, SqlType::Text { length }) => {
            match text_width(other) {
                Some(width) => SqlType::text(length.map(|n| n.max(width))),
                None => return Err(unmergeable(a, b)),
            }
        }

        (SqlType::Float, SqlType::Integer | SqlType::Numeric { .. })
        | (SqlType::Integer | SqlType::Numeric { .. }, SqlType::Float) => SqlType::Float,

        (SqlType::Integer | SqlType::Numeric { .. }, SqlType::Integer | SqlType::Numeric { .. }) => {
            merge_fixed_point(a, b)
        }

        (SqlType::Date, SqlType::Timestamp) | (SqlType::Timestamp, SqlType::Date) => {
            SqlType::Timestamp
        }

        _ => return Err(unmergeable(a, b)),
    };

    Ok(merged)
}

fn merge_fixed_point(a: &SqlType, b: &SqlType) -> SqlType {
    let (ia, sa) = digits(a);
    let (ib, sb) = digits(b);
    let integer_digits = ia.max(ib);
    let scale = sa.max(sb);
    let precision = integer_digits + scale;

    if precision > MAX_NUMERIC_PRECISION {
        SqlType::Float
    } else {
        SqlType::numeric(precision, scale)
    }
}

/// (integer digits, scale) of an exact numeric type.
fn digits(ty: &SqlType) -> (u32, u32) {
    match ty {
        SqlType::Numeric { precision, scale } => (precision.saturating_sub(*scale), *scale),
        _ => INTEGER_AS_NUMERIC,
    }
}

/// Characters needed to hold any value of `ty` as text, or `None` when text
/// cannot stand in for the type.
fn text_width(ty: &SqlType) -> Option<u32> {
    match ty {
        // i64::MIN
        SqlType::Integer => Some(20),
        // sign and decimal point
        SqlType::Numeric { precision, .. } => Some(precision + 2),
        SqlType::Float => Some(24),
        SqlType::Date => Some(10),
        SqlType::Time => Some(15),
        // RFC 3339 with microseconds and an offset
        SqlType::Timestamp => Some(32),
        SqlType::Text { .. } | SqlType::Boolean | SqlType::Other(_) => None,
    }
}

fn unmergeable(a: &SqlType, b: &SqlType) -> SinkError {
    SinkError::TypeMerge(format!(
        "no compatible common type for {} and {}; an explicit column type change is required",
        a, b
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_types() -> Vec<SqlType> {
        vec![
            SqlType::text(Some(1)),
            SqlType::text(Some(50)),
            SqlType::text(Some(100)),
            SqlType::text(None),
            SqlType::Integer,
            SqlType::numeric(10, 2),
            SqlType::numeric(38, 16),
            SqlType::numeric(19, 0),
            SqlType::numeric(60, 0),
            SqlType::numeric(30, 20),
            SqlType::Float,
            SqlType::Boolean,
            SqlType::Date,
            SqlType::Time,
            SqlType::Timestamp,
            SqlType::Other("jsonb".into()),
        ]
    }

    #[test]
    fn test_merge_empty_fails() {
        let err = merge_types(&[]).unwrap_err();
        assert!(matches!(err, SinkError::TypeMerge(_)));
    }

    #[test]
    fn test_merge_single_is_identity() {
        for ty in sample_types() {
            assert_eq!(merge_types(std::slice::from_ref(&ty)).unwrap(), ty);
        }
    }

    #[test]
    fn test_text_widening() {
        let merged = merge_types(&[SqlType::text(Some(50)), SqlType::text(Some(100))]).unwrap();
        assert_eq!(merged, SqlType::text(Some(100)));

        for bounded in [1, 50, 4000] {
            let merged = merge_types(&[SqlType::text(Some(bounded)), SqlType::text(None)]).unwrap();
            assert_eq!(merged, SqlType::text(None));
        }
    }

    #[test]
    fn test_merge_is_commutative() {
        let types = sample_types();
        for a in &types {
            for b in &types {
                match (merge_pair(a, b), merge_pair(b, a)) {
                    (Ok(x), Ok(y)) => assert_eq!(x, y, "{a} / {b}"),
                    (Err(_), Err(_)) => {}
                    (x, y) => panic!("asymmetric result for {a} / {b}: {x:?} vs {y:?}"),
                }
            }
        }
    }

    #[test]
    fn test_merge_is_associative_without_text() {
        let types: Vec<SqlType> = sample_types().into_iter().filter(|t| !t.is_text()).collect();
        for a in &types {
            for b in &types {
                for c in &types {
                    let left = merge_pair(a, b).and_then(|ab| merge_pair(&ab, c));
                    let right = merge_pair(b, c).and_then(|bc| merge_pair(a, &bc));
                    match (left, right) {
                        (Ok(x), Ok(y)) => assert_eq!(x, y, "{a} / {b} / {c}"),
                        (Err(_), Err(_)) => {}
                        (x, y) => panic!("order-dependent result for {a} / {b} / {c}: {x:?} vs {y:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_merge_types_ignores_order() {
        let types = sample_types();
        for a in &types {
            for b in &types {
                for c in &types {
                    let orders = [
                        [a, b, c],
                        [a, c, b],
                        [b, a, c],
                        [b, c, a],
                        [c, a, b],
                        [c, b, a],
                    ];
                    let results: Vec<Result<SqlType>> = orders
                        .iter()
                        .map(|o| merge_types(&o.iter().map(|t| (*t).clone()).collect::<Vec<_>>()))
                        .collect();
                    for r in &results[1..] {
                        match (&results[0], r) {
                            (Ok(x), Ok(y)) => assert_eq!(x, y, "{a} / {b} / {c}"),
                            (Err(_), Err(_)) => {}
                            (x, y) => panic!("order-dependent result for {a} / {b} / {c}: {x:?} vs {y:?}"),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_numeric_joins() {
        assert_eq!(
            merge_pair(&SqlType::Integer, &SqlType::numeric(38, 16)).unwrap(),
            SqlType::numeric(38, 16)
        );
        assert_eq!(
            merge_pair(&SqlType::Integer, &SqlType::numeric(10, 2)).unwrap(),
            SqlType::numeric(21, 2)
        );
        assert_eq!(
            merge_pair(&SqlType::numeric(10, 2), &SqlType::numeric(5, 4)).unwrap(),
            SqlType::numeric(12, 4)
        );
        assert_eq!(
            merge_pair(&SqlType::numeric(38, 16), &SqlType::Float).unwrap(),
            SqlType::Float
        );
    }

    #[test]
    fn test_numeric_precision_overflow_becomes_float() {
        let wide = [
            SqlType::numeric(60, 0),
            SqlType::numeric(30, 20),
            SqlType::numeric(65, 30),
        ];
        assert_eq!(merge_pair(&wide[0], &wide[1]).unwrap(), SqlType::Float);
        assert_eq!(merge_types(&wide).unwrap(), SqlType::Float);
        assert_eq!(
            merge_types(&[wide[2].clone(), wide[0].clone(), wide[1].clone()]).unwrap(),
            SqlType::Float
        );
    }

    #[test]
    fn test_date_widens_to_timestamp() {
        assert_eq!(
            merge_pair(&SqlType::Date, &SqlType::Timestamp).unwrap(),
            SqlType::Timestamp
        );
        assert!(merge_pair(&SqlType::Time, &SqlType::Timestamp).is_err());
    }

    #[test]
    fn test_text_absorbs_numbers_and_temporals() {
        // An existing wide text column stays as it is.
        for other in [
            SqlType::Integer,
            SqlType::numeric(38, 16),
            SqlType::Float,
            SqlType::Date,
            SqlType::Time,
            SqlType::Timestamp,
        ] {
            let text = SqlType::text(Some(2000));
            assert_eq!(merge_pair(&text, &other).unwrap(), text);
            assert_eq!(merge_pair(&other, &text).unwrap(), text);
            assert_eq!(merge_pair(&SqlType::text(None), &other).unwrap(), SqlType::text(None));
        }

        // A narrow one widens to fit the text form of the other type.
        assert_eq!(
            merge_pair(&SqlType::text(Some(1)), &SqlType::Integer).unwrap(),
            SqlType::text(Some(20))
        );
        assert_eq!(
            merge_pair(&SqlType::numeric(10, 2), &SqlType::text(Some(5))).unwrap(),
            SqlType::text(Some(12))
        );
    }

    #[test]
    fn test_text_absorbs_types_that_do_not_join_each_other() {
        let merged = merge_types(&[
            SqlType::Integer,
            SqlType::Date,
            SqlType::text(Some(50)),
        ])
        .unwrap();
        assert_eq!(merged, SqlType::text(Some(50)));
        assert!(merge_types(&[SqlType::Integer, SqlType::Date]).is_err());
    }

    #[test]
    fn test_incompatible_families_fail() {
        assert!(merge_pair(&SqlType::text(Some(10)), &SqlType::Boolean).is_err());
        assert!(merge_pair(&SqlType::Boolean, &SqlType::text(None)).is_err());
        assert!(merge_pair(&SqlType::text(None), &SqlType::Other("jsonb".into())).is_err());
        assert!(merge_pair(&SqlType::Boolean, &SqlType::Integer).is_err());
        assert!(merge_types(&[
            SqlType::text(Some(10)),
            SqlType::text(Some(20)),
            SqlType::Boolean
        ])
        .is_err());
    }
}
