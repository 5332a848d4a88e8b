//! `math.*` operators.

use super::{failed, numbers};
use crate::value::number;
use nodeflow_workflow::{PluginError, PluginMap};
use serde_json::Value as JsonValue;

fn finite(value: f64) -> Result<JsonValue, PluginError> {
    if value.is_finite() {
        Ok(number(value))
    } else {
        Err(failed("result is not a finite number"))
    }
}

#[must_use]
pub fn plugins() -> PluginMap {
    PluginMap::new("math")
        .with("add", |args| finite(numbers(&args)?.iter().sum()))
        .with("subtract", |args| finite(args.number(0)? - args.number(1)?))
        .with("multiply", |args| finite(numbers(&args)?.iter().product()))
        .with("divide", |args| {
            let divisor = args.number(1)?;
            if divisor == 0.0 {
                return Err(failed("division by zero"));
            }
            finite(args.number(0)? / divisor)
        })
        .with("modulo", |args| {
            let divisor = args.number(1)?;
            if divisor == 0.0 {
                return Err(failed("division by zero"));
            }
            finite(args.number(0)? % divisor)
        })
        .with("min", |args| {
            numbers(&args)?
                .into_iter()
                .reduce(f64::min)
                .map_or_else(|| Err(failed("min of no values")), finite)
        })
        .with("max", |args| {
            numbers(&args)?
                .into_iter()
                .reduce(f64::max)
                .map_or_else(|| Err(failed("max of no values")), finite)
        })
        .with("average", |args| {
            let values = numbers(&args)?;
            if values.is_empty() {
                return Err(failed("average of no values"));
            }
            finite(values.iter().sum::<f64>() / values.len() as f64)
        })
        .with("abs", |args| finite(args.number(0)?.abs()))
        .with("floor", |args| finite(args.number(0)?.floor()))
        .with("ceil", |args| finite(args.number(0)?.ceil()))
        .with("round", |args| {
            let digits = match args.get(1) {
                Some(_) => args.number(1)?.clamp(0.0, 12.0) as i32,
                None => 0,
            };
            let scale = 10_f64.powi(digits);
            finite((args.number(0)? * scale).round() / scale)
        })
        .with("pow", |args| finite(args.number(0)?.powf(args.number(1)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::call;
    use serde_json::json;

    #[test]
    fn arithmetic() {
        let map = plugins();
        assert_eq!(
            call(&map, "add", &[json!(1), json!("2"), json!(3.5)]).expect("add"),
            json!(6.5)
        );
        assert_eq!(call(&map, "add", &[json!([1, 2, 3])]).expect("add"), json!(6));
        assert_eq!(call(&map, "subtract", &[json!(5), json!(7)]).expect("subtract"), json!(-2));
        assert_eq!(call(&map, "multiply", &[json!(2), json!(4)]).expect("multiply"), json!(8));
        assert_eq!(call(&map, "divide", &[json!(9), json!(2)]).expect("divide"), json!(4.5));
        assert_eq!(call(&map, "max", &[json!([3, 9, 1])]).expect("max"), json!(9));
        assert_eq!(call(&map, "round", &[json!(2.346), json!(2)]).expect("round"), json!(2.35));
    }

    #[test]
    fn division_by_zero_fails() {
        let err = call(&plugins(), "divide", &[json!(1), json!(0)]).expect_err("zero divisor");
        assert!(matches!(err, PluginError::Failed { .. }));
    }

    #[test]
    fn non_numeric_arguments_are_rejected() {
        let err = call(&plugins(), "add", &[json!(1), json!("x")]).expect_err("not a number");
        assert!(matches!(err, PluginError::InvalidArgument { index: 1, .. }));
    }
}
